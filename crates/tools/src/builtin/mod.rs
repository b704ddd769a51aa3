mod bash;
mod fs;
mod git;
mod glob_tool;
mod grep;
mod rendezvous;
mod session;
mod web;

use std::sync::Arc;

use crate::registry::ToolRegistry;

pub use bash::BashTool;
pub use fs::{EditTool, LsTool, MultiEditTool, ReadTool, WriteToFileTool};
pub use git::{GitCommitTool, GitPushTool, PrCreateTool};
pub use glob_tool::GlobTool;
pub use grep::GrepTool;
pub use rendezvous::{PlanEnterTool, PlanExitTool, QuestionTool};
pub use session::{TodoReadTool, TodoWriteTool};
pub use web::{WebFetchTool, WebSearchTool};

/// Registers every built-in tool listed in §3.3. Callers that need a
/// restricted set (e.g. plan mode) can build a `ToolRegistry` by hand
/// instead.
pub fn register_all(registry: &mut ToolRegistry) {
    registry
        .add(Arc::new(BashTool))
        .add(Arc::new(ReadTool))
        .add(Arc::new(WriteToFileTool))
        .add(Arc::new(EditTool))
        .add(Arc::new(MultiEditTool))
        .add(Arc::new(GrepTool))
        .add(Arc::new(GlobTool))
        .add(Arc::new(LsTool))
        .add(Arc::new(WebSearchTool::default()))
        .add(Arc::new(WebFetchTool))
        .add(Arc::new(GitCommitTool))
        .add(Arc::new(GitPushTool))
        .add(Arc::new(PrCreateTool))
        .add(Arc::new(TodoReadTool))
        .add(Arc::new(TodoWriteTool))
        .add(Arc::new(QuestionTool))
        .add(Arc::new(PlanExitTool))
        .add(Arc::new(PlanEnterTool));
}
