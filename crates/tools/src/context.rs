use std::path::Path;

use async_trait::async_trait;
use stratus_core::{AgentMode, Todo, TodoStatus};
use stratus_sandbox::CommandOutput;
use stratus_store::LiveStreamStore;

use crate::error::ToolError;

/// Everything a [`crate::Tool`] needs from its surrounding turn. Concrete
/// implementations live in `stratus-orchestrator`, which owns the
/// sandbox/session wiring; this trait keeps the tools crate decoupled from
/// the orchestrator's generic `SandboxManager<P>`.
#[async_trait]
pub trait ToolContext: Send + Sync {
    fn session_id(&self) -> &str;
    fn owner(&self) -> &str;
    fn repo(&self) -> &str;
    fn branch(&self) -> &str;
    fn session_branch(&self) -> &str;
    fn agent_mode(&self) -> AgentMode;
    fn alpha_mode(&self) -> bool;
    fn cancel_requested(&self) -> bool;
    fn github_token(&self) -> &str;

    /// Local filesystem view of the sandboxed working tree. For the
    /// `LocalProcessSandbox`-backed implementation this is the real worktree
    /// directory, which lets filesystem tools use native Rust crates
    /// (`ignore`, `glob`, `grep-searcher`) instead of shelling out.
    fn root(&self) -> &Path;

    /// Runs an arbitrary command against the sandbox via
    /// `safe_sandbox_exec`, retrying once on a Gone error.
    async fn exec(&self, cmd: &str, args: &[String]) -> Result<CommandOutput, ToolError>;

    fn http_client(&self) -> reqwest::Client;

    fn live(&self) -> &LiveStreamStore;

    async fn list_todos(&self) -> Result<Vec<Todo>, ToolError>;

    /// Replace-all semantics; rejects more than one `in_progress` (§3).
    async fn replace_todos(&self, todos: Vec<(String, Option<u8>, TodoStatus)>) -> Result<Vec<Todo>, ToolError>;

    /// Overridable in tests so rendezvous tools don't really sleep a full
    /// second per poll.
    async fn poll_delay(&self) {
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    }
}
