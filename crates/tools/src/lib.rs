//! Tool registry, dispatch pipeline, and the built-in sandbox/filesystem,
//! web, git, session, and rendezvous tools (§3, §4.4).

pub mod builtin;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod tool;

pub use builtin::register_all;
pub use context::ToolContext;
pub use dispatch::dispatch;
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use tool::{FunctionDefinition, Tool, ToolDefinition};
