//! Shared domain types for the agent turn orchestrator.
//!
//! No I/O lives here — just the data model from the spec's Data Model
//! section (Session, Message, Agent-State, Todo, StreamingState) and the
//! error kinds shared across the crates that operate on them.

pub mod agent_state;
pub mod error;
pub mod message;
pub mod session;
pub mod streaming;
pub mod todo;

pub use agent_state::AgentState;
pub use error::CoreError;
pub use message::{AgentMessage, ChatRole, MessagePart, ToolCallRecord, ToolCallStatus};
pub use session::{AgentMode, Session, SessionStatus, TokenUsage};
pub use streaming::StreamingState;
pub use todo::{Todo, TodoStatus};

/// Generate a new random id in the same shape the teacher uses throughout
/// (`uuid::Uuid::new_v4().to_string()`).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current unix timestamp in seconds, matching `time::OffsetDateTime::now_utc().unix_timestamp()`.
pub fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
