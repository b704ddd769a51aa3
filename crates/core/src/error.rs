use thiserror::Error;

/// Errors shared across the domain model. Crates that add I/O (store,
/// sandbox, tools) define their own richer error enums and convert into or
/// wrap this one at the boundary, mirroring the teacher's split between
/// `querymt::error::LLMError` (protocol-level) and per-crate errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
