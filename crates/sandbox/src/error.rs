use thiserror::Error;

/// Errors surfaced by a [`crate::provider::SandboxProvider`] and the
/// [`crate::manager::SandboxManager`] built on top of it.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// HTTP 410 / "Sandbox is not running" — the one error every call site
    /// must treat as recoverable-by-reacquire, and only once.
    #[error("sandbox is gone")]
    Gone,
    #[error("sandbox not found: {0}")]
    NotFound(String),
    #[error("sandbox provider error: {0}")]
    Provider(String),
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing credentials: {0}")]
    MissingCredentials(String),
}
