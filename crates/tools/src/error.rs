use thiserror::Error;

/// Unified error type for tool execution, mirroring the teacher's
/// `ToolError` split between argument problems, environment problems, and
/// an opaque catch-all.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error(transparent)]
    Sandbox(#[from] stratus_sandbox::SandboxError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("needs confirmation")]
    NeedsConfirmation,
    #[error("cancelled by user")]
    CancelledByUser,
    #[error("tool timed out")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

impl ToolError {
    /// §4.4: network/timeout/sandbox-gone/rate-limit/busy/connrefused/connreset.
    pub fn is_retryable(&self) -> bool {
        match self {
            ToolError::Timeout => true,
            ToolError::Sandbox(stratus_sandbox::SandboxError::Gone) => true,
            ToolError::Http(_) => true,
            ToolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::TimedOut
            ),
            ToolError::Other(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("rate limit") || lower.contains("busy") || lower.contains("connrefused") || lower.contains("connreset")
            }
            _ => false,
        }
    }
}
