use thiserror::Error;

/// Error kinds from §7. `Validation` and `TransientToolFailure` never reach
/// here — the tool dispatch layer (`stratus_tools::dispatch`) swallows those
/// into a JSON error string inside the tool-call result. What escapes up to
/// the orchestrator's top level is exactly the set below.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("sandbox error: {0}")]
    Sandbox(#[from] stratus_sandbox::SandboxError),

    #[error("cancelled by user")]
    CancelledByUser,

    #[error("turn failed: {0}")]
    FatalTurnError(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error(transparent)]
    Store(#[from] stratus_store::StoreError),

    #[error(transparent)]
    Tool(#[from] stratus_tools::ToolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OrchestratorError {
    /// §4.5 step 11 / §7: the error finalize path needs the bare message
    /// string to store in `Session.errorMessage`, not the `Display` chain.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, OrchestratorError::CancelledByUser)
    }
}
