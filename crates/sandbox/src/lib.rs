//! Sandbox lifecycle: acquire (resume-from-snapshot / reconnect-by-id /
//! fresh-clone), the single-retry-on-Gone exec wrapper, and release.

pub mod error;
pub mod local;
pub mod manager;
pub mod provider;

pub use error::SandboxError;
pub use local::LocalProcessSandbox;
pub use manager::{safe_sandbox_exec, AcquireOutcome, AcquireRequest, SandboxManager};
pub use provider::{CommandOutput, SandboxCredentials, SandboxHandle, SandboxProvider, SandboxSource, SandboxStatus};
