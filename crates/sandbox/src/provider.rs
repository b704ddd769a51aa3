use std::time::Duration;

use async_trait::async_trait;

use crate::error::SandboxError;

/// `{token, projectId, teamId}` read from environment (§6). Opaque to the
/// manager; passed through to the provider on every call.
#[derive(Debug, Clone, Default)]
pub struct SandboxCredentials {
    pub token: String,
    pub project_id: String,
    pub team_id: String,
}

/// What a freshly-created sandbox should be seeded with.
#[derive(Debug, Clone)]
pub enum SandboxSource {
    /// Resume from a previously-taken snapshot.
    FromSnapshot(String),
    /// Clone a repo at `branch` (depth 1) and check out `checkout_branch`.
    Clone {
        clone_url: String,
        branch: String,
        checkout_branch: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxStatus {
    Running,
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub id: String,
    pub status: SandboxStatus,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The remote sandbox provider named out of scope in §1 — `Sandbox.create`,
/// `Sandbox.get`, `runCommand`, `snapshot`, `stop`. [`crate::local::LocalProcessSandbox`]
/// is the implementation that backs tests and the CLI.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(
        &self,
        credentials: &SandboxCredentials,
        runtime: &str,
        timeout: Duration,
        source: Option<SandboxSource>,
    ) -> Result<SandboxHandle, SandboxError>;

    async fn get(
        &self,
        credentials: &SandboxCredentials,
        sandbox_id: &str,
    ) -> Result<SandboxHandle, SandboxError>;

    async fn run_command(
        &self,
        sandbox_id: &str,
        cmd: &str,
        args: &[String],
    ) -> Result<CommandOutput, SandboxError>;

    /// Takes a frozen image and implicitly stops the source sandbox.
    async fn snapshot(&self, sandbox_id: &str) -> Result<String, SandboxError>;

    async fn stop(&self, sandbox_id: &str) -> Result<(), SandboxError>;
}
