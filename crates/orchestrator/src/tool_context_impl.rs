//! The concrete [`ToolContext`] that wires `stratus-tools` to a live turn:
//! a [`SandboxManager`] (fixed to [`LocalProcessSandbox`], the only
//! provider this crate ships), the durable [`SqliteStore`], and the
//! ephemeral [`LiveStreamStore`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use stratus_core::{AgentMode, Todo, TodoStatus};
use stratus_sandbox::{
    safe_sandbox_exec, AcquireRequest, CommandOutput, LocalProcessSandbox, SandboxCredentials, SandboxHandle,
    SandboxManager,
};
use stratus_store::{LiveStreamStore, SqliteStore};
use stratus_tools::{ToolContext, ToolError};
use tokio::sync::Mutex as AsyncMutex;

pub struct OrchestratorToolContext {
    pub session_id: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub session_branch: String,
    pub agent_mode: AgentMode,
    pub alpha_mode: bool,
    pub github_token: String,
    pub root: PathBuf,

    pub cancel_flag: Arc<AtomicBool>,
    pub sandbox: Arc<SandboxManager<LocalProcessSandbox>>,
    pub handle: AsyncMutex<SandboxHandle>,
    pub acquire_req: AcquireRequest,
    pub credentials: SandboxCredentials,
    pub http: reqwest::Client,
    pub live: LiveStreamStore,
    pub store: SqliteStore,
}

impl OrchestratorToolContext {
    /// The sandbox id currently behind `self.handle`, read back after the
    /// turn so `turn.rs` can persist it even if a mid-turn Gone error
    /// caused `safe_sandbox_exec` to swap in a freshly re-acquired handle.
    pub async fn current_sandbox_id(&self) -> String {
        self.handle.lock().await.id.clone()
    }
}

#[async_trait]
impl ToolContext for OrchestratorToolContext {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn owner(&self) -> &str {
        &self.owner
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    fn branch(&self) -> &str {
        &self.branch
    }

    fn session_branch(&self) -> &str {
        &self.session_branch
    }

    fn agent_mode(&self) -> AgentMode {
        self.agent_mode
    }

    fn alpha_mode(&self) -> bool {
        self.alpha_mode
    }

    fn cancel_requested(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    fn github_token(&self) -> &str {
        &self.github_token
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn exec(&self, cmd: &str, args: &[String]) -> Result<CommandOutput, ToolError> {
        let mut handle = self.handle.lock().await;
        let out = safe_sandbox_exec(
            &self.sandbox,
            &mut handle,
            &self.acquire_req,
            &self.credentials,
            cmd,
            args,
        )
        .await?;
        Ok(out)
    }

    fn http_client(&self) -> reqwest::Client {
        self.http.clone()
    }

    fn live(&self) -> &LiveStreamStore {
        &self.live
    }

    async fn list_todos(&self) -> Result<Vec<Todo>, ToolError> {
        self.store
            .list_todos(&self.session_id)
            .await
            .map_err(|e| ToolError::Other(e.to_string()))
    }

    async fn replace_todos(&self, todos: Vec<(String, Option<u8>, TodoStatus)>) -> Result<Vec<Todo>, ToolError> {
        self.store
            .replace_todos(&self.session_id, todos)
            .await
            .map_err(|e| ToolError::Other(e.to_string()))
    }
}
