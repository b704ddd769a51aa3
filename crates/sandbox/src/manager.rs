use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::SandboxError;
use crate::provider::{SandboxCredentials, SandboxHandle, SandboxProvider, SandboxSource, SandboxStatus};

/// Runtime tag every fresh sandbox is created with (§4.3: "a fixed runtime tag").
pub const RUNTIME_TAG: &str = "stratus-node20";
/// Long create timeout (~800s, §4.3).
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(800);
/// Default working-branch prefix when a session has not yet picked one.
pub const DEFAULT_BRANCH_PREFIX: &str = "stratuscode/";

/// Everything [`SandboxManager::acquire`] needs from the session row; kept
/// decoupled from `stratus_core::Session` so this crate has no store
/// dependency.
#[derive(Debug, Clone)]
pub struct AcquireRequest {
    pub session_id: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub session_branch: Option<String>,
    pub snapshot_id: Option<String>,
    pub sandbox_id: Option<String>,
    pub github_user_id: u64,
    pub github_login: String,
    pub github_token: String,
}

#[derive(Debug, Clone)]
pub struct AcquireOutcome {
    pub handle: SandboxHandle,
    /// The session branch actually in use — echoes `session_branch` if it was
    /// already set, otherwise the freshly-picked default.
    pub session_branch: String,
}

/// Acquires and releases sandboxes against a [`SandboxProvider`], implementing
/// the resume-from-snapshot / reconnect-by-id / fresh-clone algorithm and the
/// single-retry-on-Gone wrapper (§4.3).
pub struct SandboxManager<P: SandboxProvider> {
    provider: Arc<P>,
}

impl<P: SandboxProvider> SandboxManager<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// §4.3 acquire algorithm, in strict order: resume from snapshot, else
    /// reconnect by id (accepted only if running), else fresh clone. Then
    /// always refresh the origin remote and git identity, regardless of
    /// which path produced the handle.
    pub async fn acquire(
        &self,
        req: &AcquireRequest,
        credentials: &SandboxCredentials,
    ) -> Result<AcquireOutcome, SandboxError> {
        let session_branch = req
            .session_branch
            .clone()
            .unwrap_or_else(|| format!("{DEFAULT_BRANCH_PREFIX}{}", req.session_id));

        let mut handle = None;

        if let Some(snapshot_id) = &req.snapshot_id {
            match self
                .provider
                .create(
                    credentials,
                    RUNTIME_TAG,
                    ACQUIRE_TIMEOUT,
                    Some(SandboxSource::FromSnapshot(snapshot_id.clone())),
                )
                .await
            {
                Ok(h) => {
                    info!(session_id = %req.session_id, snapshot_id, "sandbox resumed from snapshot");
                    handle = Some(h);
                }
                Err(e) => warn!(session_id = %req.session_id, error = %e, "resume from snapshot failed"),
            }
        }

        if handle.is_none() {
            if let Some(sandbox_id) = &req.sandbox_id {
                match self.provider.get(credentials, sandbox_id).await {
                    Ok(h) if h.status == SandboxStatus::Running => {
                        info!(session_id = %req.session_id, sandbox_id, "sandbox reconnected by id");
                        handle = Some(h);
                    }
                    Ok(_) => warn!(session_id = %req.session_id, sandbox_id, "sandbox by id is not running"),
                    Err(e) => warn!(session_id = %req.session_id, error = %e, "reconnect by id failed"),
                }
            }
        }

        let handle = match handle {
            Some(h) => h,
            None => {
                let clone_url = format!(
                    "https://x-access-token:{}@github.com/{}/{}.git",
                    req.github_token, req.owner, req.repo
                );
                info!(session_id = %req.session_id, owner = %req.owner, repo = %req.repo, "sandbox fresh clone");
                self.provider
                    .create(
                        credentials,
                        RUNTIME_TAG,
                        ACQUIRE_TIMEOUT,
                        Some(SandboxSource::Clone {
                            clone_url,
                            branch: req.branch.clone(),
                            checkout_branch: session_branch.clone(),
                        }),
                    )
                    .await?
            }
        };

        self.refresh_origin_remote(&handle.id, req).await?;
        self.configure_git_identity(&handle.id, req).await?;

        Ok(AcquireOutcome { handle, session_branch })
    }

    async fn refresh_origin_remote(&self, sandbox_id: &str, req: &AcquireRequest) -> Result<(), SandboxError> {
        let url = format!(
            "https://x-access-token:{}@github.com/{}/{}.git",
            req.github_token, req.owner, req.repo
        );
        self.provider
            .run_command(sandbox_id, "git", &["remote".into(), "set-url".into(), "origin".into(), url])
            .await?;
        Ok(())
    }

    async fn configure_git_identity(&self, sandbox_id: &str, req: &AcquireRequest) -> Result<(), SandboxError> {
        let email = format!("{}+{}@users.noreply.github.com", req.github_user_id, req.github_login);
        self.provider
            .run_command(sandbox_id, "git", &["config".into(), "user.name".into(), req.github_login.clone()])
            .await?;
        self.provider
            .run_command(sandbox_id, "git", &["config".into(), "user.email".into(), email])
            .await?;
        Ok(())
    }

    /// `release` at turn end: snapshot, then the caller persists
    /// `snapshotId` and clears `sandboxId`. On failure, log and leave
    /// `sandboxId` set so the next turn reconnects — this function does not
    /// touch the session row, that's the orchestrator's job.
    pub async fn release(&self, handle: &SandboxHandle) -> Result<String, SandboxError> {
        match self.provider.snapshot(&handle.id).await {
            Ok(snapshot_id) => {
                info!(sandbox_id = %handle.id, snapshot_id, "sandbox released");
                Ok(snapshot_id)
            }
            Err(e) => {
                warn!(sandbox_id = %handle.id, error = %e, "sandbox release failed, leaving sandboxId set");
                Err(e)
            }
        }
    }
}

/// Wraps a single sandbox command with the mandated single-retry-on-Gone
/// behavior (§4.3, §9). The source defect this fixes: the retry helper must
/// call the underlying exec operation on both the first attempt and the
/// retry, never itself — recursing into itself would infinite-loop on any
/// persistent failure.
pub async fn safe_sandbox_exec<P: SandboxProvider>(
    manager: &SandboxManager<P>,
    handle: &mut SandboxHandle,
    req: &AcquireRequest,
    credentials: &SandboxCredentials,
    cmd: &str,
    args: &[String],
) -> Result<crate::provider::CommandOutput, SandboxError> {
    match manager.provider().run_command(&handle.id, cmd, args).await {
        Ok(out) => Ok(out),
        Err(SandboxError::Gone) => {
            warn!(sandbox_id = %handle.id, "sandbox gone, re-acquiring once");
            let outcome = manager.acquire(req, credentials).await?;
            *handle = outcome.handle;
            manager.provider().run_command(&handle.id, cmd, args).await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalProcessSandbox;

    fn req() -> AcquireRequest {
        AcquireRequest {
            session_id: "s1".into(),
            owner: "acme".into(),
            repo: "widgets".into(),
            branch: "main".into(),
            session_branch: None,
            snapshot_id: None,
            sandbox_id: None,
            github_user_id: 42,
            github_login: "octocat".into(),
            github_token: "ghs_test".into(),
        }
    }

    #[tokio::test]
    async fn fresh_clone_picks_default_session_branch() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(LocalProcessSandbox::new(tmp.path().to_path_buf()));
        let manager = SandboxManager::new(provider);
        let outcome = manager
            .acquire(&req(), &SandboxCredentials::default())
            .await
            .unwrap();
        assert_eq!(outcome.session_branch, "stratuscode/s1");
        assert_eq!(outcome.handle.status, SandboxStatus::Running);
    }

    #[tokio::test]
    async fn safe_exec_retries_once_on_gone() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = Arc::new(LocalProcessSandbox::new(tmp.path().to_path_buf()));
        let manager = SandboxManager::new(provider.clone());
        let req = req();
        let outcome = manager.acquire(&req, &SandboxCredentials::default()).await.unwrap();
        let mut handle = outcome.handle;
        let original_id = handle.id.clone();

        provider.inject_gone_once(&handle.id);
        let out = safe_sandbox_exec(
            &manager,
            &mut handle,
            &req,
            &SandboxCredentials::default(),
            "echo",
            &["hi".to_string()],
        )
        .await
        .unwrap();
        assert!(out.success());
        // the handle id changed because re-acquire produced a fresh sandbox
        assert_ne!(handle.id, original_id);
    }
}
