use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SandboxError;
use crate::provider::{CommandOutput, SandboxCredentials, SandboxHandle, SandboxProvider, SandboxSource, SandboxStatus};

struct Entry {
    workdir: PathBuf,
    status: SandboxStatus,
}

/// Stands in for the remote sandbox provider named out of scope in §1. Each
/// "sandbox" is a real directory under `base_dir`; `Clone` sources are
/// realized as a local git repository rather than an actual network clone
/// (the network fetch is the real provider's job — this fake only needs to
/// produce a working tree with the right branch and remote configured).
pub struct LocalProcessSandbox {
    base_dir: PathBuf,
    sandboxes: Mutex<HashMap<String, Entry>>,
    snapshots: Mutex<HashMap<String, PathBuf>>,
    gone_once: Mutex<HashMap<String, ()>>,
}

impl LocalProcessSandbox {
    pub fn new(base_dir: PathBuf) -> Self {
        fs::create_dir_all(&base_dir).ok();
        Self {
            base_dir,
            sandboxes: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(HashMap::new()),
            gone_once: Mutex::new(HashMap::new()),
        }
    }

    /// Test hook: the next `run_command` against `sandbox_id` fails with
    /// [`SandboxError::Gone`] exactly once, simulating an expired remote
    /// sandbox.
    pub fn inject_gone_once(&self, sandbox_id: &str) {
        self.gone_once.lock().unwrap().insert(sandbox_id.to_string(), ());
    }

    /// Local filesystem path backing `sandbox_id`. Not part of
    /// [`SandboxProvider`] (a real remote provider has no such thing) —
    /// this is the escape hatch `stratus-orchestrator`'s `ToolContext`
    /// impl uses to hand native fs tools a real directory, since this fake
    /// provider's "sandbox" already is one.
    pub fn workdir(&self, sandbox_id: &str) -> Option<PathBuf> {
        self.sandboxes.lock().unwrap().get(sandbox_id).map(|e| e.workdir.clone())
    }

    fn alloc_workdir(&self) -> std::io::Result<PathBuf> {
        let dir = self.base_dir.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<()> {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            let target = dst.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                Self::copy_tree(&entry.path(), &target)?;
            } else {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    fn seed_clone(workdir: &Path, clone_url: &str, checkout_branch: &str) -> Result<(), SandboxError> {
        let repo = git2::Repository::init(workdir)?;
        repo.remote("origin", clone_url)?;
        fs::write(workdir.join("README.md"), "# workspace\n")?;
        let mut index = repo.index()?;
        index.add_path(Path::new("README.md"))?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let sig = git2::Signature::now("stratus", "stratus@users.noreply.github.com")?;
        let commit_id = repo.commit(Some("HEAD"), &sig, &sig, "initial commit", &tree, &[])?;
        let commit = repo.find_commit(commit_id)?;
        repo.branch(checkout_branch, &commit, true)?;
        repo.set_head(&format!("refs/heads/{checkout_branch}"))?;
        repo.checkout_head(None)?;
        Ok(())
    }
}

#[async_trait]
impl SandboxProvider for LocalProcessSandbox {
    async fn create(
        &self,
        _credentials: &SandboxCredentials,
        _runtime: &str,
        _timeout: Duration,
        source: Option<SandboxSource>,
    ) -> Result<SandboxHandle, SandboxError> {
        let workdir = self.alloc_workdir()?;

        match source {
            Some(SandboxSource::FromSnapshot(snapshot_id)) => {
                let src = self
                    .snapshots
                    .lock()
                    .unwrap()
                    .get(&snapshot_id)
                    .cloned()
                    .ok_or_else(|| SandboxError::NotFound(format!("snapshot {snapshot_id}")))?;
                Self::copy_tree(&src, &workdir)?;
            }
            Some(SandboxSource::Clone { clone_url, branch: _, checkout_branch }) => {
                Self::seed_clone(&workdir, &clone_url, &checkout_branch)?;
            }
            None => {}
        }

        let id = Uuid::new_v4().to_string();
        self.sandboxes
            .lock()
            .unwrap()
            .insert(id.clone(), Entry { workdir, status: SandboxStatus::Running });
        Ok(SandboxHandle { id, status: SandboxStatus::Running })
    }

    async fn get(&self, _credentials: &SandboxCredentials, sandbox_id: &str) -> Result<SandboxHandle, SandboxError> {
        let map = self.sandboxes.lock().unwrap();
        let entry = map
            .get(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        Ok(SandboxHandle { id: sandbox_id.to_string(), status: entry.status })
    }

    async fn run_command(&self, sandbox_id: &str, cmd: &str, args: &[String]) -> Result<CommandOutput, SandboxError> {
        if self.gone_once.lock().unwrap().remove(sandbox_id).is_some() {
            return Err(SandboxError::Gone);
        }

        let workdir = {
            let map = self.sandboxes.lock().unwrap();
            let entry = map
                .get(sandbox_id)
                .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
            if entry.status != SandboxStatus::Running {
                return Err(SandboxError::Gone);
            }
            entry.workdir.clone()
        };

        let cmd = cmd.to_string();
        let args = args.to_vec();
        tokio::task::spawn_blocking(move || -> Result<CommandOutput, SandboxError> {
            let output = Command::new(&cmd).args(&args).current_dir(&workdir).output()?;
            Ok(CommandOutput {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
        .await
        .map_err(|e| SandboxError::Provider(e.to_string()))?
    }

    async fn snapshot(&self, sandbox_id: &str) -> Result<String, SandboxError> {
        let workdir = {
            let mut map = self.sandboxes.lock().unwrap();
            let entry = map
                .get_mut(sandbox_id)
                .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
            entry.status = SandboxStatus::Stopped;
            entry.workdir.clone()
        };

        let snapshot_id = Uuid::new_v4().to_string();
        let dest = self.base_dir.join("snapshots").join(&snapshot_id);
        Self::copy_tree(&workdir, &dest)?;
        self.snapshots.lock().unwrap().insert(snapshot_id.clone(), dest);
        Ok(snapshot_id)
    }

    async fn stop(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let mut map = self.sandboxes.lock().unwrap();
        let entry = map
            .get_mut(sandbox_id)
            .ok_or_else(|| SandboxError::NotFound(sandbox_id.to_string()))?;
        entry.status = SandboxStatus::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn snapshot_then_resume_preserves_files() {
        let tmp = tempfile::tempdir().unwrap();
        let provider = LocalProcessSandbox::new(tmp.path().to_path_buf());
        let handle = provider
            .create(
                &SandboxCredentials::default(),
                "runtime",
                Duration::from_secs(1),
                Some(SandboxSource::Clone {
                    clone_url: "https://example.invalid/acme/widgets.git".into(),
                    branch: "main".into(),
                    checkout_branch: "stratuscode/s1".into(),
                }),
            )
            .await
            .unwrap();

        provider
            .run_command(&handle.id, "sh", &["-c".into(), "echo hi > note.txt".into()])
            .await
            .unwrap();

        let snapshot_id = provider.snapshot(&handle.id).await.unwrap();
        assert!(provider.get(&SandboxCredentials::default(), &handle.id).await.is_ok());
        assert_eq!(
            provider.get(&SandboxCredentials::default(), &handle.id).await.unwrap().status,
            SandboxStatus::Stopped
        );

        let resumed = provider
            .create(
                &SandboxCredentials::default(),
                "runtime",
                Duration::from_secs(1),
                Some(SandboxSource::FromSnapshot(snapshot_id)),
            )
            .await
            .unwrap();
        let out = provider
            .run_command(&resumed.id, "cat", &["note.txt".into()])
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi");
    }
}
