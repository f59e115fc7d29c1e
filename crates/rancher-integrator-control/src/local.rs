//! Local process supervisor.
//!
//! Runs the sidecar as a child process of the controller. The command line is
//! `<entrypoint> <verb>` executed through `sh -c` in the sidecar's working
//! directory, with the process specification's environment and stderr
//! appended to the error log.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::spec::ProcessSpec;
use crate::supervisor::{ArtifactFile, ArtifactPattern, Result, Supervisor, SupervisorError};
use crate::types::SidecarConfig;

#[derive(Default)]
struct LocalState {
    spec: Option<ProcessSpec>,
    child: Option<Child>,
}

/// Supervisor that runs the sidecar as a local child process.
pub struct LocalSupervisor {
    config: SidecarConfig,
    error_log: PathBuf,
    state: Mutex<LocalState>,
}

impl LocalSupervisor {
    /// Create a supervisor. Nothing is started until a spec is applied.
    #[must_use]
    pub fn new(config: SidecarConfig, error_log: impl Into<PathBuf>) -> Self {
        Self {
            config,
            error_log: error_log.into(),
            state: Mutex::new(LocalState::default()),
        }
    }

    /// The sidecar is considered unreachable until its working directory exists.
    async fn ensure_available(&self) -> Result<()> {
        match tokio::fs::try_exists(&self.config.workdir).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(SupervisorError::Unavailable(format!(
                "working directory {} does not exist yet",
                self.config.workdir.display()
            ))),
            Err(e) => Err(SupervisorError::Unavailable(format!(
                "cannot inspect {}: {e}",
                self.config.workdir.display()
            ))),
        }
    }

    /// Empty the error log and open it for the child's stderr.
    async fn reset_error_log(&self) -> Result<Stdio> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.error_log)
            .await
            .map_err(|e| SupervisorError::io(&self.error_log, e))?;
        Ok(Stdio::from(file.into_std().await))
    }
}

#[async_trait]
impl Supervisor for LocalSupervisor {
    async fn current_spec(&self) -> Result<Option<ProcessSpec>> {
        self.ensure_available().await?;
        Ok(self.state.lock().await.spec.clone())
    }

    async fn apply_spec(&self, spec: &ProcessSpec) -> Result<()> {
        self.ensure_available().await?;
        self.state.lock().await.spec = Some(spec.clone());
        debug!(command = %spec.command, "Stored sidecar spec");
        Ok(())
    }

    async fn is_running(&self) -> Result<bool> {
        self.ensure_available().await?;
        let mut state = self.state.lock().await;

        let Some(child) = state.child.as_mut() else {
            return Ok(false);
        };
        match child.try_wait() {
            Ok(None) => Ok(true),
            Ok(Some(status)) => {
                debug!(%status, "Sidecar exited");
                state.child = None;
                Ok(false)
            }
            Err(e) => Err(SupervisorError::Process(format!("cannot poll sidecar: {e}"))),
        }
    }

    async fn stop(&self) -> Result<()> {
        self.ensure_available().await?;
        let mut state = self.state.lock().await;

        if let Some(mut child) = state.child.take() {
            let pid = child.id();
            child
                .kill()
                .await
                .map_err(|e| SupervisorError::Process(format!("cannot stop sidecar: {e}")))?;
            info!(pid, "Stopped sidecar");
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.ensure_available().await?;
        let mut state = self.state.lock().await;

        let spec = state.spec.clone().ok_or(SupervisorError::NoSpec)?;
        if let Some(mut previous) = state.child.take() {
            warn!("Sidecar still running at start, killing it");
            if let Err(e) = previous.kill().await {
                warn!(error = %e, "Failed to kill previous sidecar");
            }
        }

        let stderr = self.reset_error_log().await?;
        let command_line = spec.command_line(&self.config.entrypoint);

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .current_dir(&self.config.workdir)
            .envs(&spec.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::Process(format!("cannot start `{command_line}`: {e}")))?;

        info!(pid = child.id(), command = %spec.command, "Started sidecar");
        state.child = Some(child);
        drop(state);

        tokio::time::sleep(self.config.startup_grace()).await;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SupervisorError::io(path, e))
    }

    async fn list_files(&self, dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<ArtifactFile>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            // The sidecar creates the directory when it writes the first artifact.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SupervisorError::io(dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SupervisorError::io(dir, e))?
        {
            let file = ArtifactFile::from_path(entry.path());
            if pattern.matches(&file.name) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rancher_integrator_core::{IntegratorConfig, SidecarCommand};
    use tempfile::TempDir;

    use crate::spec::build_process_spec;

    fn supervisor(workdir: &Path, entrypoint: &str) -> LocalSupervisor {
        let config = SidecarConfig {
            entrypoint: entrypoint.to_string(),
            workdir: workdir.to_path_buf(),
            startup_grace_ms: 300,
        };
        LocalSupervisor::new(config, workdir.join("error.log"))
    }

    fn verify_spec() -> ProcessSpec {
        build_process_spec(&IntegratorConfig::default(), None, SidecarCommand::Verify)
    }

    #[tokio::test]
    async fn missing_workdir_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(&dir.path().join("not-yet"), "true");

        let err = supervisor.current_spec().await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(supervisor.apply_spec(&verify_spec()).await.unwrap_err().is_unavailable());
    }

    #[tokio::test]
    async fn spec_is_held() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), "true");

        assert!(supervisor.current_spec().await.unwrap().is_none());
        supervisor.apply_spec(&verify_spec()).await.unwrap();
        assert_eq!(supervisor.current_spec().await.unwrap(), Some(verify_spec()));
    }

    #[tokio::test]
    async fn start_without_spec_fails() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), "true");
        assert!(matches!(supervisor.start().await, Err(SupervisorError::NoSpec)));
    }

    #[tokio::test]
    async fn start_passes_environment_and_verb() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), "printenv RANCHER_INTEGRATOR_URL > env.out; echo");

        supervisor.apply_spec(&verify_spec()).await.unwrap();
        supervisor.start().await.unwrap();

        let out = supervisor.read_file(&dir.path().join("env.out")).await.unwrap();
        assert_eq!(out.trim(), "changeme");
        assert!(!supervisor.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn stderr_goes_to_truncated_error_log() {
        let dir = TempDir::new().unwrap();
        let error_log = dir.path().join("error.log");
        std::fs::write(&error_log, "stale failure\n").unwrap();

        let supervisor = supervisor(dir.path(), "echo 'invalid credentials' >&2; true");
        supervisor.apply_spec(&verify_spec()).await.unwrap();
        supervisor.start().await.unwrap();

        let log = supervisor.read_file(&error_log).await.unwrap();
        assert_eq!(log, "invalid credentials\n");
    }

    #[tokio::test]
    async fn stop_kills_running_sidecar() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), "sleep 30; true");

        supervisor.apply_spec(&verify_spec()).await.unwrap();
        supervisor.start().await.unwrap();
        assert!(supervisor.is_running().await.unwrap());

        supervisor.stop().await.unwrap();
        assert!(!supervisor.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn lists_matching_files_sorted() {
        let dir = TempDir::new().unwrap();
        let artifacts = dir.path().join("import_manifest");
        std::fs::create_dir(&artifacts).unwrap();
        std::fs::write(artifacts.join("import_b.yaml"), "b").unwrap();
        std::fs::write(artifacts.join("import_a.yaml"), "a").unwrap();
        std::fs::write(artifacts.join("notes.txt"), "x").unwrap();

        let supervisor = supervisor(dir.path(), "true");
        let files = supervisor
            .list_files(&artifacts, &ArtifactPattern::import_manifest())
            .await
            .unwrap();

        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["import_a.yaml", "import_b.yaml"]);
    }

    #[tokio::test]
    async fn missing_artifact_dir_lists_nothing() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), "true");
        let files = supervisor
            .list_files(&dir.path().join("absent"), &ArtifactPattern::import_manifest())
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let supervisor = supervisor(dir.path(), "true");
        let err = supervisor.read_file(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, SupervisorError::NotFound(_)));
    }
}
