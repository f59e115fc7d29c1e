//! Sidecar process supervision.
//!
//! The [`Supervisor`] trait is the narrow interface the controller needs from
//! whatever runs the sidecar: hold a process specification, start and stop
//! the process, and give access to the files it writes.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::spec::ProcessSpec;

/// Errors raised by a supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The supervision layer cannot be reached yet. Retrying later may succeed.
    #[error("supervisor unavailable: {0}")]
    Unavailable(String),

    /// The requested file does not exist.
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    /// Reading or listing files failed.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The sidecar process could not be started or stopped.
    #[error("process error: {0}")]
    Process(String),

    /// No specification has been applied yet.
    #[error("no process specification applied")]
    NoSpec,
}

impl SupervisorError {
    /// Returns true if the whole triggering event should be retried later.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// A specialized Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// File name pattern of an artifact: fixed prefix, variable stem, fixed suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPattern {
    prefix: String,
    suffix: String,
}

impl ArtifactPattern {
    /// Create a pattern.
    #[must_use]
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// `import_<name>.yaml`, the file the sidecar writes after registering.
    #[must_use]
    pub fn import_manifest() -> Self {
        Self::new("import_", ".yaml")
    }

    /// The variable part of `file_name`, if it matches the pattern.
    ///
    /// An empty stem does not match.
    #[must_use]
    pub fn stem<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_suffix(self.suffix.as_str()))
            .filter(|stem| !stem.is_empty())
    }

    /// Whether `file_name` matches the pattern.
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.stem(file_name).is_some()
    }
}

impl std::fmt::Display for ArtifactPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}*{}", self.prefix, self.suffix)
    }
}

/// A file found by [`Supervisor::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    /// Full path of the file.
    pub path: PathBuf,
    /// File name without directory.
    pub name: String,
}

impl ArtifactFile {
    /// Build from a full path.
    #[must_use]
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }
}

/// Trait for supervising the sidecar process.
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// The specification currently held, if any.
    async fn current_spec(&self) -> Result<Option<ProcessSpec>>;

    /// Replace the held specification. Does not restart the process.
    async fn apply_spec(&self, spec: &ProcessSpec) -> Result<()>;

    /// Whether the sidecar process is running.
    async fn is_running(&self) -> Result<bool>;

    /// Stop the sidecar process.
    async fn stop(&self) -> Result<()>;

    /// Start the sidecar process with the held specification.
    async fn start(&self) -> Result<()>;

    /// Read a file written by the sidecar.
    async fn read_file(&self, path: &Path) -> Result<String>;

    /// List the files of `dir` whose names match `pattern`, sorted by name.
    async fn list_files(&self, dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<ArtifactFile>>;
}

/// A mock supervisor for testing without running processes.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use rancher_integrator_core::SidecarCommand;
    use std::collections::BTreeMap;

    /// Files the simulated sidecar writes when started with a command.
    #[derive(Debug, Clone)]
    struct StartEffect {
        command: SidecarCommand,
        path: PathBuf,
        content: String,
    }

    #[derive(Default)]
    struct Inner {
        spec: Option<ProcessSpec>,
        running: bool,
        unavailable: bool,
        list_error: bool,
        files: BTreeMap<PathBuf, String>,
        effects: Vec<StartEffect>,
        applied: Vec<ProcessSpec>,
        starts: usize,
        stops: usize,
        list_calls: usize,
    }

    /// A supervisor that simulates the sidecar in memory.
    ///
    /// Files are kept in a map. Effects registered with
    /// [`MockSupervisor::on_start`] run every time the sidecar is started with
    /// the matching command, which is how tests make the "sidecar" produce an
    /// import manifest or an error log.
    #[derive(Default)]
    pub struct MockSupervisor {
        inner: Mutex<Inner>,
    }

    impl MockSupervisor {
        /// Create a new mock supervisor.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every call fail with [`SupervisorError::Unavailable`].
        pub fn set_unavailable(&self, unavailable: bool) {
            self.inner.lock().unavailable = unavailable;
        }

        /// Make `list_files` fail with an I/O error.
        pub fn set_list_error(&self, list_error: bool) {
            self.inner.lock().list_error = list_error;
        }

        /// Write a file.
        pub fn set_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
            self.inner.lock().files.insert(path.into(), content.into());
        }

        /// Write `content` to `path` whenever the sidecar starts with `command`.
        pub fn on_start(
            &self,
            command: SidecarCommand,
            path: impl Into<PathBuf>,
            content: impl Into<String>,
        ) {
            self.inner.lock().effects.push(StartEffect {
                command,
                path: path.into(),
                content: content.into(),
            });
        }

        /// Every specification applied, in order.
        #[must_use]
        pub fn applied_specs(&self) -> Vec<ProcessSpec> {
            self.inner.lock().applied.clone()
        }

        /// Commands of every specification applied, in order.
        #[must_use]
        pub fn applied_commands(&self) -> Vec<SidecarCommand> {
            self.inner.lock().applied.iter().map(|s| s.command).collect()
        }

        /// Number of times the sidecar was started.
        #[must_use]
        pub fn start_count(&self) -> usize {
            self.inner.lock().starts
        }

        /// Number of times the sidecar was stopped.
        #[must_use]
        pub fn stop_count(&self) -> usize {
            self.inner.lock().stops
        }

        /// Number of `list_files` calls.
        #[must_use]
        pub fn list_calls(&self) -> usize {
            self.inner.lock().list_calls
        }

        /// Total number of effector calls that changed the sidecar.
        #[must_use]
        pub fn mutation_count(&self) -> usize {
            let inner = self.inner.lock();
            inner.applied.len() + inner.starts + inner.stops
        }

        fn check(inner: &Inner) -> Result<()> {
            if inner.unavailable {
                Err(SupervisorError::Unavailable(
                    "mock supervisor unreachable".to_string(),
                ))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Supervisor for MockSupervisor {
        async fn current_spec(&self) -> Result<Option<ProcessSpec>> {
            let inner = self.inner.lock();
            Self::check(&inner)?;
            Ok(inner.spec.clone())
        }

        async fn apply_spec(&self, spec: &ProcessSpec) -> Result<()> {
            let mut inner = self.inner.lock();
            Self::check(&inner)?;
            inner.spec = Some(spec.clone());
            inner.applied.push(spec.clone());
            Ok(())
        }

        async fn is_running(&self) -> Result<bool> {
            let inner = self.inner.lock();
            Self::check(&inner)?;
            Ok(inner.running)
        }

        async fn stop(&self) -> Result<()> {
            let mut inner = self.inner.lock();
            Self::check(&inner)?;
            inner.running = false;
            inner.stops += 1;
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            let mut inner = self.inner.lock();
            Self::check(&inner)?;
            let command = inner.spec.as_ref().map(|s| s.command).ok_or(SupervisorError::NoSpec)?;

            let writes: Vec<_> = inner
                .effects
                .iter()
                .filter(|e| e.command == command)
                .map(|e| (e.path.clone(), e.content.clone()))
                .collect();
            inner.files.extend(writes);

            inner.running = true;
            inner.starts += 1;
            Ok(())
        }

        async fn read_file(&self, path: &Path) -> Result<String> {
            let inner = self.inner.lock();
            Self::check(&inner)?;
            inner
                .files
                .get(path)
                .cloned()
                .ok_or_else(|| SupervisorError::NotFound(path.to_path_buf()))
        }

        async fn list_files(&self, dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<ArtifactFile>> {
            let mut inner = self.inner.lock();
            Self::check(&inner)?;
            inner.list_calls += 1;
            if inner.list_error {
                return Err(SupervisorError::Io {
                    path: dir.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "mock"),
                });
            }

            Ok(inner
                .files
                .keys()
                .filter(|path| path.parent() == Some(dir))
                .map(|path| ArtifactFile::from_path(path.clone()))
                .filter(|file| pattern.matches(&file.name))
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockSupervisor;
    use super::*;
    use rancher_integrator_core::{IntegratorConfig, SidecarCommand};

    use crate::spec::build_process_spec;

    #[test]
    fn import_pattern_strips_prefix_and_extension() {
        let pattern = ArtifactPattern::import_manifest();
        assert_eq!(pattern.stem("import_mycluster.yaml"), Some("mycluster"));
        assert_eq!(pattern.stem("import_.yaml"), None);
        assert_eq!(pattern.stem("export_mycluster.yaml"), None);
        assert_eq!(pattern.stem("import_mycluster.yml"), None);
        assert!(pattern.matches("import_a.b.yaml"));
        assert_eq!(pattern.to_string(), "import_*.yaml");
    }

    #[test]
    fn artifact_file_from_path() {
        let file = ArtifactFile::from_path(PathBuf::from("/usr/src/app/import_manifest/import_x.yaml"));
        assert_eq!(file.name, "import_x.yaml");
    }

    #[test]
    fn not_found_io_error_is_classified() {
        let err = SupervisorError::io(
            Path::new("/missing"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, SupervisorError::NotFound(_)));
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn mock_start_runs_effects_for_command() {
        let supervisor = MockSupervisor::new();
        let dir = Path::new("/artifacts");
        supervisor.on_start(SidecarCommand::Register, dir.join("import_c1.yaml"), "kind: List");

        let config = IntegratorConfig::default();
        let verify = build_process_spec(&config, None, SidecarCommand::Verify);
        supervisor.apply_spec(&verify).await.unwrap();
        supervisor.start().await.unwrap();
        let pattern = ArtifactPattern::import_manifest();
        assert!(supervisor.list_files(dir, &pattern).await.unwrap().is_empty());

        let register = build_process_spec(&config, None, SidecarCommand::Register);
        supervisor.apply_spec(&register).await.unwrap();
        supervisor.start().await.unwrap();
        let files = supervisor.list_files(dir, &pattern).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "import_c1.yaml");
        assert_eq!(supervisor.start_count(), 2);
    }

    #[tokio::test]
    async fn mock_unavailable_fails_every_call() {
        let supervisor = MockSupervisor::new();
        supervisor.set_unavailable(true);
        assert!(supervisor.current_spec().await.unwrap_err().is_unavailable());
        assert!(supervisor.is_running().await.unwrap_err().is_unavailable());
    }
}
