//! Applies process specifications to the supervised sidecar.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::spec::ProcessSpec;
use crate::supervisor::{Result, Supervisor, SupervisorError};

/// What a reconciliation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Whether the spec changed and the sidecar was (re)started.
    pub applied: bool,
    /// Non-empty content of the error log after the restart.
    pub error_artifact: Option<String>,
}

impl ReconcileOutcome {
    /// First non-blank line of the error artifact, for status messages.
    #[must_use]
    pub fn first_error_line(&self) -> Option<&str> {
        self.error_artifact
            .as_deref()
            .and_then(|text| text.lines().map(str::trim).find(|line| !line.is_empty()))
    }
}

/// Bridges the controller and a [`Supervisor`].
#[derive(Clone)]
pub struct SidecarAdapter {
    supervisor: Arc<dyn Supervisor>,
    error_log: PathBuf,
}

impl SidecarAdapter {
    /// Create an adapter reading sidecar errors from `error_log`.
    #[must_use]
    pub fn new(supervisor: Arc<dyn Supervisor>, error_log: impl Into<PathBuf>) -> Self {
        Self {
            supervisor,
            error_log: error_log.into(),
        }
    }

    /// The underlying supervisor.
    #[must_use]
    pub fn supervisor(&self) -> &dyn Supervisor {
        self.supervisor.as_ref()
    }

    /// Path of the sidecar error log.
    #[must_use]
    pub fn error_log(&self) -> &Path {
        &self.error_log
    }

    /// Bring the sidecar in line with `spec`.
    ///
    /// An unchanged spec is a no-op. Otherwise the spec is submitted, a
    /// running sidecar is stopped, the sidecar is started and the error log
    /// is read back.
    ///
    /// # Errors
    ///
    /// Returns any supervisor error; [`SupervisorError::Unavailable`] means
    /// the caller should defer the whole trigger.
    pub async fn reconcile(&self, spec: &ProcessSpec) -> Result<ReconcileOutcome> {
        let current = self.supervisor.current_spec().await?;
        if current.as_ref() == Some(spec) {
            debug!(command = %spec.command, "Sidecar spec unchanged");
            return Ok(ReconcileOutcome::default());
        }

        self.supervisor.apply_spec(spec).await?;
        let restarted = self.supervisor.is_running().await?;
        if restarted {
            self.supervisor.stop().await?;
        }
        self.supervisor.start().await?;

        let error_artifact = match self.supervisor.read_file(&self.error_log).await {
            Ok(text) if text.trim().is_empty() => None,
            Ok(text) => Some(text),
            Err(SupervisorError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        info!(
            command = %spec.command,
            restarted,
            sidecar_error = error_artifact.is_some(),
            "Applied sidecar spec"
        );

        Ok(ReconcileOutcome {
            applied: true,
            error_artifact,
        })
    }
}
