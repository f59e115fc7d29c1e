//! The registration controller.
//!
//! Reacts to configuration changes and operator actions by driving the
//! sidecar, the retrieval loop and the Kubernetes applier, and keeps the
//! persisted record in step with the [`Registration`] state it owns.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use rancher_integrator_core::{ClusterName, IntegratorConfig, SidecarCommand};
use rancher_integrator_kube::ManifestApplier;
use rancher_integrator_store::{RegistrationRecord, Store};
use tracing::{debug, error, info, warn};

use crate::adapter::SidecarAdapter;
use crate::error::Result;
use crate::lifecycle::{Registered, Registration, RegistrationPhase, Unregistered};
use crate::report::{ActionResult, ActionSink, StatusReporter, UnitStatus};
use crate::retrieval::retrieve_manifest;
use crate::retry::RetryPolicy;
use crate::spec::build_process_spec;
use crate::supervisor::ArtifactPattern;
use crate::types::ControllerConfig;

/// Status annotation while no cluster is registered.
pub const NOT_REGISTERED: &str = "not registered";
/// Action result of a successful register.
pub const REGISTERED_RESULT: &str = "Cluster registered.";
/// Action result of a register while already registered.
pub const ALREADY_REGISTERED: &str =
    "Cluster already registered. Unregister it before registering again.";
/// Action result of a successful unregister.
pub const UNREGISTERED_RESULT: &str = "Unregistered cluster successfully";
/// Failure message of an unregister while not registered.
pub const NOTHING_TO_UNREGISTER: &str = "Cluster not registered, nothing to do.";

/// Configuration shared between the HTTP surface and the controller.
pub type SharedConfig = Arc<RwLock<IntegratorConfig>>;

/// What should happen to the trigger that was just handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fully handled.
    Done,
    /// The sidecar could not be reached; deliver the trigger again later.
    Deferred,
}

/// Where the import manifest appears and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Directory polled for the manifest.
    pub artifact_dir: PathBuf,
    /// Manifest file name pattern.
    pub pattern: ArtifactPattern,
    /// Polling policy.
    pub retry: RetryPolicy,
}

impl From<&ControllerConfig> for ControllerSettings {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            artifact_dir: config.artifact_dir.clone(),
            pattern: ArtifactPattern::import_manifest(),
            retry: config.retry_policy(),
        }
    }
}

/// Drives registration and unregistration of the cluster.
pub struct RegistrationController {
    store: Arc<dyn Store>,
    adapter: SidecarAdapter,
    applier: Arc<dyn ManifestApplier>,
    reporter: Arc<dyn StatusReporter>,
    config: SharedConfig,
    settings: ControllerSettings,
    registration: Registration,
}

impl RegistrationController {
    /// Create a controller, restoring the registration from the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be loaded or is inconsistent.
    pub fn new(
        store: Arc<dyn Store>,
        adapter: SidecarAdapter,
        applier: Arc<dyn ManifestApplier>,
        reporter: Arc<dyn StatusReporter>,
        config: SharedConfig,
        settings: ControllerSettings,
    ) -> Result<Self> {
        let record = store.load_registration()?;
        let registration = Registration::from_record(&record)?;
        reporter.set_phase(registration.phase());

        info!(
            phase = ?registration.phase(),
            cluster_name = ?registration.cluster_name(),
            "Restored registration state"
        );

        Ok(Self {
            store,
            adapter,
            applier,
            reporter,
            config,
            settings,
            registration,
        })
    }

    /// Current registration state.
    #[must_use]
    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> RegistrationPhase {
        self.registration.phase()
    }

    fn config_snapshot(&self) -> IntegratorConfig {
        self.config.read().clone()
    }

    fn active_status(&self) -> UnitStatus {
        match &self.registration {
            Registration::Unregistered(_) => UnitStatus::Active(Some(NOT_REGISTERED.to_string())),
            Registration::Registered(registered) => {
                UnitStatus::Active(Some(registered.name().to_string()))
            }
        }
    }

    fn settle(&mut self, next: Registration) {
        self.registration = next;
        self.reporter.set_phase(self.registration.phase());
    }

    /// Configuration changed: verify the sidecar against the new configuration.
    ///
    /// Never changes the registration.
    pub async fn on_config_changed(&mut self) -> Disposition {
        let spec = build_process_spec(
            &self.config_snapshot(),
            self.registration.cluster_name(),
            SidecarCommand::Verify,
        );

        match self.adapter.reconcile(&spec).await {
            Err(e) if e.is_unavailable() => {
                info!(error = %e, "Sidecar not reachable, deferring configuration change");
                Disposition::Deferred
            }
            Err(e) => {
                warn!(error = %e, "Sidecar verify failed");
                self.reporter
                    .set_status(UnitStatus::Blocked(format!("Sidecar failed: {e}")));
                Disposition::Done
            }
            Ok(outcome) => {
                let status = match outcome.first_error_line() {
                    Some(line) => UnitStatus::Blocked(line.to_string()),
                    None => self.active_status(),
                };
                debug!(applied = outcome.applied, ?status, "Verified sidecar configuration");
                self.reporter.set_status(status);
                Disposition::Done
            }
        }
    }

    /// The sidecar became reachable; same as a configuration change.
    pub async fn on_sidecar_ready(&mut self) -> Disposition {
        debug!("Sidecar ready");
        self.on_config_changed().await
    }

    /// Relation data changed. Reserved for reading connection details from
    /// the relation; nothing to do yet.
    pub fn on_relation_changed(&mut self, data: &BTreeMap<String, String>) -> Disposition {
        debug!(keys = data.len(), "Relation changed");
        Disposition::Done
    }

    /// Register the cluster, optionally under `requested`.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails; every other failure is
    /// reported through `action`.
    pub async fn on_register(
        &mut self,
        requested: Option<ClusterName>,
        action: &dyn ActionSink,
    ) -> Result<Disposition> {
        let unregistered = match std::mem::take(&mut self.registration) {
            Registration::Registered(registered) => {
                info!(cluster_name = %registered.name(), "Register requested while registered");
                action.succeed(result(ALREADY_REGISTERED, registered.name()));
                self.registration = Registration::Registered(registered);
                return Ok(Disposition::Done);
            }
            Registration::Unregistered(unregistered) => unregistered,
        };

        self.reporter.set_phase(RegistrationPhase::Registering);
        let (next, outcome) = self.register(unregistered, requested, action).await;
        self.settle(next);
        outcome
    }

    async fn register(
        &self,
        unregistered: Unregistered,
        requested: Option<ClusterName>,
        action: &dyn ActionSink,
    ) -> (Registration, Result<Disposition>) {
        let config = self.config_snapshot();
        let mut stored = unregistered.to_record();
        let registering = unregistered.begin(requested);
        let spec = build_process_spec(&config, registering.name(), SidecarCommand::Register);

        let outcome = match self.adapter.reconcile(&spec).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_unavailable() => {
                info!(error = %e, "Sidecar not reachable, deferring register");
                let previous = Registration::Unregistered(registering.rollback());
                return (previous, Ok(Disposition::Deferred));
            }
            Err(e) => {
                action.fail(&format!("Sidecar failed to start: {e}"));
                return self.give_up(&stored, registering.fail());
            }
        };

        if let Some(line) = outcome.first_error_line() {
            warn!(error = line, "Sidecar reported a registration error");
            action.fail(&format!("Registration failed: {line}"));
            return self.give_up(&stored, registering.fail());
        }

        let pinned_record = registering.to_record();
        if pinned_record != stored {
            if let Err(e) = self.store.save_registration(&pinned_record.clone().touched()) {
                let previous = Registration::Unregistered(registering.rollback());
                return (previous, Err(e.into()));
            }
            stored = pinned_record;
        }

        action.log("Waiting for the import manifest");
        let retrieved = match retrieve_manifest(
            self.adapter.supervisor(),
            &self.settings.artifact_dir,
            &self.settings.pattern,
            &self.settings.retry,
        )
        .await
        {
            Ok(retrieved) => retrieved,
            Err(e) => {
                warn!(error = %e, "Import manifest retrieval failed");
                action.fail(&format!("Failed to retrieve the import manifest: {e}"));
                self.compensate(&config, registering.name()).await;
                return self.give_up(&stored, registering.fail());
            }
        };

        let staged = registering.stage(retrieved.cluster_name, retrieved.content);
        let staged_record = staged.to_record();
        if staged_record != stored {
            if let Err(e) = self.store.save_registration(&staged_record.clone().touched()) {
                return (Registration::Unregistered(staged.abandon()), Err(e.into()));
            }
            debug!(cluster_name = %staged.name(), "Stored import manifest");
            stored = staged_record;
        }

        if let Err(e) = self.applier.apply(staged.manifest()).await {
            warn!(
                cluster_name = %staged.name(),
                error = %e,
                permission_denied = e.is_permission_denied(),
                retriable = e.is_retriable(),
                "Failed to apply import manifest"
            );
            let message = match e.remediation() {
                Some(hint) => format!("Failed to apply the import manifest: {e}. Remediation: {hint}"),
                None => format!("Failed to apply the import manifest: {e}"),
            };
            action.fail(&message);
            self.compensate(&config, Some(staged.name())).await;
            return self.give_up(&stored, staged.abandon());
        }

        let registered = staged.clone().commit();
        if let Err(e) = self.store.save_registration(&registered.to_record().touched()) {
            error!(
                cluster_name = %registered.name(),
                error = %e,
                "Failed to persist registration"
            );
            return (Registration::Unregistered(staged.abandon()), Err(e.into()));
        }

        info!(cluster_name = %registered.name(), "Cluster registered");
        action.succeed(result(REGISTERED_RESULT, registered.name()));
        self.reporter
            .set_status(UnitStatus::Active(Some(registered.name().to_string())));

        (Registration::Registered(registered), Ok(Disposition::Done))
    }

    /// Settle on a failed attempt, persisting `next` if it differs from what
    /// is already stored.
    fn give_up(
        &self,
        stored: &RegistrationRecord,
        next: Unregistered,
    ) -> (Registration, Result<Disposition>) {
        let record = next.to_record();
        let saved = if record == *stored {
            Ok(())
        } else {
            self.store.save_registration(&record.touched())
        };
        (
            Registration::Unregistered(next),
            saved.map(|()| Disposition::Done).map_err(Into::into),
        )
    }

    /// Best-effort unregister after a failed register. Failures are logged.
    async fn compensate(&self, config: &IntegratorConfig, name: Option<&ClusterName>) {
        let spec = build_process_spec(config, name, SidecarCommand::Unregister);

        match self.adapter.reconcile(&spec).await {
            Ok(outcome) => match outcome.first_error_line() {
                Some(line) => warn!(error = line, "Compensating unregister reported an error"),
                None => info!(cluster_name = ?name, "Issued compensating unregister"),
            },
            Err(e) => warn!(error = %e, "Compensating unregister failed"),
        }
    }

    /// Unregister the cluster.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails; every other failure is
    /// reported through `action`.
    pub async fn on_unregister(&mut self, action: &dyn ActionSink) -> Result<Disposition> {
        let registered = match std::mem::take(&mut self.registration) {
            Registration::Unregistered(unregistered) => {
                debug!("Unregister requested while not registered");
                action.fail(NOTHING_TO_UNREGISTER);
                self.registration = Registration::Unregistered(unregistered);
                return Ok(Disposition::Done);
            }
            Registration::Registered(registered) => registered,
        };

        let (next, outcome) = self.unregister(registered, action).await;
        self.settle(next);
        outcome
    }

    async fn unregister(
        &self,
        registered: Registered,
        action: &dyn ActionSink,
    ) -> (Registration, Result<Disposition>) {
        let spec = build_process_spec(
            &self.config_snapshot(),
            Some(registered.name()),
            SidecarCommand::Unregister,
        );

        let sidecar_error = match self.adapter.reconcile(&spec).await {
            Err(e) if e.is_unavailable() => {
                info!(error = %e, "Sidecar not reachable, deferring unregister");
                return (Registration::Registered(registered), Ok(Disposition::Deferred));
            }
            Err(e) => Some(format!("Sidecar failed: {e}")),
            Ok(outcome) => outcome.first_error_line().map(str::to_string),
        };

        if let Some(message) = sidecar_error {
            warn!(cluster_name = %registered.name(), error = %message, "Unregistration failed");
            self.reporter.set_status(UnitStatus::Blocked(message.clone()));
            action.fail(&format!("Unregistration failed: {message}"));
            return (Registration::Registered(registered), Ok(Disposition::Done));
        }

        let name = registered.name().clone();
        let (unregistered, manifest) = registered.unregister();

        if let Err(e) = self.applier.delete(&manifest).await {
            error!(
                cluster_name = %name,
                error = %e,
                "Failed to delete import manifest objects; clearing the stored manifest anyway"
            );
            action.log(&format!("Some manifest objects could not be deleted: {e}"));
        }

        let cleared = self.store.clear_registration();

        info!(cluster_name = %name, "Cluster unregistered");
        action.succeed(result(UNREGISTERED_RESULT, &name));
        self.reporter
            .set_status(UnitStatus::Active(Some(NOT_REGISTERED.to_string())));

        (
            Registration::Unregistered(unregistered),
            cleared.map(|()| Disposition::Done).map_err(Into::into),
        )
    }
}

fn result(message: &str, name: &ClusterName) -> ActionResult {
    ActionResult::from([
        ("result".to_string(), message.to_string()),
        ("name".to_string(), name.to_string()),
    ])
}

impl std::fmt::Debug for RegistrationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationController")
            .field("registration", &self.registration)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rancher_integrator_kube::MockApplier;
    use rancher_integrator_store::MemoryStore;
    use std::time::Duration;

    use crate::report::mock::RecordingReporter;
    use crate::supervisor::mock::MockSupervisor;

    const ERROR_LOG: &str = "/usr/src/app/error.log";

    struct Fixture {
        controller: RegistrationController,
        supervisor: Arc<MockSupervisor>,
        reporter: Arc<RecordingReporter>,
    }

    fn fixture() -> Fixture {
        let supervisor = Arc::new(MockSupervisor::new());
        let reporter = Arc::new(RecordingReporter::new());
        let controller = RegistrationController::new(
            Arc::new(MemoryStore::new()),
            SidecarAdapter::new(supervisor.clone(), ERROR_LOG),
            Arc::new(MockApplier::new()),
            reporter.clone(),
            Arc::new(RwLock::new(IntegratorConfig::default())),
            ControllerSettings {
                artifact_dir: PathBuf::from("/usr/src/app/import_manifest"),
                pattern: ArtifactPattern::import_manifest(),
                retry: RetryPolicy::new(5, Duration::from_secs(1)),
            },
        )
        .unwrap();
        Fixture {
            controller,
            supervisor,
            reporter,
        }
    }

    #[tokio::test]
    async fn config_changed_reports_not_registered() {
        let mut f = fixture();

        assert_eq!(f.controller.on_config_changed().await, Disposition::Done);
        assert_eq!(
            f.reporter.last_status(),
            Some(UnitStatus::Active(Some(NOT_REGISTERED.to_string())))
        );
        assert_eq!(f.supervisor.applied_commands(), vec![SidecarCommand::Verify]);
    }

    #[tokio::test]
    async fn unchanged_config_does_not_restart() {
        let mut f = fixture();

        f.controller.on_config_changed().await;
        f.controller.on_config_changed().await;

        assert_eq!(f.supervisor.start_count(), 1);
        assert_eq!(f.controller.phase(), RegistrationPhase::Unregistered);
    }

    #[tokio::test]
    async fn sidecar_error_blocks_unit() {
        let mut f = fixture();
        f.supervisor.on_start(
            SidecarCommand::Verify,
            ERROR_LOG,
            "Could not reach https://rancher.example: connection refused\n",
        );

        f.controller.on_config_changed().await;

        assert_eq!(
            f.reporter.last_status(),
            Some(UnitStatus::Blocked(
                "Could not reach https://rancher.example: connection refused".to_string()
            ))
        );
        assert!(!f.controller.registration().is_registered());
    }

    #[tokio::test]
    async fn unreachable_sidecar_defers() {
        let mut f = fixture();
        f.supervisor.set_unavailable(true);

        assert_eq!(f.controller.on_config_changed().await, Disposition::Deferred);
        assert!(f.reporter.last_status().is_none());
    }

    #[tokio::test]
    async fn sidecar_ready_verifies() {
        let mut f = fixture();
        assert_eq!(f.controller.on_sidecar_ready().await, Disposition::Done);
        assert_eq!(f.supervisor.applied_commands(), vec![SidecarCommand::Verify]);
    }

    #[tokio::test]
    async fn relation_changed_is_a_no_op() {
        let mut f = fixture();
        let data = BTreeMap::from([("url".to_string(), "https://rancher".to_string())]);
        assert_eq!(f.controller.on_relation_changed(&data), Disposition::Done);
        assert_eq!(f.supervisor.mutation_count(), 0);
    }
}
