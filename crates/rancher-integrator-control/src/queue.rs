//! Serial trigger delivery.
//!
//! Triggers go through an unbounded channel drained by a single worker that
//! owns the controller, so one trigger is fully handled before the next one
//! starts. A deferred trigger is sent again after a delay.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rancher_integrator_core::ClusterName;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, error, info, warn};

use crate::controller::{Disposition, RegistrationController};
use crate::error::{ControlError, Result};
use crate::report::{ActionSink, ActionState, StatusBoard};

/// Something the controller reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The declarative configuration changed.
    ConfigChanged,
    /// The sidecar became reachable.
    SidecarReady,
    /// Operator asked to register.
    Register {
        /// Board record of the action.
        action: u64,
        /// Requested cluster name.
        name: Option<ClusterName>,
    },
    /// Operator asked to unregister.
    Unregister {
        /// Board record of the action.
        action: u64,
    },
    /// Relation data changed.
    RelationChanged(BTreeMap<String, String>),
}

impl Trigger {
    fn label(&self) -> &'static str {
        match self {
            Self::ConfigChanged => "config-changed",
            Self::SidecarReady => "sidecar-ready",
            Self::Register { .. } => "register",
            Self::Unregister { .. } => "unregister",
            Self::RelationChanged(_) => "relation-changed",
        }
    }

    const fn action(&self) -> Option<u64> {
        match self {
            Self::Register { action, .. } | Self::Unregister { action } => Some(*action),
            _ => None,
        }
    }
}

/// Handle for submitting triggers.
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: UnboundedSender<Trigger>,
}

impl TriggerSender {
    /// Queue a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::QueueClosed`] if the worker has stopped.
    pub fn send(&self, trigger: Trigger) -> Result<()> {
        self.tx.send(trigger).map_err(|_| ControlError::QueueClosed)
    }

    /// Whether the worker has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    #[cfg(test)]
    pub(crate) fn channel() -> (Self, UnboundedReceiver<Trigger>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

/// The single consumer of the trigger queue.
pub struct TriggerWorker {
    controller: RegistrationController,
    board: Arc<StatusBoard>,
    rx: UnboundedReceiver<Trigger>,
    redeliver: WeakUnboundedSender<Trigger>,
    defer_delay: Duration,
}

/// Create a queue feeding `controller`.
///
/// The worker stops once every [`TriggerSender`] is dropped.
#[must_use]
pub fn trigger_queue(
    controller: RegistrationController,
    board: Arc<StatusBoard>,
    defer_delay: Duration,
) -> (TriggerSender, TriggerWorker) {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = TriggerWorker {
        controller,
        board,
        rx,
        redeliver: tx.downgrade(),
        defer_delay,
    };
    (TriggerSender { tx }, worker)
}

impl TriggerWorker {
    /// Process triggers until the queue closes.
    pub async fn run(mut self) {
        info!("Trigger worker started");

        while let Some(trigger) = self.rx.recv().await {
            debug!(trigger = trigger.label(), "Handling trigger");

            if self.dispatch(&trigger).await == Disposition::Deferred {
                self.defer(trigger);
            }
        }

        info!("Trigger worker stopped");
    }

    async fn dispatch(&mut self, trigger: &Trigger) -> Disposition {
        if let Some(action) = trigger.action() {
            self.board.mark(action, ActionState::Running);
        }

        let outcome = match trigger {
            Trigger::ConfigChanged => Ok(self.controller.on_config_changed().await),
            Trigger::SidecarReady => Ok(self.controller.on_sidecar_ready().await),
            Trigger::RelationChanged(data) => Ok(self.controller.on_relation_changed(data)),
            Trigger::Register { action, name } => {
                let sink = self.board.action(*action);
                self.controller.on_register(name.clone(), &sink).await
            }
            Trigger::Unregister { action } => {
                let sink = self.board.action(*action);
                self.controller.on_unregister(&sink).await
            }
        };

        match outcome {
            Ok(disposition) => disposition,
            Err(e) => {
                error!(trigger = trigger.label(), error = %e, "Trigger failed");
                if let Some(action) = trigger.action() {
                    self.board.action(action).fail(&format!("Internal error: {e}"));
                }
                Disposition::Done
            }
        }
    }

    fn defer(&self, trigger: Trigger) {
        if let Some(action) = trigger.action() {
            self.board.mark(action, ActionState::Pending);
        }

        let Some(tx) = self.redeliver.upgrade() else {
            warn!(trigger = trigger.label(), "Queue closing, dropping deferred trigger");
            return;
        };

        info!(
            trigger = trigger.label(),
            delay_ms = u64::try_from(self.defer_delay.as_millis()).unwrap_or(u64::MAX),
            "Deferred trigger"
        );
        let delay = self.defer_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(trigger).is_err() {
                debug!("Queue closed before deferred trigger was delivered");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use parking_lot::RwLock;
    use rancher_integrator_core::{IntegratorConfig, SidecarCommand};
    use rancher_integrator_kube::MockApplier;
    use rancher_integrator_store::MemoryStore;

    use crate::adapter::SidecarAdapter;
    use crate::controller::{ControllerSettings, NOT_REGISTERED, REGISTERED_RESULT};
    use crate::lifecycle::RegistrationPhase;
    use crate::report::{ActionKind, UnitStatus};
    use crate::retry::RetryPolicy;
    use crate::supervisor::mock::MockSupervisor;
    use crate::supervisor::ArtifactPattern;

    const ARTIFACT_DIR: &str = "/usr/src/app/import_manifest";

    fn start(supervisor: &Arc<MockSupervisor>) -> (TriggerSender, Arc<StatusBoard>) {
        let board = Arc::new(StatusBoard::new());
        let controller = RegistrationController::new(
            Arc::new(MemoryStore::new()),
            SidecarAdapter::new(supervisor.clone(), "/usr/src/app/error.log"),
            Arc::new(MockApplier::new()),
            board.clone(),
            Arc::new(RwLock::new(IntegratorConfig::default())),
            ControllerSettings {
                artifact_dir: PathBuf::from(ARTIFACT_DIR),
                pattern: ArtifactPattern::import_manifest(),
                retry: RetryPolicy::new(5, Duration::from_secs(1)),
            },
        )
        .unwrap();

        let (sender, worker) = trigger_queue(controller, board.clone(), Duration::from_secs(5));
        tokio::spawn(worker.run());
        (sender, board)
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_trigger_is_redelivered() {
        let supervisor = Arc::new(MockSupervisor::new());
        supervisor.set_unavailable(true);
        let (sender, board) = start(&supervisor);

        sender.send(Trigger::ConfigChanged).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(board.snapshot().status, UnitStatus::Active(None));

        supervisor.set_unavailable(false);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            board.snapshot().status,
            UnitStatus::Active(Some(NOT_REGISTERED.to_string()))
        );
        assert_eq!(supervisor.applied_commands(), vec![SidecarCommand::Verify]);
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_action_returns_to_pending() {
        let supervisor = Arc::new(MockSupervisor::new());
        supervisor.set_unavailable(true);
        let (sender, board) = start(&supervisor);

        let id = board.create_action(ActionKind::Register);
        sender.send(Trigger::Register { action: id, name: None }).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(board.get_action(id).unwrap().state, ActionState::Pending);
        assert_eq!(board.snapshot().phase, RegistrationPhase::Unregistered);
    }

    #[tokio::test(start_paused = true)]
    async fn register_action_completes_through_queue() {
        let supervisor = Arc::new(MockSupervisor::new());
        supervisor.on_start(
            SidecarCommand::Register,
            format!("{ARTIFACT_DIR}/import_mycluster.yaml"),
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: cattle-system\n",
        );
        let (sender, board) = start(&supervisor);

        let id = board.create_action(ActionKind::Register);
        sender
            .send(Trigger::Register {
                action: id,
                name: Some(ClusterName::new("mycluster").unwrap()),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let record = board.get_action(id).unwrap();
        assert_eq!(record.state, ActionState::Completed);
        assert_eq!(record.results["result"], REGISTERED_RESULT);
        assert_eq!(record.results["name"], "mycluster");
        assert_eq!(board.snapshot().phase, RegistrationPhase::Registered);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_are_handled_in_order() {
        let supervisor = Arc::new(MockSupervisor::new());
        let (sender, board) = start(&supervisor);

        let unregister = board.create_action(ActionKind::Unregister);
        sender.send(Trigger::ConfigChanged).unwrap();
        sender.send(Trigger::Unregister { action: unregister }).unwrap();
        sender
            .send(Trigger::RelationChanged(BTreeMap::new()))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(supervisor.applied_commands(), vec![SidecarCommand::Verify]);
        assert_eq!(board.get_action(unregister).unwrap().state, ActionState::Failed);
    }
}
