//! Status and action reporting.
//!
//! The controller reports through two narrow traits: [`StatusReporter`] for
//! the unit's standing status and [`ActionSink`] for the outcome of one
//! operator action. [`StatusBoard`] implements both for the daemon and keeps
//! the records the HTTP surface serves.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::lifecycle::RegistrationPhase;

/// Key/value results of a successful action.
pub type ActionResult = BTreeMap<String, String>;

/// Actions kept on the board before the oldest are dropped.
const MAX_ACTIONS: usize = 256;

/// Standing status of the unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum UnitStatus {
    /// Working; the message annotates the registration.
    Active(Option<String>),
    /// Needs operator attention.
    Blocked(String),
}

impl Default for UnitStatus {
    fn default() -> Self {
        Self::Active(None)
    }
}

/// Receives unit status updates.
pub trait StatusReporter: Send + Sync {
    /// Replace the unit status.
    fn set_status(&self, status: UnitStatus);

    /// Record the registration phase.
    fn set_phase(&self, phase: RegistrationPhase);
}

/// Receives the outcome of one action.
pub trait ActionSink: Send + Sync {
    /// Append a progress line.
    fn log(&self, message: &str);

    /// Finish the action successfully.
    fn succeed(&self, result: ActionResult);

    /// Finish the action with a failure message.
    fn fail(&self, message: &str);
}

/// Operator actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Register the cluster.
    Register,
    /// Unregister the cluster.
    Unregister,
}

/// Progress of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Queued, not picked up yet (or deferred).
    Pending,
    /// Being processed.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Failed,
}

impl ActionState {
    /// Whether the action has finished.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Everything known about one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Action identifier.
    pub id: u64,
    /// What was asked.
    pub kind: ActionKind,
    /// Progress.
    pub state: ActionState,
    /// Results of a successful action.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub results: ActionResult,
    /// Failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Progress lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log: Vec<String>,
    /// When the action was queued.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Unit status.
    pub status: UnitStatus,
    /// Registration phase.
    pub phase: RegistrationPhase,
}

#[derive(Default)]
struct BoardInner {
    status: UnitStatus,
    phase: RegistrationPhase,
    actions: BTreeMap<u64, ActionRecord>,
    next_id: u64,
}

/// In-memory status and action records.
#[derive(Default)]
pub struct StatusBoard {
    inner: RwLock<BoardInner>,
}

impl StatusBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status and phase.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner.read();
        StatusSnapshot {
            status: inner.status.clone(),
            phase: inner.phase,
        }
    }

    /// Queue a new action and return its identifier.
    pub fn create_action(&self, kind: ActionKind) -> u64 {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let id = inner.next_id;
        let now = Utc::now();
        inner.actions.insert(
            id,
            ActionRecord {
                id,
                kind,
                state: ActionState::Pending,
                results: ActionResult::new(),
                message: None,
                log: Vec::new(),
                created_at: now,
                updated_at: now,
            },
        );

        while inner.actions.len() > MAX_ACTIONS {
            inner.actions.pop_first();
        }
        id
    }

    /// Look up an action.
    #[must_use]
    pub fn get_action(&self, id: u64) -> Option<ActionRecord> {
        self.inner.read().actions.get(&id).cloned()
    }

    /// Mark an unfinished action as running or pending again.
    pub fn mark(&self, id: u64, state: ActionState) {
        self.update(id, |record| {
            if !record.state.is_finished() {
                record.state = state;
            }
        });
    }

    /// Sink that reports into the record of action `id`.
    #[must_use]
    pub fn action(self: &Arc<Self>, id: u64) -> BoardAction {
        BoardAction {
            board: Arc::clone(self),
            id,
        }
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut ActionRecord)) {
        if let Some(record) = self.inner.write().actions.get_mut(&id) {
            f(record);
            record.updated_at = Utc::now();
        }
    }
}

impl StatusReporter for StatusBoard {
    fn set_status(&self, status: UnitStatus) {
        tracing::debug!(?status, "Unit status changed");
        self.inner.write().status = status;
    }

    fn set_phase(&self, phase: RegistrationPhase) {
        self.inner.write().phase = phase;
    }
}

/// [`ActionSink`] writing into a [`StatusBoard`] record.
#[derive(Clone)]
pub struct BoardAction {
    board: Arc<StatusBoard>,
    id: u64,
}

impl BoardAction {
    /// Identifier of the action.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }
}

impl ActionSink for BoardAction {
    fn log(&self, message: &str) {
        self.board
            .update(self.id, |record| record.log.push(message.to_string()));
    }

    fn succeed(&self, result: ActionResult) {
        self.board.update(self.id, |record| {
            record.state = ActionState::Completed;
            record.results = result;
        });
    }

    fn fail(&self, message: &str) {
        self.board.update(self.id, |record| {
            record.state = ActionState::Failed;
            record.message = Some(message.to_string());
        });
    }
}

/// A reporter that records everything, for tests.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorded {
        statuses: Vec<UnitStatus>,
        phases: Vec<RegistrationPhase>,
        logs: Vec<String>,
        successes: Vec<ActionResult>,
        failures: Vec<String>,
    }

    /// Records status updates and action outcomes.
    #[derive(Default)]
    pub struct RecordingReporter {
        recorded: Mutex<Recorded>,
    }

    impl RecordingReporter {
        /// Create an empty recorder.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Most recent unit status.
        #[must_use]
        pub fn last_status(&self) -> Option<UnitStatus> {
            self.recorded.lock().statuses.last().cloned()
        }

        /// Most recent phase.
        #[must_use]
        pub fn last_phase(&self) -> Option<RegistrationPhase> {
            self.recorded.lock().phases.last().copied()
        }

        /// Results of every successful action.
        #[must_use]
        pub fn successes(&self) -> Vec<ActionResult> {
            self.recorded.lock().successes.clone()
        }

        /// Messages of every failed action.
        #[must_use]
        pub fn failures(&self) -> Vec<String> {
            self.recorded.lock().failures.clone()
        }

        /// Action log lines.
        #[must_use]
        pub fn logs(&self) -> Vec<String> {
            self.recorded.lock().logs.clone()
        }
    }

    impl StatusReporter for RecordingReporter {
        fn set_status(&self, status: UnitStatus) {
            self.recorded.lock().statuses.push(status);
        }

        fn set_phase(&self, phase: RegistrationPhase) {
            self.recorded.lock().phases.push(phase);
        }
    }

    impl ActionSink for RecordingReporter {
        fn log(&self, message: &str) {
            self.recorded.lock().logs.push(message.to_string());
        }

        fn succeed(&self, result: ActionResult) {
            self.recorded.lock().successes.push(result);
        }

        fn fail(&self, message: &str) {
            self.recorded.lock().failures.push(message.to_string());
        }
    }
}
