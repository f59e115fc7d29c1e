//! Registration controller for rancher-integrator.
//!
//! This crate drives registration of the hosting cluster with a remote
//! Rancher server. A sidecar process performs the remote calls; the controller
//! tells it what to do through its environment, waits for the import manifest
//! it writes, and applies that manifest to the local cluster.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP surface (axum)                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ triggers
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TriggerWorker (one trigger at a time)          │
//! │  ┌──────────────┐ ┌──────────────┐ ┌─────────────────────┐  │
//! │  │ Registration │ │   Manifest   │ │    Lifecycle        │  │
//! │  │  Controller  │ │   Retrieval  │ │    (typestate)      │  │
//! │  └──────────────┘ └──────────────┘ └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │  Store   │   │ Sidecar  │   │ Applier  │
//!        │ (RocksDB)│   │(process) │   │  (K8s)   │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use rancher_integrator_control::{
//!     trigger_queue, ControllerConfig, ControllerSettings, LocalSupervisor,
//!     RegistrationController, SidecarAdapter, SidecarConfig, StatusBoard, Trigger,
//! };
//! use rancher_integrator_core::IntegratorConfig;
//! use rancher_integrator_kube::KubeApplier;
//! use rancher_integrator_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ControllerConfig::from_env();
//! let store = Arc::new(RocksStore::open(&config.data_dir)?);
//! let supervisor = Arc::new(LocalSupervisor::new(
//!     SidecarConfig::from_env(),
//!     &config.error_log_path,
//! ));
//! let board = Arc::new(StatusBoard::new());
//!
//! let controller = RegistrationController::new(
//!     store,
//!     SidecarAdapter::new(supervisor, &config.error_log_path),
//!     Arc::new(KubeApplier::new(config.applier.clone()).await?),
//!     board.clone(),
//!     Arc::new(RwLock::new(IntegratorConfig::default())),
//!     ControllerSettings::from(&config),
//! )?;
//!
//! let (triggers, worker) = trigger_queue(controller, board, config.defer_delay());
//! tokio::spawn(worker.run());
//! triggers.send(Trigger::SidecarReady)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Deferral
//!
//! When the sidecar cannot be reached a handler returns
//! [`Disposition::Deferred`] without changing anything, and the worker sends
//! the same trigger again after [`ControllerConfig::defer_delay`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod adapter;
pub mod controller;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod local;
pub mod queue;
pub mod report;
pub mod retrieval;
pub mod retry;
pub mod spec;
pub mod supervisor;
pub mod types;

pub use adapter::{ReconcileOutcome, SidecarAdapter};
pub use controller::{
    ControllerSettings, Disposition, RegistrationController, SharedConfig, ALREADY_REGISTERED,
    NOTHING_TO_UNREGISTER, NOT_REGISTERED, REGISTERED_RESULT, UNREGISTERED_RESULT,
};
pub use error::{ControlError, Result};
pub use http::{router, ApiError, AppState};
pub use lifecycle::{Registration, RegistrationPhase};
pub use local::LocalSupervisor;
pub use queue::{trigger_queue, Trigger, TriggerSender, TriggerWorker};
pub use report::{
    ActionKind, ActionRecord, ActionResult, ActionSink, ActionState, StatusBoard,
    StatusReporter, StatusSnapshot, UnitStatus,
};
pub use retrieval::{retrieve_manifest, RetrievalError, RetrievedManifest};
pub use retry::RetryPolicy;
pub use spec::{build_process_spec, ProcessSpec};
pub use supervisor::{ArtifactPattern, Supervisor, SupervisorError};
pub use types::{ActionAccepted, ControllerConfig, RegisterRequest, SidecarConfig};

#[cfg(any(test, feature = "test-utils"))]
pub use report::mock::RecordingReporter;
#[cfg(any(test, feature = "test-utils"))]
pub use supervisor::mock::MockSupervisor;
