//! Rancher integrator daemon.
//!
//! Runs the registration controller with a locally supervised sidecar and
//! serves the HTTP surface operators use to configure it and trigger actions.

use std::sync::Arc;

use parking_lot::RwLock;
use rancher_integrator_control::{
    router, trigger_queue, AppState, ControllerConfig, ControllerSettings, LocalSupervisor,
    RegistrationController, SidecarAdapter, SidecarConfig, StatusBoard, Trigger,
};
use rancher_integrator_core::IntegratorConfig;
use rancher_integrator_kube::KubeApplier;
use rancher_integrator_store::{RocksStore, Store};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rancher_integrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting rancher-integrator");

    let config = ControllerConfig::from_env();
    let sidecar = SidecarConfig::from_env();

    let store = Arc::new(RocksStore::open(&config.data_dir)?);
    tracing::info!(data_dir = %config.data_dir.display(), "Initialized RocksDB store");

    let applier = Arc::new(KubeApplier::new(config.applier.clone()).await?);
    tracing::info!(
        namespace = %config.applier.default_namespace,
        field_manager = %config.applier.field_manager,
        "Initialized Kubernetes applier"
    );

    let supervisor = Arc::new(LocalSupervisor::new(sidecar, &config.error_log_path));
    let adapter = SidecarAdapter::new(supervisor, &config.error_log_path);

    let board = Arc::new(StatusBoard::new());
    let integrator_config = match store.load_config()? {
        Some(saved) => {
            tracing::info!(url = ?saved.url, "Restored saved configuration");
            saved
        }
        None => IntegratorConfig::default(),
    };
    let shared_config = Arc::new(RwLock::new(integrator_config));

    let controller = RegistrationController::new(
        store.clone(),
        adapter,
        applier,
        board.clone(),
        shared_config.clone(),
        ControllerSettings::from(&config),
    )?;

    let (triggers, worker) = trigger_queue(controller, board.clone(), config.defer_delay());
    tokio::spawn(worker.run());
    triggers.send(Trigger::SidecarReady)?;

    let app = router(AppState {
        board,
        config: shared_config,
        store,
        triggers,
    });

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
