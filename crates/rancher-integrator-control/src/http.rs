//! HTTP surface of the daemon.
//!
//! Operators change configuration and trigger actions here; every mutating
//! request only enqueues a trigger and returns `202 Accepted`. Action
//! outcomes are polled from `/v1/actions/:id`.
//!
//! | Method | Path                          | Effect                     |
//! |--------|-------------------------------|----------------------------|
//! | GET    | `/health`                     | liveness                   |
//! | GET    | `/ready`                      | trigger worker alive       |
//! | GET    | `/v1/status`                  | unit status and phase      |
//! | PUT    | `/v1/config`                  | replace and save configuration |
//! | POST   | `/v1/actions/register`        | queue a register action    |
//! | POST   | `/v1/actions/unregister`      | queue an unregister action |
//! | GET    | `/v1/actions/:id`             | action record              |
//! | POST   | `/v1/relations/cluster-control` | relation data changed    |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rancher_integrator_core::{ClusterName, IntegratorConfig};
use rancher_integrator_store::Store;
use serde::Serialize;
use thiserror::Error;

use crate::controller::SharedConfig;
use crate::error::ControlError;
use crate::queue::{Trigger, TriggerSender};
use crate::report::{ActionKind, ActionRecord, StatusBoard, StatusSnapshot};
use crate::types::{ActionAccepted, RegisterRequest};

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The trigger worker is not running.
    #[error("controller unavailable")]
    Unavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unavailable => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        match err.http_status_code() {
            400 => Self::BadRequest(err.to_string()),
            404 => Self::NotFound(err.to_string()),
            503 => Self::Unavailable,
            _ => {
                tracing::error!(error = %err, "Controller error");
                Self::Internal(err.to_string())
            }
        }
    }
}

/// State shared by the handlers.
#[derive(Clone)]
pub struct AppState {
    /// Status and action records.
    pub board: Arc<StatusBoard>,
    /// Configuration read by the controller.
    pub config: SharedConfig,
    /// Where configuration updates are persisted.
    pub store: Arc<dyn Store>,
    /// Trigger queue.
    pub triggers: TriggerSender,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/v1/status", get(status))
        .route("/v1/config", put(update_config))
        .route("/v1/actions/register", post(register))
        .route("/v1/actions/unregister", post(unregister))
        .route("/v1/actions/:id", get(get_action))
        .route("/v1/relations/cluster-control", post(relation_changed))
        .with_state(state)
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

async fn health() -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    };

    (StatusCode::OK, Json(response))
}

async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    if state.triggers.is_closed() {
        Err(ApiError::Unavailable)
    } else {
        Ok(StatusCode::OK)
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.board.snapshot())
}

async fn update_config(
    State(state): State<AppState>,
    Json(config): Json<IntegratorConfig>,
) -> Result<StatusCode, ApiError> {
    state.store.save_config(&config).map_err(ControlError::from)?;
    tracing::info!(url = ?config.url, "Configuration updated");
    *state.config.write() = config;
    state.triggers.send(Trigger::ConfigChanged)?;
    Ok(StatusCode::ACCEPTED)
}

async fn register(
    State(state): State<AppState>,
    body: Option<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<ActionAccepted>), ApiError> {
    let name = body
        .and_then(|Json(request)| request.name)
        .map(ClusterName::new)
        .transpose()
        .map_err(ControlError::from)?;

    let action = state.board.create_action(ActionKind::Register);
    state.triggers.send(Trigger::Register { action, name })?;
    Ok((StatusCode::ACCEPTED, Json(ActionAccepted { id: action })))
}

async fn unregister(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ActionAccepted>), ApiError> {
    let action = state.board.create_action(ActionKind::Unregister);
    state.triggers.send(Trigger::Unregister { action })?;
    Ok((StatusCode::ACCEPTED, Json(ActionAccepted { id: action })))
}

async fn get_action(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<ActionRecord>, ApiError> {
    state
        .board
        .get_action(id)
        .map(Json)
        .ok_or_else(|| ControlError::ActionNotFound(id).into())
}

async fn relation_changed(
    State(state): State<AppState>,
    Json(data): Json<BTreeMap<String, String>>,
) -> Result<StatusCode, ApiError> {
    state.triggers.send(Trigger::RelationChanged(data))?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use parking_lot::RwLock;
    use rancher_integrator_store::MemoryStore;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::report::ActionState;

    struct Harness {
        app: Router,
        state: AppState,
        store: Arc<MemoryStore>,
        rx: mpsc::UnboundedReceiver<Trigger>,
    }

    fn harness() -> Harness {
        let (triggers, rx) = TriggerSender::channel();
        let store = Arc::new(MemoryStore::new());
        let state = AppState {
            board: Arc::new(StatusBoard::new()),
            config: Arc::new(RwLock::new(IntegratorConfig::default())),
            store: store.clone(),
            triggers,
        };
        Harness {
            app: router(state.clone()),
            state,
            store,
            rx,
        }
    }

    fn json_request(method: &str, uri: &str, body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::NotFound("action 1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::from(ControlError::QueueClosed).code(), "unavailable");
        assert_eq!(
            ApiError::from(ControlError::InvalidName(
                rancher_integrator_core::NameError::Empty
            ))
            .status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(ControlError::CorruptState("no manifest".into())).code(),
            "internal_error"
        );
        assert_eq!(
            ApiError::from(ControlError::ActionNotFound(3)).code(),
            "not_found"
        );
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn ready_fails_once_worker_is_gone() {
        let h = harness();
        drop(h.rx);
        let response = h
            .app
            .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn register_queues_action() {
        let mut h = harness();
        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/v1/actions/register",
                &serde_json::json!({ "name": "mycluster" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let id = body_json(response).await["id"].as_u64().unwrap();
        assert_eq!(
            h.state.board.get_action(id).unwrap().state,
            ActionState::Pending
        );
        assert_eq!(
            h.rx.try_recv().unwrap(),
            Trigger::Register {
                action: id,
                name: Some(ClusterName::new("mycluster").unwrap()),
            }
        );
    }

    #[tokio::test]
    async fn register_without_body_uses_no_name() {
        let mut h = harness();
        let response = h
            .app
            .oneshot(
                Request::post("/v1/actions/register")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(matches!(
            h.rx.try_recv().unwrap(),
            Trigger::Register { name: None, .. }
        ));
    }

    #[tokio::test]
    async fn register_rejects_invalid_name() {
        let mut h = harness();
        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/v1/actions/register",
                &serde_json::json!({ "name": "" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "bad_request");
        assert!(h.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn config_update_replaces_config_and_queues_trigger() {
        let mut h = harness();
        let response = h
            .app
            .oneshot(json_request(
                "PUT",
                "/v1/config",
                &serde_json::json!({
                    "url": "https://rancher.example",
                    "bearer-token": "admin:secret",
                    "cert-verify": "False",
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let config = h.state.config.read().clone();
        assert_eq!(config.url.as_deref(), Some("https://rancher.example"));
        assert_eq!(config.cert_verify, "False");
        assert_eq!(h.store.load_config().unwrap(), Some(config));
        assert_eq!(h.rx.try_recv().unwrap(), Trigger::ConfigChanged);
    }

    #[tokio::test]
    async fn unknown_action_is_not_found() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::get("/v1/actions/99").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn status_reports_snapshot() {
        let h = harness();
        let response = h
            .app
            .oneshot(Request::get("/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["phase"], "unregistered");
        assert_eq!(body["status"]["state"], "active");
    }

    #[tokio::test]
    async fn relation_data_is_forwarded() {
        let mut h = harness();
        let response = h
            .app
            .oneshot(json_request(
                "POST",
                "/v1/relations/cluster-control",
                &serde_json::json!({ "url": "https://rancher.example" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            h.rx.try_recv().unwrap(),
            Trigger::RelationChanged(BTreeMap::from([(
                "url".to_string(),
                "https://rancher.example".to_string()
            )]))
        );
    }
}
