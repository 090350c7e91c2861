//! # HTTP Server
//!
//! The boundary adapter: pure translation between HTTP and the secret
//! accessor, no business logic.
//!
//! Provides endpoints:
//! - `GET /health` - Vault health; transport failures degrade to DOWN, never to a 5xx
//! - `GET /secret/{path}` - latest secret (or `?version=N`)
//! - `POST /secret/{path}` - write the request body as a new version
//! - `GET /secret/{path}/key/{key}` - single field of a secret
//! - `GET /config` - redacted configuration snapshot
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /healthz` - process liveness probe (always 200)
//!
//! Nested secret paths are addressed by percent-encoding the separator
//! (`/secret/app%2Fconfig`); axum decodes the parameter back into the
//! hierarchical path before it reaches the accessor.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::config::ConfigSnapshot;
use crate::error::VaultError;
use crate::kv::{SecretData, SecretStore};
use crate::metrics::REGISTRY;

/// Shared handler state: the accessor behind its trait and the redacted
/// config view. The transport's token is private to the accessor side;
/// nothing here crosses requests.
pub struct AppState {
    pub store: Arc<dyn SecretStore>,
    pub config: ConfigSnapshot,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(healthz_handler))
        .route("/metrics", get(metrics_handler))
        .route("/config", get(config_handler))
        .route("/secret/{path}", get(read_secret_handler).post(write_secret_handler))
        .route("/secret/{path}/key/{key}", get(read_field_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
///
/// # Errors
///
/// Fails when the port cannot be bound or the server loop errors.
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), anyhow::Error> {
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Accessor failure translated to a response. The only place errors become
/// HTTP; messages stay free of credential material and secret values.
struct ApiError(VaultError);

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            VaultError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            VaultError::FieldNotFound { .. } => (StatusCode::NOT_FOUND, "field_not_found"),
            VaultError::Auth(_) => (StatusCode::BAD_GATEWAY, "auth_failed"),
            VaultError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            VaultError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "transport_error"),
        };

        if !self.0.is_not_found() {
            error!("request failed: {}", self.0);
        }

        (
            status,
            Json(ErrorBody {
                error: code,
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    status: &'static str,
}

#[derive(Serialize)]
struct SecretResponse {
    path: String,
    data: SecretData,
}

#[derive(Serialize)]
struct WriteResponse {
    message: &'static str,
    path: String,
    version: u64,
}

#[derive(Serialize)]
struct FieldResponse {
    path: String,
    key: String,
    value: serde_json::Value,
}

#[derive(Deserialize)]
struct ReadQuery {
    version: Option<u64>,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let healthy = match state.store.health().await {
        Ok(status) => status.healthy(),
        Err(err) => {
            debug!("health check failed: {err}");
            false
        }
    };

    Json(HealthResponse {
        healthy,
        status: if healthy { "UP" } else { "DOWN" },
    })
}

async fn healthz_handler() -> StatusCode {
    StatusCode::OK
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn config_handler(State(state): State<Arc<AppState>>) -> Json<ConfigSnapshot> {
    Json(state.config.clone())
}

async fn read_secret_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Result<Json<SecretResponse>, ApiError> {
    let secret = match query.version {
        Some(version) => state.store.read_version(&path, version).await?,
        None => state.store.read(&path).await?,
    };

    match secret {
        Some(data) => Ok(Json(SecretResponse { path, data })),
        None => Err(ApiError(VaultError::NotFound { path })),
    }
}

async fn write_secret_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    Json(data): Json<SecretData>,
) -> Result<Json<WriteResponse>, ApiError> {
    let written = state.store.write(&path, data).await?;

    Ok(Json(WriteResponse {
        message: "secret written",
        path,
        version: written.version,
    }))
}

async fn read_field_handler(
    State(state): State<Arc<AppState>>,
    Path((path, key)): Path<(String, String)>,
) -> Result<Json<FieldResponse>, ApiError> {
    let value = state.store.read_field(&path, &key).await?;

    Ok(Json(FieldResponse { path, key, value }))
}
