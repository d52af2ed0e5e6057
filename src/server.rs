//! HTTP control API.
//!
//! Exposes sync status, manual resyncs and the content cleaner as a small
//! JSON API, and runs the configured background schedule for as long as the
//! server is up.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/sync/status` | Current [`SyncStatus`] snapshot |
//! | `POST` | `/sync` | Run a full cycle now |
//! | `POST` | `/sync/posts/{id}` | Resync one post by remote id |
//! | `POST` | `/clean` | Clean an HTML fragment |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "sync_in_progress", "message": "a sync is already in progress" } }
//! ```
//!
//! Error codes: `bad_request` (400), `sync_in_progress` (409),
//! `upstream` (502), `internal` (500).
//!
//! A cycle that ran to a `failed` state answers 502 when the remote was at
//! fault and 500 otherwise; `partial` and `succeeded` cycles answer 200 with
//! the [`SyncResult`].

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use wpsync_core::clean::clean_content;
use wpsync_core::models::{SyncResult, SyncState, SyncStatus};

use crate::config::Config;
use crate::error::SyncError;
use crate::service::SyncService;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    service: Arc<SyncService>,
}

/// Starts the HTTP server and, when `[schedule].interval_ms` is set, the
/// background sync schedule.
///
/// Binds to `[server].bind` and runs until Ctrl-C, then stops the schedule
/// and waits for any in-flight cycle.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(SyncService::from_config(config).await?);

    if let Some(interval) = config.schedule.interval() {
        service.setup_wordpress_sync_schedule(interval);
    }

    let app = router(service.clone());
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("wpsync server listening on http://{}", config.server.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    service.shutdown().await;
    Ok(())
}

/// Build the router over an existing service.
pub fn router(service: Arc<SyncService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/sync/status", get(handle_status))
        .route("/sync", post(handle_sync))
        .route("/sync/posts/{id}", post(handle_sync_post))
        .route("/clean", post(handle_clean))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"sync_in_progress"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::AlreadyInProgress => AppError {
                status: StatusCode::CONFLICT,
                code: "sync_in_progress",
                message: err.to_string(),
            },
            SyncError::Fetch(_) => upstream(err.to_string()),
            SyncError::ReconciliationWrite { .. } | SyncError::Interrupted(_) => {
                internal(err.to_string())
            }
        }
    }
}

fn upstream(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Turn a finished cycle into a response. Failed cycles become errors,
/// classified by whether the remote was at fault.
fn cycle_response(result: SyncResult) -> Result<Json<SyncResult>, AppError> {
    if result.state != SyncState::Failed {
        return Ok(Json(result));
    }

    let message = result
        .error
        .unwrap_or_else(|| "sync failed".to_string());
    if message.contains("fetch error") {
        Err(upstream(message))
    } else {
        Err(internal(message))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /sync ============

async fn handle_status(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.service.sync_status())
}

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncResult>, AppError> {
    let result = state.service.sync_wordpress_posts().await?;
    cycle_response(result)
}

async fn handle_sync_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SyncResult>, AppError> {
    let result = state.service.sync_single_wordpress_post(id).await?;
    cycle_response(result)
}

// ============ POST /clean ============

#[derive(Deserialize)]
struct CleanRequest {
    html: String,
}

#[derive(Serialize)]
struct CleanResponse {
    html: String,
}

async fn handle_clean(Json(req): Json<CleanRequest>) -> Json<CleanResponse> {
    Json(CleanResponse {
        html: clean_content(&req.html),
    })
}
