//! Local HTTP control API.
//!
//! Lets a menu-bar app or editor plugin read the current state and declare
//! the intent for the session:
//!
//! - `GET /health`
//! - `GET /state` returns the latest fused state and the intent state
//! - `PUT /intent` declares an intent, `DELETE /intent` clears it
//!
//! The server only binds to the loopback interface.

use crate::core::fusion::FusionState;
use crate::core::intent::IntentState;
use crate::monitor::Monitor;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response of `GET /state`
#[derive(Debug, Serialize)]
pub struct StateResponse {
    /// `null` until the first monitoring tick
    pub fusion: Option<FusionState>,
    pub intent: IntentState,
    pub paused: bool,
}

/// Body of `PUT /intent`
#[derive(Debug, Deserialize)]
pub struct IntentRequest {
    pub intent: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /state
async fn state(State(monitor): State<Arc<Monitor>>) -> Json<StateResponse> {
    Json(StateResponse {
        fusion: monitor.latest_state(),
        intent: monitor.intent_state(Utc::now()),
        paused: monitor.is_paused(),
    })
}

/// PUT /intent
async fn set_intent(
    State(monitor): State<Arc<Monitor>>,
    Json(request): Json<IntentRequest>,
) -> Result<Json<IntentState>, (StatusCode, Json<ErrorResponse>)> {
    if request.intent.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Intent must not be empty".to_string(),
                code: "EMPTY_INTENT".to_string(),
            }),
        ));
    }

    monitor.set_intent(&request.intent);
    tracing::info!(intent = %request.intent.trim(), "Intent declared over API");
    Ok(Json(monitor.intent_state(Utc::now())))
}

/// DELETE /intent
async fn clear_intent(State(monitor): State<Arc<Monitor>>) -> StatusCode {
    monitor.clear_intent();
    tracing::info!("Intent cleared over API");
    StatusCode::NO_CONTENT
}

/// Build the router over a shared monitor.
pub fn router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(state))
        .route("/intent", put(set_intent).delete(clear_intent))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(monitor)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    monitor: Arc<Monitor>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = router(monitor);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Control API listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
