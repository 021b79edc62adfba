//! HTTP server: health, tier listing, categories, and line processing

use aios_agents::Coordinator;
use aios_core::config::GatewayConfig;
use aios_core::{LineRequest, SignalType};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator, started_at: Instant::now() }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub line: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line_number: Option<usize>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/tools", get(tools_handler))
        .route("/categories", get(categories_handler))
        .route("/process", post(process_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn serve(config: &GatewayConfig, coordinator: Arc<Coordinator>) -> anyhow::Result<()> {
    let bind_addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {}:{}: {}", config.host, config.port, e))?;

    let app = router(Arc::new(AppState::new(coordinator)));

    info!("AIOS gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let tiers = state.coordinator.tiers();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "tiers_configured": tiers.iter().filter(|t| t.configured).count(),
        "max_length": state.coordinator.settings().max_length,
    }))
}

async fn tools_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "tiers": state.coordinator.tiers() }))
}

async fn categories_handler() -> impl IntoResponse {
    let categories: Vec<serde_json::Value> = SignalType::ALL
        .iter()
        .map(|t| {
            serde_json::json!({
                "signal_type": t,
                "description": t.description(),
                "route": t.default_route(),
            })
        })
        .collect();
    Json(serde_json::json!({ "categories": categories }))
}

async fn process_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProcessRequest>,
) -> impl IntoResponse {
    if body.line.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "line must not be empty" })),
        )
            .into_response();
    }

    let mut request = LineRequest::new(body.line);
    request.file = body.file;
    request.line_number = body.line_number;

    let result = state.coordinator.coordinate(request).await;
    Json(result).into_response()
}
