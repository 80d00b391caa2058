//! HTTP trigger surface.
//!
//! `POST /api/v1/scrape/:product_id` runs the pipeline for one product.
//! `GET /api/v1/health` reports liveness.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use map_monitor_core::{run_scrape, Environment, ScrapePipeline};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ScrapePipeline>,
    pub environment: Environment,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    healthy: bool,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn scrape(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> impl IntoResponse {
    let resp = run_scrape(&state.pipeline, &product_id, state.environment).await;
    let status =
        StatusCode::from_u16(resp.status.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(resp.body))
}

/// Build the API router.
pub fn create_router(state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/health", get(health))
        .route("/scrape/:product_id", post(scrape))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("HTTP trigger listening on http://{}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}
