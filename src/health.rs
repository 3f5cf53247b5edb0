//! Liveness endpoint
//!
//! A minimal HTTP surface served next to the worker: `GET /health/ping`
//! answers with a PONG body while the process is alive.

use crate::error::Result;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Body value returned by the ping route
pub const PONG_MESSAGE: &str = "PONG";

/// Answers liveness probes
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthManager;

impl HealthManager {
    /// The liveness response body
    pub fn ping(&self) -> Value {
        json!({ "response": PONG_MESSAGE })
    }
}

/// Build the health router
pub fn router() -> Router {
    Router::new()
        .route("/health/ping", get(ping_handler))
        .layer(TraceLayer::new_for_http())
}

async fn ping_handler() -> Json<Value> {
    Json(HealthManager.ping())
}

/// Bind the health endpoint and serve it until the process exits
pub async fn serve(port: u16) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "health endpoint listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
