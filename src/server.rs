//! Monitoring endpoint
//!
//! Small axum server exposing:
//! - GET / and /health: liveness probe for the hosting platform
//! - GET /status: JSON snapshot of the bot's state
//!
//! The dispatch loop publishes a fresh snapshot after every event; the
//! server only ever reads.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

/// Point-in-time view of the bot for `/status`
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub bot_online: bool,
    pub stat_channel: Option<i64>,
    pub display_channel: Option<i64>,
    pub predictions_active: usize,
    pub total_predictions: usize,
    pub cooldown_interval: u32,
    pub prediction_interval: u32,
    pub scheduler_running: bool,
}

pub type SharedStatus = Arc<RwLock<StatusSnapshot>>;

async fn health() -> &'static str {
    "Bot is running!"
}

async fn status(State(snapshot): State<SharedStatus>) -> Json<StatusSnapshot> {
    Json(snapshot.read().await.clone())
}

/// Serve the monitoring endpoint until the process exits
pub async fn serve(snapshot: SharedStatus, port: u16) -> Result<()> {
    let app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(snapshot);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind monitoring server on {}", addr))?;
    info!(%addr, "monitoring server listening");

    axum::serve(listener, app)
        .await
        .context("Monitoring server exited")
}
