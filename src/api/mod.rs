//! REST API serving a played episode.
//!
//! Three GET endpoints:
//! - `/state`: episode metadata, summary and last step
//! - `/telemetry`: per-step records with optional range filtering
//! - `/observations/{step}`: full observation after a step (0 is the initial one)

mod handlers;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tracing::info;

use crate::io::{EpisodeData, EpisodeMeta};
use crate::sim::{EpisodeSummary, Observation, StepRecord};

pub use types::{ErrorResponse, StateResponse, TelemetryQuery, TelemetryRecord};

/// Read-only episode shared across all request handlers.
pub struct AppState {
    pub meta: EpisodeMeta,
    pub summary: EpisodeSummary,
    /// One record per step played.
    pub records: Vec<StepRecord>,
    /// Initial observation followed by one per step.
    pub observations: Vec<Observation>,
}

impl AppState {
    pub fn from_episode(data: &EpisodeData) -> Self {
        Self {
            meta: data.meta().clone(),
            summary: data.summary(),
            records: data.records(),
            observations: data.observations().to_vec(),
        }
    }
}

/// Builds the axum router with all API routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/state", get(handlers::get_state))
        .route("/telemetry", get(handlers::get_telemetry))
        .route("/observations/{step}", get(handlers::get_observation))
        .with_state(state)
}

/// Binds to the given address and serves the API until the process stops.
pub async fn serve(state: Arc<AppState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, app).await
}
