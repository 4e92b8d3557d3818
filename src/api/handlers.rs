//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;
use super::types::{ErrorResponse, StateResponse, TelemetryQuery, TelemetryRecord};

fn error(status: StatusCode, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message }))
}

/// `GET /state` → 200 + `StateResponse` JSON
pub async fn get_state(State(state): State<Arc<AppState>>) -> Json<StateResponse> {
    Json(StateResponse {
        meta: state.meta.clone(),
        summary: state.summary.clone(),
        latest_step: state.records.last().map(TelemetryRecord::from),
    })
}

/// Returns step records, optionally filtered by step range.
///
/// `GET /telemetry` → 200 + `Vec<TelemetryRecord>` JSON
/// `GET /telemetry?from=N&to=M` → filtered range (inclusive)
/// `GET /telemetry?from=10&to=5` → 400 + `ErrorResponse`
pub async fn get_telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> impl IntoResponse {
    let from = query.from.unwrap_or(0);
    let to = query.to.unwrap_or(usize::MAX);

    if from > to {
        return Err(error(
            StatusCode::BAD_REQUEST,
            format!("`from` ({from}) must be <= `to` ({to})"),
        ));
    }

    let records: Vec<TelemetryRecord> = state
        .records
        .iter()
        .filter(|r| r.step >= from && r.step <= to)
        .map(TelemetryRecord::from)
        .collect();

    Ok(Json(records))
}

/// `GET /observations/{step}` → 200 + `Observation` JSON, 404 past the end
pub async fn get_observation(
    State(state): State<Arc<AppState>>,
    Path(step): Path<usize>,
) -> impl IntoResponse {
    match state.observations.get(step) {
        Some(obs) => Ok(Json(obs.clone())),
        None => Err(error(
            StatusCode::NOT_FOUND,
            format!(
                "no observation for step {step}, the episode has {}",
                state.observations.len()
            ),
        )),
    }
}
