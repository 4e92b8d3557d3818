//! API response and query types.
//!
//! Telemetry field names follow the per-step CSV columns.

use serde::{Deserialize, Serialize};

use crate::io::EpisodeMeta;
use crate::sim::{EpisodeSummary, StepRecord};

#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub meta: EpisodeMeta,
    pub summary: EpisodeSummary,
    /// Last step played, absent when the episode has no step.
    pub latest_step: Option<TelemetryRecord>,
}

/// One step, as in the per-step CSV export.
#[derive(Debug, Serialize)]
pub struct TelemetryRecord {
    pub step: usize,
    pub reward: f32,
    pub done: bool,
    pub load_mw: f32,
    pub gen_mw: f32,
    pub storage_mw: f32,
    pub redispatch_mw: f32,
    pub lines_connected: usize,
    pub is_ambiguous: bool,
    pub is_illegal: bool,
    pub is_dispatching_illegal: bool,
    pub game_over: bool,
}

impl From<&StepRecord> for TelemetryRecord {
    fn from(r: &StepRecord) -> Self {
        Self {
            step: r.step,
            reward: r.reward,
            done: r.done,
            load_mw: r.load_mw,
            gen_mw: r.gen_mw,
            storage_mw: r.storage_mw,
            redispatch_mw: r.redispatch_mw,
            lines_connected: r.lines_connected,
            is_ambiguous: r.is_ambiguous,
            is_illegal: r.is_illegal,
            is_dispatching_illegal: r.is_dispatching_illegal,
            game_over: r.game_over,
        }
    }
}

/// Optional range query parameters for the telemetry endpoint.
#[derive(Debug, Deserialize)]
pub struct TelemetryQuery {
    /// First step (inclusive).
    pub from: Option<usize>,
    /// Last step (inclusive).
    pub to: Option<usize>,
}

/// Error response body for 4xx errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_record_copies_every_column() {
        let record = StepRecord {
            step: 5,
            reward: 0.5,
            done: false,
            load_mw: 250.0,
            gen_mw: 251.5,
            storage_mw: 1.5,
            redispatch_mw: 4.0,
            lines_connected: 19,
            is_ambiguous: false,
            is_illegal: true,
            is_dispatching_illegal: false,
            game_over: false,
        };
        let json = serde_json::to_value(TelemetryRecord::from(&record)).unwrap();
        let columns: Vec<&str> = crate::io::export::HEADER.split(',').collect();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), columns.len());
        for c in columns {
            assert!(obj.contains_key(c), "missing {c}");
        }
        assert_eq!(json["lines_connected"], 19);
        assert_eq!(json["is_illegal"], true);
    }
}
