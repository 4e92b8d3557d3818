//! Post-hoc episode summary computed from the per-step records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::StepRecord;

/// Aggregate indicators of a complete episode.
///
/// Computed from `Vec<StepRecord>` so that the summary always agrees with the
/// exported step data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    /// Steps played after the initial observation.
    pub steps_played: usize,
    pub total_reward: f32,
    pub mean_reward: f32,
    /// Whether the episode ended on a game over.
    pub game_over: bool,
    pub ambiguous_actions: usize,
    pub illegal_actions: usize,
    /// Steps whose redispatch target had to be reverted.
    pub dispatching_illegal: usize,
    /// Redispatched energy (MWh, sum of |actual dispatch| * dt).
    pub redispatch_mwh: f32,
    /// Storage energy throughput (MWh, sum of |power| * dt).
    pub storage_throughput_mwh: f32,
    pub peak_load_mw: f32,
    /// Fewest lines in service at any step.
    pub min_lines_connected: usize,
}

impl EpisodeSummary {
    /// Computes the summary from every record of an episode.
    ///
    /// # Arguments
    ///
    /// * `records` - Step records in playing order
    /// * `dt_hours` - Step duration in hours
    pub fn from_records(records: &[StepRecord], dt_hours: f32) -> Self {
        let Some(last) = records.last() else {
            return Self {
                steps_played: 0,
                total_reward: 0.0,
                mean_reward: 0.0,
                game_over: false,
                ambiguous_actions: 0,
                illegal_actions: 0,
                dispatching_illegal: 0,
                redispatch_mwh: 0.0,
                storage_throughput_mwh: 0.0,
                peak_load_mw: 0.0,
                min_lines_connected: 0,
            };
        };

        let mut total_reward = 0.0_f32;
        let mut redispatch = 0.0_f32;
        let mut storage = 0.0_f32;
        let mut peak_load = 0.0_f32;
        let mut min_lines = usize::MAX;
        for r in records {
            total_reward += r.reward;
            redispatch += r.redispatch_mw * dt_hours;
            storage += r.storage_mw.abs() * dt_hours;
            peak_load = peak_load.max(r.load_mw);
            min_lines = min_lines.min(r.lines_connected);
        }
        let count = |flag: fn(&StepRecord) -> bool| records.iter().filter(|r| flag(r)).count();

        Self {
            steps_played: records.len(),
            total_reward,
            mean_reward: total_reward / records.len() as f32,
            game_over: last.game_over,
            ambiguous_actions: count(|r| r.is_ambiguous),
            illegal_actions: count(|r| r.is_illegal),
            dispatching_illegal: count(|r| r.is_dispatching_illegal),
            redispatch_mwh: redispatch,
            storage_throughput_mwh: storage,
            peak_load_mw: peak_load,
            min_lines_connected: min_lines,
        }
    }
}

impl fmt::Display for EpisodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Episode Summary ---")?;
        writeln!(
            f,
            "Steps played:          {}{}",
            self.steps_played,
            if self.game_over { " (game over)" } else { "" }
        )?;
        writeln!(
            f,
            "Reward:                {:.3} total, {:.3} mean",
            self.total_reward, self.mean_reward
        )?;
        writeln!(
            f,
            "Rejected actions:      {} ambiguous, {} illegal, {} dispatch reverted",
            self.ambiguous_actions, self.illegal_actions, self.dispatching_illegal
        )?;
        writeln!(f, "Redispatched energy:   {:.2} MWh", self.redispatch_mwh)?;
        writeln!(f, "Storage throughput:    {:.2} MWh", self.storage_throughput_mwh)?;
        writeln!(f, "Peak load:             {:.2} MW", self.peak_load_mw)?;
        write!(f, "Fewest lines in use:   {}", self.min_lines_connected)
    }
}
