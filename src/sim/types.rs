//! Environment parameters, observations and per-step records.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::rules::GameRules;
use crate::action::ActionProfile;
use crate::grid::GridObjects;

/// Tunable behaviour of an [`Environment`](super::Environment).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnvParameters {
    /// Episode length cap, on top of the chronics length.
    pub max_steps: Option<usize>,
    /// Categories agents may use.
    pub action_profile: ActionProfile,
    /// Duration of one step in minutes.
    pub delta_time_minutes: f32,
    pub max_line_status_changed: usize,
    pub max_sub_changed: usize,
    pub line_cooldown: u32,
    pub sub_cooldown: u32,
}

impl Default for EnvParameters {
    fn default() -> Self {
        let rules = GameRules::default();
        Self {
            max_steps: None,
            action_profile: ActionProfile::default(),
            delta_time_minutes: 5.0,
            max_line_status_changed: rules.max_line_status_changed,
            max_sub_changed: rules.max_sub_changed,
            line_cooldown: rules.line_cooldown,
            sub_cooldown: rules.sub_cooldown,
        }
    }
}

impl EnvParameters {
    pub fn rules(&self) -> GameRules {
        GameRules {
            max_line_status_changed: self.max_line_status_changed,
            max_sub_changed: self.max_sub_changed,
            line_cooldown: self.line_cooldown,
            sub_cooldown: self.sub_cooldown,
        }
    }

    /// Step duration in hours.
    pub fn dt_hours(&self) -> f32 {
        self.delta_time_minutes / 60.0
    }
}

/// What an agent sees of the grid after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub step: usize,
    /// Last step of the episode, when known.
    pub max_step: Option<usize>,
    pub gen_p: Vec<f32>,
    pub gen_v: Vec<f32>,
    pub load_p: Vec<f32>,
    pub load_q: Vec<f32>,
    pub line_status: Vec<bool>,
    pub topo_vect: Vec<i32>,
    pub target_dispatch: Vec<f32>,
    pub actual_dispatch: Vec<f32>,
    /// Stored energy (MWh).
    pub storage_charge: Vec<f32>,
    pub storage_power_target: Vec<f32>,
    pub storage_power: Vec<f32>,
    pub time_before_cooldown_line: Vec<u32>,
    pub time_before_cooldown_sub: Vec<u32>,
    pub time_next_maintenance: Vec<i32>,
    pub duration_next_maintenance: Vec<i32>,
    /// Upward room of each redispatchable unit for the next step.
    pub gen_margin_up: Vec<f32>,
    pub gen_margin_down: Vec<f32>,
}

impl Observation {
    /// All-zero observation shaped for `grid`, every element on bus 1.
    pub fn empty(grid: &GridObjects) -> Self {
        let (n_gen, n_load, n_line) = (grid.n_gen(), grid.n_load(), grid.n_line());
        let n_storage = grid.n_storage();
        Self {
            step: 0,
            max_step: None,
            gen_p: vec![0.0; n_gen],
            gen_v: vec![0.0; n_gen],
            load_p: vec![0.0; n_load],
            load_q: vec![0.0; n_load],
            line_status: vec![true; n_line],
            topo_vect: vec![1; grid.dim_topo()],
            target_dispatch: vec![0.0; n_gen],
            actual_dispatch: vec![0.0; n_gen],
            storage_charge: vec![0.0; n_storage],
            storage_power_target: vec![0.0; n_storage],
            storage_power: vec![0.0; n_storage],
            time_before_cooldown_line: vec![0; n_line],
            time_before_cooldown_sub: vec![0; grid.n_sub()],
            time_next_maintenance: vec![-1; n_line],
            duration_next_maintenance: vec![0; n_line],
            gen_margin_up: vec![0.0; n_gen],
            gen_margin_down: vec![0.0; n_gen],
        }
    }

    /// Flat vector of every field, in declaration order. Booleans map to
    /// 0/1 and an unknown `max_step` to -1.
    pub fn to_vec(&self) -> Vec<f32> {
        let mut v = vec![
            self.step as f32,
            self.max_step.map_or(-1.0, |m| m as f32),
        ];
        for part in [
            &self.gen_p,
            &self.gen_v,
            &self.load_p,
            &self.load_q,
        ] {
            v.extend_from_slice(part);
        }
        v.extend(self.line_status.iter().map(|s| if *s { 1.0 } else { 0.0 }));
        v.extend(self.topo_vect.iter().map(|b| *b as f32));
        for part in [
            &self.target_dispatch,
            &self.actual_dispatch,
            &self.storage_charge,
            &self.storage_power_target,
            &self.storage_power,
        ] {
            v.extend_from_slice(part);
        }
        v.extend(self.time_before_cooldown_line.iter().map(|c| *c as f32));
        v.extend(self.time_before_cooldown_sub.iter().map(|c| *c as f32));
        v.extend(self.time_next_maintenance.iter().map(|c| *c as f32));
        v.extend(self.duration_next_maintenance.iter().map(|c| *c as f32));
        v.extend_from_slice(&self.gen_margin_up);
        v.extend_from_slice(&self.gen_margin_down);
        v
    }

    pub fn total_load(&self) -> f32 {
        self.load_p.iter().sum()
    }

    pub fn total_generation(&self) -> f32 {
        self.gen_p.iter().sum()
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let connected = self.line_status.iter().filter(|s| **s).count();
        let redispatch: f32 = self.actual_dispatch.iter().map(|d| d.abs()).sum();
        write!(
            f,
            "t={:>4} | load={:>8.2} MW  gen={:>8.2} MW | lines {}/{} | redispatch={:.2} MW",
            self.step,
            self.total_load(),
            self.total_generation(),
            connected,
            self.line_status.len(),
            redispatch,
        )?;
        if !self.storage_charge.is_empty() {
            let charge: f32 = self.storage_charge.iter().sum();
            write!(f, " | storage={charge:.2} MWh")?;
        }
        Ok(())
    }
}

/// Flags raised while processing a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepInfo {
    pub is_ambiguous: bool,
    pub is_illegal: bool,
    pub is_dispatching_illegal: bool,
    pub game_over: bool,
    /// Messages of every error met, in order.
    pub exceptions: Vec<String>,
}

/// Result of [`Environment::step`](super::Environment::step).
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub observation: Observation,
    pub reward: f32,
    pub done: bool,
    pub info: StepInfo,
}

/// One row of the per-step summary of an episode.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub reward: f32,
    pub done: bool,
    pub load_mw: f32,
    pub gen_mw: f32,
    /// Net storage consumption (MW, positive absorbs).
    pub storage_mw: f32,
    /// Sum of absolute actual dispatch offsets (MW).
    pub redispatch_mw: f32,
    pub lines_connected: usize,
    pub is_ambiguous: bool,
    pub is_illegal: bool,
    pub is_dispatching_illegal: bool,
    pub game_over: bool,
}

impl StepRecord {
    pub fn from_outcome(outcome: &StepOutcome) -> Self {
        let obs = &outcome.observation;
        Self {
            step: obs.step,
            reward: outcome.reward,
            done: outcome.done,
            load_mw: obs.total_load(),
            gen_mw: obs.total_generation(),
            storage_mw: obs.storage_power.iter().sum(),
            redispatch_mw: obs.actual_dispatch.iter().map(|d| d.abs()).sum(),
            lines_connected: obs.line_status.iter().filter(|s| **s).count(),
            is_ambiguous: outcome.info.is_ambiguous,
            is_illegal: outcome.info.is_illegal,
            is_dispatching_illegal: outcome.info.is_dispatching_illegal,
            game_over: outcome.info.game_over,
        }
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "t={:>4} | reward={:>7.3} | load={:>8.2} MW  gen={:>8.2} MW  storage={:>6.2} MW | \
             redispatch={:>6.2} MW | lines={} | ambiguous={} illegal={} game_over={}",
            self.step,
            self.reward,
            self.load_mw,
            self.gen_mw,
            self.storage_mw,
            self.redispatch_mw,
            self.lines_connected,
            self.is_ambiguous,
            self.is_illegal,
            self.game_over,
        )
    }
}
