//! Rewards returned after each step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::Observation;
use crate::grid::GridObjects;

/// What a reward sees of a step.
#[derive(Debug, Clone, Copy)]
pub struct RewardContext<'a> {
    pub grid: &'a GridObjects,
    pub observation: &'a Observation,
    pub is_illegal: bool,
    pub is_ambiguous: bool,
    pub game_over: bool,
}

pub trait Reward: Send {
    fn compute(&self, ctx: &RewardContext<'_>) -> f32;

    /// Smallest and largest value [`Reward::compute`] returns.
    fn range(&self) -> (f32, f32);
}

/// 1 for every step survived.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatReward;

impl Reward for FlatReward {
    fn compute(&self, ctx: &RewardContext<'_>) -> f32 {
        if ctx.game_over { 0.0 } else { 1.0 }
    }

    fn range(&self) -> (f32, f32) {
        (0.0, 1.0)
    }
}

/// Highest production cost the grid could reach, per step.
fn worst_cost(grid: &GridObjects) -> f32 {
    grid.generators()
        .iter()
        .map(|g| g.pmax * g.cost_per_mw)
        .sum()
}

/// Production cost mapped to [0, 1], 1 being free.
#[derive(Debug, Clone, Copy, Default)]
pub struct EconomicReward;

impl Reward for EconomicReward {
    fn compute(&self, ctx: &RewardContext<'_>) -> f32 {
        if ctx.game_over {
            return 0.0;
        }
        let worst = worst_cost(ctx.grid);
        if worst <= 0.0 {
            return 1.0;
        }
        let cost: f32 = ctx
            .observation
            .gen_p
            .iter()
            .zip(ctx.grid.generators())
            .map(|(p, g)| p.max(0.0) * g.cost_per_mw)
            .sum();
        (1.0 - cost / worst).clamp(0.0, 1.0)
    }

    fn range(&self) -> (f32, f32) {
        (0.0, 1.0)
    }
}

/// Penalises redispatched energy by its marginal cost. Illegal and
/// ambiguous actions get the minimum.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedispReward;

impl Reward for RedispReward {
    fn compute(&self, ctx: &RewardContext<'_>) -> f32 {
        if ctx.game_over || ctx.is_illegal || ctx.is_ambiguous {
            return 0.0;
        }
        let worst = worst_cost(ctx.grid);
        if worst <= 0.0 {
            return 1.0;
        }
        let penalty: f32 = ctx
            .observation
            .actual_dispatch
            .iter()
            .zip(ctx.grid.generators())
            .map(|(d, g)| d.abs() * g.cost_per_mw)
            .sum();
        (1.0 - penalty / worst).clamp(0.0, 1.0)
    }

    fn range(&self) -> (f32, f32) {
        (0.0, 1.0)
    }
}

/// Reward selected by name in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    #[default]
    Flat,
    Economic,
    Redisp,
}

impl RewardKind {
    pub const ALL: &'static [&'static str] = &["flat", "economic", "redisp"];

    pub fn build(self) -> Box<dyn Reward> {
        match self {
            RewardKind::Flat => Box::new(FlatReward),
            RewardKind::Economic => Box::new(EconomicReward),
            RewardKind::Redisp => Box::new(RedispReward),
        }
    }
}

impl fmt::Display for RewardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RewardKind::Flat => "flat",
            RewardKind::Economic => "economic",
            RewardKind::Redisp => "redisp",
        };
        f.write_str(name)
    }
}

impl FromStr for RewardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(RewardKind::Flat),
            "economic" => Ok(RewardKind::Economic),
            "redisp" => Ok(RewardKind::Redisp),
            other => Err(format!(
                "unknown reward \"{other}\", expected one of: {}",
                Self::ALL.join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::presets;

    fn ctx<'a>(grid: &'a GridObjects, obs: &'a Observation) -> RewardContext<'a> {
        RewardContext {
            grid,
            observation: obs,
            is_illegal: false,
            is_ambiguous: false,
            game_over: false,
        }
    }

    #[test]
    fn flat_reward_counts_survival() {
        let grid = presets::case5().unwrap();
        let obs = Observation::empty(&grid);
        assert_eq!(FlatReward.compute(&ctx(&grid, &obs)), 1.0);
        let over = RewardContext {
            game_over: true,
            ..ctx(&grid, &obs)
        };
        assert_eq!(FlatReward.compute(&over), 0.0);
    }

    #[test]
    fn economic_reward_decreases_with_cost() {
        let grid = presets::case5().unwrap();
        let mut obs = Observation::empty(&grid);
        obs.gen_p = vec![0.0, 0.0];
        assert_eq!(EconomicReward.compute(&ctx(&grid, &obs)), 1.0);
        obs.gen_p = vec![30.0, 20.0];
        let cheap = EconomicReward.compute(&ctx(&grid, &obs));
        obs.gen_p = vec![50.0, 0.0];
        let dear = EconomicReward.compute(&ctx(&grid, &obs));
        assert!(dear < cheap && cheap < 1.0);
        let (lo, hi) = EconomicReward.range();
        assert!(dear >= lo && cheap <= hi);
    }

    #[test]
    fn redisp_reward_penalises_dispatch() {
        let grid = presets::case5().unwrap();
        let mut obs = Observation::empty(&grid);
        assert_eq!(RedispReward.compute(&ctx(&grid, &obs)), 1.0);
        obs.actual_dispatch = vec![5.0, -5.0];
        let r = RedispReward.compute(&ctx(&grid, &obs));
        // 5 * 30 + 5 * 20 over 60 * 30 + 50 * 20
        assert!((r - (1.0 - 250.0 / 2800.0)).abs() < 1e-5);
        let illegal = RewardContext {
            is_illegal: true,
            ..ctx(&grid, &obs)
        };
        assert_eq!(RedispReward.compute(&illegal), 0.0);
    }

    #[test]
    fn reward_kind_parses() {
        assert_eq!("redisp".parse::<RewardKind>(), Ok(RewardKind::Redisp));
        assert!("nope".parse::<RewardKind>().is_err());
        assert_eq!(RewardKind::Economic.to_string(), "economic");
    }
}
