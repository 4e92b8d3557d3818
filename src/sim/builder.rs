//! Recipes for building environments from a named grid.

use std::sync::Arc;

use super::env::{EnvError, Environment};
use super::reward::RewardKind;
use super::types::EnvParameters;
use crate::chronics::{ChronicsSource, GenerationParams};
use crate::grid::{GridObjects, presets};

/// Steps per generated scenario with the test flag (four hours).
const TEST_STEPS: usize = 48;
/// Steps per generated scenario otherwise (one week).
const FULL_STEPS: usize = 7 * 288;

/// Everything needed to build an [`Environment`]. Cheap to clone, so that
/// workers can each build their own.
#[derive(Debug, Clone)]
pub struct EnvBuilder {
    grid: Arc<GridObjects>,
    chronics: ChronicsSource,
    params: EnvParameters,
    reward: RewardKind,
    seed: u64,
}

impl EnvBuilder {
    pub fn new(grid: Arc<GridObjects>) -> Self {
        Self {
            grid,
            chronics: ChronicsSource::default(),
            params: EnvParameters::default(),
            reward: RewardKind::default(),
            seed: 0,
        }
    }

    /// Built-in grid with generated chronics. `test` selects two short
    /// scenarios without outages; otherwise eight week-long scenarios with
    /// maintenance and hazards.
    pub fn preset(name: &str, test: bool) -> Result<Self, EnvError> {
        let grid = Arc::new(presets::by_name(name)?);
        let generation = if test {
            GenerationParams {
                n_steps: TEST_STEPS,
                n_scenarios: 2,
                ..GenerationParams::default()
            }
        } else {
            GenerationParams {
                n_steps: FULL_STEPS,
                n_scenarios: 8,
                maintenance_rate: 0.02,
                hazard_rate: 0.000_05,
                ..GenerationParams::default()
            }
        };
        Ok(Self::new(grid).chronics(ChronicsSource::Generated(generation)))
    }

    pub fn chronics(mut self, source: ChronicsSource) -> Self {
        self.chronics = source;
        self
    }

    pub fn params(mut self, params: EnvParameters) -> Self {
        self.params = params;
        self
    }

    pub fn reward(mut self, reward: RewardKind) -> Self {
        self.reward = reward;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn grid(&self) -> &Arc<GridObjects> {
        &self.grid
    }

    pub fn env_params(&self) -> &EnvParameters {
        &self.params
    }

    pub fn chronics_source(&self) -> &ChronicsSource {
        &self.chronics
    }

    pub fn build(&self) -> Result<Environment, EnvError> {
        self.build_seeded(0)
    }

    /// Builds with the seed moved by `offset`, for the copies of a batch.
    pub fn build_seeded(&self, offset: u64) -> Result<Environment, EnvError> {
        Environment::new(
            Arc::clone(&self.grid),
            self.chronics.build(),
            self.params.clone(),
            self.reward.build(),
            self.seed.wrapping_add(offset),
        )
    }
}

/// Builds an environment on a built-in grid, see [`EnvBuilder::preset`].
pub fn make(name: &str, test: bool) -> Result<Environment, EnvError> {
    EnvBuilder::preset(name, test)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn make_test_environment() {
        let env = make("case14", true).unwrap();
        assert_eq!(env.max_step(), Some(TEST_STEPS - 1));
        assert_eq!(env.n_chronics(), 2);
        assert_eq!(env.chronics_id(), "0000");
    }

    #[test]
    fn unknown_grid_is_an_error() {
        assert!(matches!(make("case9000", true), Err(EnvError::Grid(_))));
    }

    #[test]
    fn builds_independent_environments() {
        let builder = EnvBuilder::preset("case5", true)
            .unwrap()
            .chronics(ChronicsSource::ChangeNothing { max_iter: Some(3) })
            .reward(RewardKind::Redisp)
            .seed(7);
        let mut a = builder.build().unwrap();
        let b = builder.build().unwrap();
        let noop = a.action_space().do_nothing();
        a.step(&noop).unwrap();
        assert_eq!(a.current_step(), 1);
        assert_eq!(b.current_step(), 0);
        assert_eq!(b.seed(), 7);
    }
}
