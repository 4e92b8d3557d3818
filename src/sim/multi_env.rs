//! Several copies of an environment stepped in parallel.

use rayon::prelude::*;
use thiserror::Error;

use super::builder::EnvBuilder;
use super::env::{EnvError, Environment};
use super::types::{Observation, StepOutcome};
use crate::action::BaseAction;

#[derive(Debug, Error)]
pub enum MultiEnvError {
    #[error("expected one action per environment ({expected}), got {got}")]
    WrongBatch { expected: usize, got: usize },
    #[error("environment {index}: {source}")]
    Env { index: usize, source: EnvError },
}

/// A batch of independent environments built from one recipe.
///
/// Environment `i` is seeded with the recipe seed plus `i` and starts on chronics
/// `i % n_chronics`, so the copies do not replay the same episode.
pub struct MultiEnvironment {
    envs: Vec<Environment>,
}

fn tag<T>(index: usize, r: Result<T, EnvError>) -> Result<T, MultiEnvError> {
    r.map_err(|source| MultiEnvError::Env { index, source })
}

impl MultiEnvironment {
    pub fn new(builder: &EnvBuilder, n_envs: usize) -> Result<Self, MultiEnvError> {
        let envs = (0..n_envs)
            .into_par_iter()
            .map(|i| {
                let mut env = tag(i, builder.build_seeded(i as u64))?;
                let n = env.n_chronics().max(1);
                if i % n != 0 {
                    tag(i, env.set_chronics(i % n))?;
                    tag(i, env.reset())?;
                }
                Ok(env)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { envs })
    }

    pub fn n_envs(&self) -> usize {
        self.envs.len()
    }

    pub fn envs(&self) -> &[Environment] {
        &self.envs
    }

    /// Observations of every environment, in order.
    pub fn observations(&self) -> Vec<Observation> {
        self.envs
            .iter()
            .map(|e| e.current_observation().clone())
            .collect()
    }

    /// Resets every environment on its next chronics.
    pub fn reset_all(&mut self) -> Result<Vec<Observation>, MultiEnvError> {
        self.envs
            .par_iter_mut()
            .enumerate()
            .map(|(i, env)| tag(i, env.reset()))
            .collect()
    }

    /// Plays `actions[i]` on environment `i`.
    ///
    /// An environment whose episode ends is reset right away: its outcome
    /// still carries the final observation and `done`, and its next action
    /// applies to the new episode.
    pub fn step(&mut self, actions: &[BaseAction]) -> Result<Vec<StepOutcome>, MultiEnvError> {
        if actions.len() != self.envs.len() {
            return Err(MultiEnvError::WrongBatch {
                expected: self.envs.len(),
                got: actions.len(),
            });
        }
        self.envs
            .par_iter_mut()
            .zip(actions.par_iter())
            .enumerate()
            .map(|(i, (env, action))| {
                let outcome = tag(i, env.step(action))?;
                if outcome.done {
                    tag(i, env.reset())?;
                }
                Ok(outcome)
            })
            .collect()
    }
}
