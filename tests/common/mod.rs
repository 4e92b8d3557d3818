//! Shared test fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use grid_sim::config::ScenarioConfig;
use grid_sim::sim::{Agent, EnvBuilder, Environment, StepOutcome};

/// Built-in grid with two short generated scenarios and seed 7.
pub fn test_builder(grid: &str) -> EnvBuilder {
    EnvBuilder::preset(grid, true).unwrap().seed(7)
}

/// Scenario file shipped under `scenarios/`.
pub fn scenario(name: &str) -> ScenarioConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name);
    ScenarioConfig::from_toml_file(&path).unwrap()
}

/// Fresh per-test directory under the system temp dir.
pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("grid_sim_it_{name}_{}", std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    dir
}

/// Plays `agent` until the episode ends.
pub fn play(env: &mut Environment, agent: &mut dyn Agent) -> Vec<StepOutcome> {
    let space = env.action_space().clone();
    let mut obs = env.current_observation().clone();
    agent.reset(&obs);
    let (mut reward, mut done) = (0.0, env.is_done());
    let mut outcomes = Vec::new();
    while !done {
        let action = agent.act(&obs, reward, done, &space);
        let outcome = env.step(&action).unwrap();
        reward = outcome.reward;
        done = outcome.done;
        obs = outcome.observation.clone();
        outcomes.push(outcome);
    }
    outcomes
}
