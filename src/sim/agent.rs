//! Agents choosing an action from the last observation.

use std::collections::BTreeMap;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::types::Observation;
use crate::action::{ActionSpace, ActionUpdate, BaseAction};

/// Decision maker playing an environment.
///
/// The runner gives each episode its own agent, built by an agent factory,
/// so implementations only need to be [`Send`].
pub trait Agent: Send {
    /// Action to play after seeing `observation` and the `reward` of the
    /// step that produced it.
    fn act(
        &mut self,
        observation: &Observation,
        reward: f32,
        done: bool,
        space: &ActionSpace,
    ) -> BaseAction;

    /// Called with the initial observation of every episode.
    fn reset(&mut self, _observation: &Observation) {}

    fn name(&self) -> &str;
}

/// Never acts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoNothingAgent;

impl Agent for DoNothingAgent {
    fn act(&mut self, _: &Observation, _: f32, _: bool, space: &ActionSpace) -> BaseAction {
        space.do_nothing()
    }

    fn name(&self) -> &str {
        "do_nothing"
    }
}

/// Redispatches one random unit by a random amount that fits the margins
/// of the last observation.
#[derive(Debug, Clone)]
pub struct RandomRedispatchAgent {
    rng: StdRng,
    /// Chance of acting at each step.
    probability: f64,
    /// Largest request, in MW.
    max_mw: f32,
}

impl RandomRedispatchAgent {
    pub fn new(probability: f64, max_mw: f32, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            probability: probability.clamp(0.0, 1.0),
            max_mw: max_mw.abs(),
        }
    }
}

impl Agent for RandomRedispatchAgent {
    fn act(&mut self, obs: &Observation, _: f32, _: bool, space: &ActionSpace) -> BaseAction {
        if !self.rng.random_bool(self.probability) {
            return space.do_nothing();
        }
        let candidates: Vec<usize> = space
            .grid()
            .generators()
            .iter()
            .enumerate()
            .filter(|(_, g)| g.redispatchable)
            .map(|(i, _)| i)
            .collect();
        if candidates.is_empty() {
            return space.do_nothing();
        }
        let g = candidates[self.rng.random_range(0..candidates.len())];
        let up = obs.gen_margin_up.get(g).copied().unwrap_or(0.0).min(self.max_mw);
        let down = obs.gen_margin_down.get(g).copied().unwrap_or(0.0).min(self.max_mw);
        if up + down <= 0.0 {
            return space.do_nothing();
        }
        let amount = self.rng.random_range(-down..=up);
        space
            .build(&ActionUpdate::redispatch([(g, amount)]))
            .unwrap_or_else(|_| space.do_nothing())
    }

    fn name(&self) -> &str {
        "random_redispatch"
    }
}

/// Plays a fixed action at given steps and nothing otherwise.
///
/// The action keyed by `t` is played on the observation of step `t`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAgent {
    script: BTreeMap<usize, ActionUpdate>,
}

impl ScriptedAgent {
    pub fn new(script: impl IntoIterator<Item = (usize, ActionUpdate)>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }
}

impl Agent for ScriptedAgent {
    fn act(&mut self, obs: &Observation, _: f32, _: bool, space: &ActionSpace) -> BaseAction {
        let Some(update) = self.script.get(&obs.step) else {
            return space.do_nothing();
        };
        let mut action = space.do_nothing();
        match action.update(update) {
            Ok(()) => action,
            Err(e) => {
                warn!(step = obs.step, error = %e, "scripted action skipped");
                space.do_nothing()
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// One entry of a scripted agent in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptStep {
    pub step: usize,
    pub action: ActionUpdate,
}

/// Agent selected by configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum AgentKind {
    #[default]
    DoNothing,
    RandomRedispatch {
        #[serde(default = "default_probability")]
        probability: f64,
        #[serde(default = "default_max_mw")]
        max_mw: f32,
    },
    Scripted {
        #[serde(default)]
        steps: Vec<ScriptStep>,
    },
}

fn default_probability() -> f64 {
    0.2
}

fn default_max_mw() -> f32 {
    5.0
}

impl AgentKind {
    pub const ALL: &'static [&'static str] = &["do_nothing", "random_redispatch", "scripted"];

    /// Builds a fresh agent; `seed` drives random agents.
    pub fn build(&self, seed: u64) -> Box<dyn Agent> {
        match self {
            AgentKind::DoNothing => Box::new(DoNothingAgent),
            AgentKind::RandomRedispatch {
                probability,
                max_mw,
            } => Box::new(RandomRedispatchAgent::new(*probability, *max_mw, seed)),
            AgentKind::Scripted { steps } => Box::new(ScriptedAgent::new(
                steps.iter().map(|s| (s.step, s.action.clone())),
            )),
        }
    }

    /// Parses a command-line agent name, using defaults for parameters.
    pub fn from_name(name: &str) -> Result<Self, String> {
        match name {
            "do_nothing" => Ok(AgentKind::DoNothing),
            "random_redispatch" => Ok(AgentKind::RandomRedispatch {
                probability: default_probability(),
                max_mw: default_max_mw(),
            }),
            "scripted" => Ok(AgentKind::Scripted { steps: Vec::new() }),
            other => Err(format!(
                "unknown agent \"{other}\", expected one of: {}",
                Self::ALL.join(", ")
            )),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentKind::DoNothing => "do_nothing",
            AgentKind::RandomRedispatch { .. } => "random_redispatch",
            AgentKind::Scripted { .. } => "scripted",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::ActionProfile;
    use crate::grid::presets;

    fn space() -> ActionSpace {
        ActionSpace::new(
            Arc::new(presets::case14().unwrap()),
            ActionProfile::TopologyAndDispatch,
        )
    }

    #[test]
    fn do_nothing_agent_is_idle() {
        let space = space();
        let obs = Observation::empty(space.grid());
        let mut agent = DoNothingAgent;
        assert!(agent.act(&obs, 0.0, false, &space).is_do_nothing());
    }

    #[test]
    fn random_agent_stays_within_margins() {
        let space = space();
        let mut obs = Observation::empty(space.grid());
        obs.gen_margin_up = vec![3.0; obs.gen_margin_up.len()];
        obs.gen_margin_down = vec![1.0; obs.gen_margin_down.len()];
        let mut agent = RandomRedispatchAgent::new(1.0, 10.0, 5);
        for _ in 0..50 {
            let act = agent.act(&obs, 0.0, false, &space);
            assert!(act.check_ambiguity().is_ok());
            for (g, r) in act.redispatch().iter().enumerate() {
                assert!(*r <= 3.0 && *r >= -1.0, "gen {g}: {r}");
                if *r != 0.0 {
                    assert!(space.grid().generators()[g].redispatchable);
                }
            }
        }
    }

    #[test]
    fn random_agent_is_reproducible() {
        let space = space();
        let mut obs = Observation::empty(space.grid());
        obs.gen_margin_up = vec![5.0; obs.gen_margin_up.len()];
        obs.gen_margin_down = vec![5.0; obs.gen_margin_down.len()];
        let mut a = RandomRedispatchAgent::new(0.5, 5.0, 9);
        let mut b = RandomRedispatchAgent::new(0.5, 5.0, 9);
        for _ in 0..20 {
            let x = a.act(&obs, 0.0, false, &space);
            let y = b.act(&obs, 0.0, false, &space);
            assert_eq!(x.redispatch(), y.redispatch());
        }
    }

    #[test]
    fn scripted_agent_follows_its_script() {
        let space = space();
        let mut obs = Observation::empty(space.grid());
        let mut agent = ScriptedAgent::new([(2, ActionUpdate::redispatch([(0, 4.0)]))]);
        assert!(agent.act(&obs, 0.0, false, &space).is_do_nothing());
        obs.step = 2;
        let act = agent.act(&obs, 0.0, false, &space);
        assert_eq!(act.redispatch()[0], 4.0);
    }

    #[test]
    fn agent_kind_from_toml() {
        let kind: AgentKind = toml::from_str(
            r#"
            kind = "scripted"
            [[steps]]
            step = 3
            action = { set_line_status = [[2, -1]] }
            "#,
        )
        .unwrap();
        let AgentKind::Scripted { steps } = &kind else {
            panic!("expected a scripted agent");
        };
        assert_eq!(steps[0].step, 3);
        assert_eq!(kind.build(0).name(), "scripted");
        assert!(AgentKind::from_name("greedy").is_err());
        assert_eq!(
            AgentKind::from_name("random_redispatch").unwrap().to_string(),
            "random_redispatch"
        );
    }
}
