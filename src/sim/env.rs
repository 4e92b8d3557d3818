//! The environment: steps a grid through its chronics under agent actions.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::backend::{Backend, BackendError, CopperPlate};
use super::redispatch::{RedispatchError, Redispatcher};
use super::reward::{Reward, RewardContext};
use super::rules::{GameRules, RulesContext};
use super::storage::StorageState;
use super::types::{EnvParameters, Observation, StepInfo, StepOutcome};
use crate::action::{
    ActionError, ActionProfile, ActionSpace, ActionUpdate, BaseAction, ElementKey, InjectionUpdate,
    Toggle, TopologicalImpact, Values,
};
use crate::chronics::{ChronicsError, GridValue, StepInjection};
use crate::grid::{GridError, GridObjects};

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("the episode is over, reset the environment first")]
    EpisodeOver,
    #[error("the chronics ran out of data at step {0}")]
    ChronicsExhausted(usize),
    #[error("invalid initial state: {0}")]
    InitialState(BackendError),
    #[error(transparent)]
    Chronics(#[from] ChronicsError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Redispatch(#[from] RedispatchError),
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// A power grid stepped through time.
///
/// Every step the environment checks the agent action, reads the next
/// injections, turns them and the outage schedule into its own action,
/// redispatches, then lets the backend compute the new state. Ambiguous or
/// illegal agent actions are replaced by "do nothing" and flagged in
/// [`StepInfo`].
pub struct Environment {
    grid: Arc<GridObjects>,
    chronics: Box<dyn GridValue>,
    backend: Box<dyn Backend>,
    params: EnvParameters,
    rules: GameRules,
    reward: Box<dyn Reward>,
    action_space: ActionSpace,
    env_space: ActionSpace,
    redispatcher: Redispatcher,
    storage: StorageState,
    cooldown_line: Vec<u32>,
    cooldown_sub: Vec<u32>,
    /// Lines currently out for maintenance or a hazard.
    forced_out: Vec<bool>,
    time_next_maintenance: Vec<i32>,
    duration_next_maintenance: Vec<i32>,
    /// Scheduled production plus actual dispatch of the last step.
    previous_prod: Option<Vec<f32>>,
    env_modification: BaseAction,
    observation: Observation,
    step: usize,
    done: bool,
    pending_chronics: Option<usize>,
    seed: u64,
    rng: StdRng,
}

impl Environment {
    /// Binds `chronics` to `grid` and starts the first episode on chronics 0.
    pub fn new(
        grid: Arc<GridObjects>,
        mut chronics: Box<dyn GridValue>,
        params: EnvParameters,
        reward: Box<dyn Reward>,
        seed: u64,
    ) -> Result<Self, EnvError> {
        chronics.initialize(&grid)?;
        chronics.set_chronics(0)?;
        let n_line = grid.n_line();
        let mut env = Self {
            backend: Box::new(CopperPlate::new(Arc::clone(&grid))),
            rules: params.rules(),
            action_space: ActionSpace::new(Arc::clone(&grid), params.action_profile),
            env_space: ActionSpace::new(Arc::clone(&grid), ActionProfile::Full),
            redispatcher: Redispatcher::new(grid.n_gen()),
            storage: StorageState::new(grid.storage()),
            cooldown_line: vec![0; n_line],
            cooldown_sub: vec![0; grid.n_sub()],
            forced_out: vec![false; n_line],
            time_next_maintenance: vec![-1; n_line],
            duration_next_maintenance: vec![0; n_line],
            previous_prod: None,
            env_modification: BaseAction::new(Arc::clone(&grid)),
            observation: Observation::empty(&grid),
            step: 0,
            done: false,
            pending_chronics: None,
            rng: StdRng::seed_from_u64(seed),
            seed,
            chronics,
            params,
            reward,
            grid,
        };
        env.start_episode()?;
        Ok(env)
    }

    pub fn grid(&self) -> &Arc<GridObjects> {
        &self.grid
    }

    pub fn params(&self) -> &EnvParameters {
        &self.params
    }

    pub fn action_space(&self) -> &ActionSpace {
        &self.action_space
    }

    pub fn current_observation(&self) -> &Observation {
        &self.observation
    }

    /// Action the environment applied at the last step (injections and
    /// forced outages).
    pub fn env_modification(&self) -> &BaseAction {
        &self.env_modification
    }

    pub fn chronics_id(&self) -> String {
        self.chronics.chronics_id()
    }

    pub fn n_chronics(&self) -> usize {
        self.chronics.n_chronics()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn reward_range(&self) -> (f32, f32) {
        self.reward.range()
    }

    /// Last step of the current episode, when bounded.
    pub fn max_step(&self) -> Option<usize> {
        let chronics = self.chronics.max_timestep().map(|n| n.saturating_sub(1));
        match (chronics, self.params.max_steps) {
            (Some(c), Some(m)) => Some(c.min(m)),
            (c, m) => c.or(m),
        }
    }

    /// Random action from the agent action space.
    pub fn sample_action(&mut self) -> BaseAction {
        self.action_space.sample(&mut self.rng)
    }

    /// Selects the chronics the next [`Environment::reset`] plays.
    pub fn set_chronics(&mut self, index: usize) -> Result<(), EnvError> {
        let available = self.chronics.n_chronics();
        if index >= available {
            return Err(ChronicsError::UnknownChronics { index, available }.into());
        }
        self.pending_chronics = Some(index);
        Ok(())
    }

    /// Starts a new episode on the selected chronics, or on the next one.
    pub fn reset(&mut self) -> Result<Observation, EnvError> {
        match self.pending_chronics.take() {
            Some(index) => self.chronics.set_chronics(index)?,
            None => self.chronics.next_chronics()?,
        }
        self.start_episode()?;
        Ok(self.observation.clone())
    }

    fn start_episode(&mut self) -> Result<(), EnvError> {
        self.backend.reset();
        self.redispatcher.reset();
        self.storage.reset(self.grid.storage());
        self.cooldown_line.iter_mut().for_each(|c| *c = 0);
        self.cooldown_sub.iter_mut().for_each(|c| *c = 0);
        self.forced_out.iter_mut().for_each(|f| *f = false);
        self.previous_prod = None;
        self.step = 0;

        let inj = self
            .chronics
            .load_next()?
            .ok_or(EnvError::ChronicsExhausted(0))?;
        let env_action = self.environment_action(&inj)?;
        self.backend.apply_action(&env_action)?;
        self.backend.run().map_err(EnvError::InitialState)?;
        self.previous_prod = Some(inj.prod_p);
        self.env_modification = env_action;
        self.observation = self.build_observation();
        self.done = self.chronics.done() || self.params.max_steps == Some(0);
        info!(
            chronics = %self.chronics.chronics_id(),
            max_step = ?self.max_step(),
            "episode started"
        );
        Ok(())
    }

    /// Injections of the step, forced outages and the restoration of lines
    /// whose outage just ended.
    fn environment_action(&mut self, inj: &StepInjection) -> Result<BaseAction, ActionError> {
        let mut update = ActionUpdate {
            injection: Some(InjectionUpdate {
                load_p: Some(Values::Full(inj.load_p.clone())),
                load_q: Some(Values::Full(inj.load_q.clone())),
                prod_p: Some(Values::Full(inj.prod_p.clone())),
                prod_v: Some(Values::Full(inj.prod_v.clone())),
            }),
            ..ActionUpdate::default()
        };
        if inj.maintenance.iter().any(|m| *m) {
            update.maintenance = Some(Toggle::Mask(inj.maintenance.clone()));
        }
        if inj.hazards.iter().any(|h| *h) {
            update.hazards = Some(Toggle::Mask(inj.hazards.clone()));
        }

        let forced: Vec<bool> = inj
            .maintenance
            .iter()
            .zip(&inj.hazards)
            .map(|(m, h)| *m || *h)
            .collect();
        let restored: Vec<(ElementKey, i32)> = self
            .forced_out
            .iter()
            .zip(&forced)
            .enumerate()
            .filter(|(_, (was, is))| **was && !**is)
            .map(|(l, _)| (ElementKey::from(l), 1))
            .collect();
        if !restored.is_empty() {
            debug!(lines = restored.len(), "restoring lines after outage");
            update.set_line_status = Some(Values::Pairs(restored));
        }

        self.forced_out = forced;
        self.time_next_maintenance = inj.time_next_maintenance.clone();
        self.duration_next_maintenance = inj.duration_next_maintenance.clone();

        let mut action = self.env_space.build(&update)?;
        action.set_single_act(false);
        Ok(action)
    }

    /// Plays one step.
    ///
    /// An error leaves the episode finished: the environment has to be reset
    /// before it can step again.
    pub fn step(&mut self, action: &BaseAction) -> Result<StepOutcome, EnvError> {
        if self.done {
            return Err(EnvError::EpisodeOver);
        }
        if !(Arc::ptr_eq(action.grid(), &self.grid) || **action.grid() == *self.grid) {
            return Err(ActionError::DifferentGrid.into());
        }
        let outcome = self.advance(action);
        if let Err(e) = &outcome {
            warn!(step = self.step, error = %e, "step failed, episode stopped");
            self.done = true;
        }
        outcome
    }

    fn advance(&mut self, action: &BaseAction) -> Result<StepOutcome, EnvError> {
        let mut info = StepInfo::default();
        let (mut agent_action, mut impact) = self.screen(action, &mut info);

        let inj = self
            .chronics
            .load_next()?
            .ok_or(EnvError::ChronicsExhausted(self.step))?;
        self.step += 1;
        let env_action = self.environment_action(&inj)?;

        let storage_before = self.storage.clone();
        let target_before = self.redispatcher.target_dispatch().to_vec();
        self.request_dispatch(&agent_action)?;
        if let Some(first) = self.balance(&inj)? {
            debug!(step = self.step, error = %first, "dispatch infeasible, action replaced by do nothing");
            info.is_dispatching_illegal = true;
            info.exceptions.push(first.to_string());
            self.storage = storage_before;
            self.redispatcher.set_target(target_before)?;
            agent_action = self.action_space.do_nothing();
            impact = agent_action.topological_impact(None);
            self.request_dispatch(&agent_action)?;
            if let Some(e) = self.balance(&inj)? {
                warn!(step = self.step, error = %e, "game over");
                info.game_over = true;
                info.exceptions.push(e.to_string());
            }
        }

        let mut combined = agent_action;
        combined.set_single_act(false);
        combined.clear_redispatch();
        combined.combine(&env_action)?;
        self.env_modification = env_action;

        if !info.game_over {
            self.backend.apply_action(&combined)?;
            self.backend
                .set_dispatch(self.redispatcher.actual_dispatch())?;
            self.backend.set_storage_power(&self.storage.power)?;
            if let Err(e) = self.backend.run() {
                warn!(step = self.step, error = %e, "game over");
                info.game_over = true;
                info.exceptions.push(e.to_string());
            }
        }

        self.rules
            .update_cooldowns(&impact, &mut self.cooldown_line, &mut self.cooldown_sub);
        self.previous_prod = Some(
            inj.prod_p
                .iter()
                .zip(self.redispatcher.actual_dispatch())
                .map(|(p, d)| p + d)
                .collect(),
        );
        self.observation = self.build_observation();

        let reward = self.reward.compute(&RewardContext {
            grid: &self.grid,
            observation: &self.observation,
            is_illegal: info.is_illegal,
            is_ambiguous: info.is_ambiguous,
            game_over: info.game_over,
        });
        let max_reached = self.params.max_steps.is_some_and(|m| self.step >= m);
        self.done = info.game_over || self.chronics.done() || max_reached;
        if self.done {
            info!(step = self.step, game_over = info.game_over, "episode finished");
        }

        Ok(StepOutcome {
            observation: self.observation.clone(),
            reward,
            done: self.done,
            info,
        })
    }

    /// Replaces an ambiguous, unauthorized or illegal action by "do
    /// nothing". Returns the action kept and its topological impact.
    fn screen(&self, action: &BaseAction, info: &mut StepInfo) -> (BaseAction, TopologicalImpact) {
        let do_nothing = self.action_space.do_nothing();
        let idle = do_nothing.topological_impact(None);

        if let Err(e) = action.check_ambiguity() {
            debug!(step = self.step, error = %e, "ambiguous action replaced by do nothing");
            info.is_ambiguous = true;
            info.exceptions.push(e.to_string());
            return (do_nothing, idle);
        }
        if let Err(e) = self.action_space.check_authorized(action) {
            debug!(step = self.step, error = %e, "unauthorized action replaced by do nothing");
            info.is_illegal = true;
            info.exceptions.push(e.to_string());
            return (do_nothing, idle);
        }
        let line_status = self.backend.line_status();
        let ctx = RulesContext {
            line_status: &line_status,
            cooldown_line: &self.cooldown_line,
            cooldown_sub: &self.cooldown_sub,
            forced_out: &self.forced_out,
        };
        match self.rules.check(action, &ctx) {
            Ok(impact) => (action.clone(), impact),
            Err(e) => {
                debug!(step = self.step, error = %e, "illegal action replaced by do nothing");
                info.is_illegal = true;
                info.exceptions.push(e.to_string());
                (do_nothing, idle)
            }
        }
    }

    /// Moves storage units and accumulates the redispatch target requested
    /// by `action`.
    fn request_dispatch(&mut self, action: &BaseAction) -> Result<(), EnvError> {
        let modified = action.modified();
        let requested = if modified.storage {
            action.storage_power().to_vec()
        } else {
            vec![0.0; self.grid.n_storage()]
        };
        self.storage
            .step(self.grid.storage(), &requested, self.params.dt_hours());
        if modified.redispatch {
            self.redispatcher.add_target(action.redispatch())?;
        }
        Ok(())
    }

    /// Computes the actual dispatch for the current target and storage
    /// power. Returns the imbalance error when no dispatch fits.
    fn balance(&mut self, inj: &StepInjection) -> Result<Option<RedispatchError>, EnvError> {
        let storage = self.storage.total_power();
        match self.redispatcher.apply(
            self.grid.generators(),
            &inj.prod_p,
            self.previous_prod.as_deref(),
            storage,
        ) {
            Ok(()) => Ok(None),
            Err(e @ RedispatchError::Infeasible { .. }) => Ok(Some(e)),
            Err(e) => Err(e.into()),
        }
    }

    fn build_observation(&self) -> Observation {
        let b = &self.backend;
        let gen_p = b.gen_p().to_vec();
        let (gen_margin_up, gen_margin_down) = self
            .grid
            .generators()
            .iter()
            .zip(&gen_p)
            .map(|(g, p)| {
                if g.redispatchable {
                    (
                        (g.pmax - p).min(g.ramp_up).max(0.0),
                        (p - g.pmin).min(g.ramp_down).max(0.0),
                    )
                } else {
                    (0.0, 0.0)
                }
            })
            .unzip();
        Observation {
            step: self.step,
            max_step: self.max_step(),
            gen_p,
            gen_v: b.gen_v().to_vec(),
            load_p: b.load_p().to_vec(),
            load_q: b.load_q().to_vec(),
            line_status: b.line_status(),
            topo_vect: b.topo_vect().to_vec(),
            target_dispatch: self.redispatcher.target_dispatch().to_vec(),
            actual_dispatch: self.redispatcher.actual_dispatch().to_vec(),
            storage_charge: self.storage.charge.clone(),
            storage_power_target: self.storage.target.clone(),
            storage_power: self.storage.power.clone(),
            time_before_cooldown_line: self.cooldown_line.clone(),
            time_before_cooldown_sub: self.cooldown_sub.clone(),
            time_next_maintenance: self.time_next_maintenance.clone(),
            duration_next_maintenance: self.duration_next_maintenance.clone(),
            gen_margin_up,
            gen_margin_down,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chronics::{ChangeNothing, ChronicsData, InMemoryChronics};
    use crate::grid::presets;
    use crate::sim::reward::FlatReward;

    fn env_on(data: ChronicsData, params: EnvParameters) -> Environment {
        let grid = Arc::new(presets::case14().unwrap());
        Environment::new(
            grid,
            Box::new(InMemoryChronics::new(data)),
            params,
            Box::new(FlatReward),
            0,
        )
        .unwrap()
    }

    fn constant_env(n_steps: usize) -> Environment {
        let grid = presets::case14().unwrap();
        env_on(ChronicsData::constant(&grid, n_steps), EnvParameters::default())
    }

    #[test]
    fn do_nothing_runs_to_the_end() {
        let mut env = constant_env(5);
        assert_eq!(env.max_step(), Some(4));
        let noop = env.action_space().do_nothing();
        let mut steps = 0;
        loop {
            let out = env.step(&noop).unwrap();
            steps += 1;
            assert_eq!(out.reward, 1.0);
            if out.done {
                break;
            }
        }
        assert_eq!(steps, 4);
        assert!(matches!(env.step(&noop), Err(EnvError::EpisodeOver)));
        env.reset().unwrap();
        assert_eq!(env.current_step(), 0);
        assert!(!env.is_done());
    }

    #[test]
    fn generation_matches_load() {
        let mut env = constant_env(3);
        let noop = env.action_space().do_nothing();
        let out = env.step(&noop).unwrap();
        let obs = out.observation;
        assert!((obs.total_generation() - obs.total_load()).abs() < 1e-3);
    }

    #[test]
    fn redispatch_persists_and_balances() {
        let mut env = constant_env(6);
        let act = env
            .action_space()
            .build(&ActionUpdate::redispatch([(0, 5.0)]))
            .unwrap();
        let out = env.step(&act).unwrap();
        assert!(!out.info.is_ambiguous && !out.info.is_dispatching_illegal);
        let obs = &out.observation;
        assert_eq!(obs.target_dispatch[0], 5.0);
        assert_eq!(obs.actual_dispatch[0], 5.0);
        assert!(obs.actual_dispatch.iter().sum::<f32>().abs() < 1e-3);

        let noop = env.action_space().do_nothing();
        let out = env.step(&noop).unwrap();
        assert_eq!(out.observation.actual_dispatch[0], 5.0);
    }

    #[test]
    fn ambiguous_action_is_flagged_and_ignored() {
        let mut env = constant_env(4);
        // Unit 2 (wind) cannot be redispatched.
        let mut act = env.action_space().do_nothing();
        act.update(&ActionUpdate::redispatch([(2, 5.0)])).unwrap();
        let out = env.step(&act).unwrap();
        assert!(out.info.is_ambiguous);
        assert!(!out.info.exceptions.is_empty());
        assert!(out.observation.target_dispatch.iter().all(|t| *t == 0.0));
        assert_eq!(out.reward, 1.0);
    }

    #[test]
    fn illegal_action_is_flagged() {
        let mut env = constant_env(4);
        let act = env
            .action_space()
            .build(&ActionUpdate::set_line_status([(0, -1), (1, -1)]))
            .unwrap();
        let out = env.step(&act).unwrap();
        assert!(out.info.is_illegal);
        assert!(out.observation.line_status.iter().all(|s| *s));
    }

    #[test]
    fn line_actions_apply_and_cool_down() {
        let grid = presets::case14().unwrap();
        let params = EnvParameters {
            line_cooldown: 2,
            ..EnvParameters::default()
        };
        let mut env = env_on(ChronicsData::constant(&grid, 6), params);
        let act = env
            .action_space()
            .build(&ActionUpdate::set_line_status([(9, -1)]))
            .unwrap();
        let out = env.step(&act).unwrap();
        assert!(!out.info.is_illegal);
        assert!(!out.observation.line_status[9]);
        assert_eq!(out.observation.time_before_cooldown_line[9], 2);

        let back = env
            .action_space()
            .build(&ActionUpdate::set_line_status([(9, 1)]))
            .unwrap();
        assert!(env.step(&back).unwrap().info.is_illegal);
        let out = env.step(&env.action_space().do_nothing()).unwrap();
        assert_eq!(out.observation.time_before_cooldown_line[9], 0);
        let out = env.step(&back).unwrap();
        assert!(!out.info.is_illegal);
        assert!(out.observation.line_status[9]);
    }

    #[test]
    fn maintenance_takes_lines_out_and_back() {
        let grid = presets::case14().unwrap();
        let mut data = ChronicsData::constant(&grid, 6);
        data.maintenance = vec![vec![false; grid.n_line()]; 6];
        data.maintenance[2][9] = true;
        data.maintenance[3][9] = true;
        let mut env = env_on(data, EnvParameters::default());
        assert_eq!(env.current_observation().time_next_maintenance[9], 2);
        let noop = env.action_space().do_nothing();

        let out = env.step(&noop).unwrap();
        assert!(out.observation.line_status[9]);
        assert_eq!(out.observation.time_next_maintenance[9], 1);
        let out = env.step(&noop).unwrap();
        assert!(!out.observation.line_status[9]);
        assert!(env.env_modification().maintenance()[9]);

        let reconnect = env
            .action_space()
            .build(&ActionUpdate::set_line_status([(9, 1)]))
            .unwrap();
        let out = env.step(&reconnect).unwrap();
        assert!(out.info.is_illegal);
        assert!(!out.observation.line_status[9]);

        let out = env.step(&noop).unwrap();
        assert!(out.observation.line_status[9]);
        assert_eq!(out.observation.time_next_maintenance[9], -1);
    }

    #[test]
    fn islanding_is_game_over() {
        let grid = presets::case5().unwrap();
        let grid = Arc::new(grid);
        let mut env = Environment::new(
            Arc::clone(&grid),
            Box::new(ChangeNothing::new(Some(10))),
            EnvParameters {
                max_line_status_changed: 2,
                ..EnvParameters::default()
            },
            Box::new(FlatReward),
            0,
        )
        .unwrap();
        let act = env
            .action_space()
            .build(&ActionUpdate::set_line_status([(3, -1), (7, -1)]))
            .unwrap();
        let out = env.step(&act).unwrap();
        assert!(out.info.game_over);
        assert!(out.done);
        assert_eq!(out.reward, 0.0);
    }

    #[test]
    fn max_steps_caps_the_episode() {
        let grid = presets::case14().unwrap();
        let params = EnvParameters {
            max_steps: Some(2),
            ..EnvParameters::default()
        };
        let mut env = env_on(ChronicsData::constant(&grid, 10), params);
        assert_eq!(env.max_step(), Some(2));
        let noop = env.action_space().do_nothing();
        assert!(!env.step(&noop).unwrap().done);
        assert!(env.step(&noop).unwrap().done);
    }

    #[test]
    fn rejects_actions_on_another_grid() {
        let mut env = constant_env(3);
        let other = BaseAction::new(Arc::new(presets::case5().unwrap()));
        assert!(matches!(
            env.step(&other),
            Err(EnvError::Action(ActionError::DifferentGrid))
        ));
    }

    #[test]
    fn set_chronics_checks_the_index() {
        let mut env = constant_env(3);
        assert!(env.set_chronics(1).is_err());
        env.set_chronics(0).unwrap();
        env.reset().unwrap();
    }

    #[test]
    fn storage_follows_requests_within_bounds() {
        let grid = Arc::new(presets::case14_storage().unwrap());
        let mut env = Environment::new(
            Arc::clone(&grid),
            Box::new(InMemoryChronics::new(ChronicsData::constant(&grid, 5))),
            EnvParameters {
                action_profile: ActionProfile::Playable,
                ..EnvParameters::default()
            },
            Box::new(FlatReward),
            0,
        )
        .unwrap();
        let before = env.current_observation().storage_charge[0];
        let act = env
            .action_space()
            .build(&ActionUpdate::set_storage([(0, 3.0)]))
            .unwrap();
        let out = env.step(&act).unwrap();
        let obs = &out.observation;
        assert_eq!(obs.storage_power[0], 3.0);
        assert!(obs.storage_charge[0] > before);
        // Controllable units cover the storage consumption.
        assert!((obs.actual_dispatch.iter().sum::<f32>() - 3.0).abs() < 1e-3);
        assert!((obs.total_generation() - obs.total_load() - 3.0).abs() < 1e-3);
    }

    fn storage_env(data: impl FnOnce(&GridObjects) -> ChronicsData) -> Environment {
        let grid = Arc::new(presets::case14_storage().unwrap());
        Environment::new(
            Arc::clone(&grid),
            Box::new(InMemoryChronics::new(data(&grid))),
            EnvParameters {
                action_profile: ActionProfile::Playable,
                ..EnvParameters::default()
            },
            Box::new(FlatReward),
            0,
        )
        .unwrap()
    }

    #[test]
    fn unbalanced_storage_request_is_replaced_by_do_nothing() {
        // Every controllable unit is scheduled at pmax: nothing can cover
        // extra storage consumption.
        let mut env = storage_env(|grid| {
            let mut data = ChronicsData::constant(grid, 5);
            for row in &mut data.prod_p {
                for (p, g) in row.iter_mut().zip(grid.generators()) {
                    if g.redispatchable {
                        *p = g.pmax;
                    }
                }
            }
            data
        });
        let charge = env.current_observation().storage_charge.clone();
        let mut act = env
            .action_space()
            .build(&ActionUpdate::set_storage([(0, 3.0)]))
            .unwrap();
        act.update(&ActionUpdate::set_line_status([(9, -1)])).unwrap();

        let out = env.step(&act).unwrap();
        assert!(out.info.is_dispatching_illegal);
        assert!(!out.info.game_over);
        assert!(!out.done);
        assert_eq!(out.info.exceptions.len(), 1);
        let obs = &out.observation;
        assert_eq!(obs.storage_power, vec![0.0, 0.0]);
        assert_eq!(obs.storage_charge, charge);
        assert!(obs.target_dispatch.iter().all(|t| *t == 0.0));
        assert!(obs.line_status[9]);

        let out = env.step(&env.action_space().do_nothing()).unwrap();
        assert!(!out.info.is_dispatching_illegal);
    }

    #[test]
    fn schedule_beyond_the_ramps_is_game_over() {
        let grid = presets::case14().unwrap();
        let mut data = ChronicsData::constant(&grid, 5);
        for row in &mut data.prod_p[2..] {
            for (p, g) in row.iter_mut().zip(grid.generators()) {
                if g.redispatchable {
                    *p += g.ramp_up + 5.0;
                }
            }
        }
        let mut env = env_on(data, EnvParameters::default());
        let noop = env.action_space().do_nothing();
        assert!(!env.step(&noop).unwrap().done);

        let out = env.step(&noop).unwrap();
        assert!(out.info.is_dispatching_illegal);
        assert!(out.info.game_over);
        assert!(out.done);
        assert_eq!(out.info.exceptions.len(), 2);
        assert_eq!(out.reward, 0.0);
    }

    /// Serves constant injections, then fails.
    struct FailingChronics {
        inner: ChangeNothing,
        fail_at: usize,
    }

    impl GridValue for FailingChronics {
        fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError> {
            self.inner.initialize(grid)
        }

        fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError> {
            let step = self.inner.current_step();
            if step >= self.fail_at {
                return Err(ChronicsError::NotFinite {
                    what: "load_p".to_string(),
                    step,
                });
            }
            self.inner.load_next()
        }

        fn max_timestep(&self) -> Option<usize> {
            self.inner.max_timestep()
        }

        fn current_step(&self) -> usize {
            self.inner.current_step()
        }

        fn chronics_id(&self) -> String {
            self.inner.chronics_id()
        }

        fn set_chronics(&mut self, index: usize) -> Result<(), ChronicsError> {
            self.inner.set_chronics(index)
        }
    }

    #[test]
    fn failed_step_finishes_the_episode() {
        let grid = Arc::new(presets::case5().unwrap());
        let chronics = FailingChronics {
            inner: ChangeNothing::new(Some(10)),
            fail_at: 3,
        };
        let mut env = Environment::new(
            grid,
            Box::new(chronics),
            EnvParameters::default(),
            Box::new(FlatReward),
            0,
        )
        .unwrap();
        let noop = env.action_space().do_nothing();
        env.step(&noop).unwrap();
        env.step(&noop).unwrap();
        assert!(matches!(env.step(&noop), Err(EnvError::Chronics(_))));
        assert!(env.is_done());
        assert!(matches!(env.step(&noop), Err(EnvError::EpisodeOver)));
    }
}
