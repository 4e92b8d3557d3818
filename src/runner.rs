//! Plays episodes of an agent, optionally in parallel, and logs them.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::io::{EpisodeError, EpisodeMeta, EpisodeTimes, EpisodeWriter};
use crate::sim::{Agent, AgentKind, EnvBuilder, EnvError, EpisodeSummary, StepRecord};

/// Builds the agent of an episode from its index.
pub type AgentFactory = Arc<dyn Fn(usize) -> Box<dyn Agent> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("at least one worker is needed")]
    NoWorker,
    #[error("could not start {workers} workers: {source}")]
    Pool {
        workers: usize,
        source: rayon::ThreadPoolBuildError,
    },
    #[error("episode {episode}: {source}")]
    Env { episode: usize, source: EnvError },
    #[error("episode {episode}: {source}")]
    Log {
        episode: usize,
        source: EpisodeError,
    },
}

/// Outcome of one episode.
#[derive(Debug, Clone)]
pub struct EpisodeResult {
    pub episode: usize,
    pub chronics_id: String,
    pub steps_played: usize,
    pub cumulative_reward: f32,
    pub game_over: bool,
    pub summary: EpisodeSummary,
    pub records: Vec<StepRecord>,
    pub times: EpisodeTimes,
    /// Directory of the episode log, when logging.
    pub log_dir: Option<PathBuf>,
}

/// Runs episodes of an agent on environments built from one recipe.
///
/// Episode `i` plays chronics `i % n_chronics` on an environment seeded
/// with the recipe seed plus `i`, so results do not depend on the number of
/// workers.
pub struct Runner {
    builder: EnvBuilder,
    agent_factory: AgentFactory,
    max_iter: Option<usize>,
}

impl Runner {
    pub fn new(
        builder: EnvBuilder,
        agent_factory: impl Fn(usize) -> Box<dyn Agent> + Send + Sync + 'static,
    ) -> Self {
        Self {
            builder,
            agent_factory: Arc::new(agent_factory),
            max_iter: None,
        }
    }

    /// Runner for a configured agent; episode `i` gets an agent seeded with
    /// `seed + i`.
    pub fn from_kind(builder: EnvBuilder, kind: AgentKind, seed: u64) -> Self {
        Self::new(builder, move |i| kind.build(seed.wrapping_add(i as u64)))
    }

    /// Caps the number of steps of every episode.
    pub fn max_iter(mut self, max_iter: Option<usize>) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Plays `n_episodes` episodes on `workers` threads. With a `log_dir`,
    /// each episode is logged under `log_dir/<chronics_id>/`, suffixed with
    /// the episode index once chronics start repeating.
    pub fn run(
        &self,
        n_episodes: usize,
        workers: usize,
        log_dir: Option<&Path>,
    ) -> Result<Vec<EpisodeResult>, RunnerError> {
        if workers == 0 {
            return Err(RunnerError::NoWorker);
        }
        info!(n_episodes, workers, "starting run");
        if workers == 1 {
            return (0..n_episodes)
                .map(|i| self.run_episode(i, log_dir))
                .collect();
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|source| RunnerError::Pool { workers, source })?;
        pool.install(|| {
            (0..n_episodes)
                .into_par_iter()
                .map(|i| self.run_episode(i, log_dir))
                .collect()
        })
    }

    fn run_episode(&self, episode: usize, log_dir: Option<&Path>) -> Result<EpisodeResult, RunnerError> {
        let env_err = |source| RunnerError::Env { episode, source };
        let log_err = |source| RunnerError::Log { episode, source };
        let start = Instant::now();

        let mut env = self.builder.build_seeded(episode as u64).map_err(env_err)?;
        let n_chronics = env.n_chronics().max(1);
        env.set_chronics(episode % n_chronics).map_err(env_err)?;
        let mut observation = env.reset().map_err(env_err)?;
        let chronics_id = env.chronics_id();
        let space = env.action_space().clone();
        let mut agent = (self.agent_factory)(episode);
        agent.reset(&observation);

        let dir = log_dir.map(|root| {
            if episode < n_chronics {
                root.join(&chronics_id)
            } else {
                root.join(format!("{chronics_id}_{episode}"))
            }
        });
        let mut writer = match &dir {
            Some(d) => Some(EpisodeWriter::create(d, env.grid(), &observation).map_err(log_err)?),
            None => None,
        };
        let mut times = EpisodeTimes {
            build_s: start.elapsed().as_secs_f64(),
            ..EpisodeTimes::default()
        };

        let played = (|| -> Result<(Vec<StepRecord>, f32, bool), RunnerError> {
            let mut records = Vec::new();
            let mut reward = 0.0;
            let mut done = env.is_done();
            let mut game_over = false;
            while !done && self.max_iter.is_none_or(|m| records.len() < m) {
                let t = Instant::now();
                let action = agent.act(&observation, reward, done, &space);
                times.agent_s += t.elapsed().as_secs_f64();

                let t = Instant::now();
                let outcome = env.step(&action).map_err(env_err)?;
                times.env_s += t.elapsed().as_secs_f64();

                if let Some(w) = writer.as_mut() {
                    w.record(&action, env.env_modification(), &outcome)
                        .map_err(log_err)?;
                }
                records.push(StepRecord::from_outcome(&outcome));
                reward = outcome.reward;
                done = outcome.done;
                game_over = outcome.info.game_over;
                observation = outcome.observation;
            }
            times.total_s = start.elapsed().as_secs_f64();

            let cumulative_reward: f32 = records.iter().map(|r| r.reward).sum();
            if let Some(w) = writer {
                let meta = EpisodeMeta {
                    chronics_id: chronics_id.clone(),
                    episode,
                    agent: agent.name().to_string(),
                    grid: env.grid().name().to_string(),
                    seed: env.seed(),
                    steps_played: records.len(),
                    max_step: env.max_step(),
                    cumulative_reward,
                    game_over,
                    reward_range: env.reward_range(),
                    dt_hours: env.params().dt_hours(),
                };
                w.finish(&meta, &times).map_err(log_err)?;
            }
            Ok((records, cumulative_reward, game_over))
        })();
        let (records, cumulative_reward, game_over) = match played {
            Ok(played) => played,
            Err(e) => {
                if let Some(d) = &dir {
                    discard_log(d);
                }
                return Err(e);
            }
        };
        let dt_hours = env.params().dt_hours();

        info!(
            episode,
            chronics = %chronics_id,
            steps = records.len(),
            reward = cumulative_reward,
            game_over,
            "episode finished"
        );
        Ok(EpisodeResult {
            episode,
            summary: EpisodeSummary::from_records(&records, dt_hours),
            steps_played: records.len(),
            chronics_id,
            cumulative_reward,
            game_over,
            records,
            times,
            log_dir: dir,
        })
    }
}

/// Removes the log of an episode that did not finish.
fn discard_log(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => warn!(dir = %dir.display(), "removed unfinished episode log"),
        Err(e) => warn!(dir = %dir.display(), error = %e, "could not remove unfinished episode log"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chronics::ChronicsSource;
    use crate::action::{ActionSpace, BaseAction};
    use crate::io::EpisodeData;
    use crate::sim::{DoNothingAgent, Observation};

    fn builder() -> EnvBuilder {
        EnvBuilder::preset("case14", true).unwrap().seed(11)
    }

    #[test]
    fn runs_every_episode() {
        let runner = Runner::new(builder(), |_| Box::new(DoNothingAgent));
        let results = runner.run(3, 1, None).unwrap();
        assert_eq!(results.len(), 3);
        let ids: Vec<&str> = results.iter().map(|r| r.chronics_id.as_str()).collect();
        assert_eq!(ids, vec!["0000", "0001", "0000"]);
        for r in &results {
            assert_eq!(r.steps_played, 47);
            assert!(!r.game_over);
            assert_eq!(r.cumulative_reward, 47.0);
            assert_eq!(r.summary.steps_played, 47);
        }
    }

    #[test]
    fn parallel_runs_match_sequential_ones() {
        let runner = Runner::from_kind(
            builder(),
            AgentKind::RandomRedispatch {
                probability: 0.5,
                max_mw: 5.0,
            },
            3,
        )
        .max_iter(Some(20));
        let sequential = runner.run(4, 1, None).unwrap();
        let parallel = runner.run(4, 3, None).unwrap();
        for (a, b) in sequential.iter().zip(&parallel) {
            assert_eq!(a.episode, b.episode);
            assert_eq!(a.records, b.records);
        }
        assert!(sequential.iter().all(|r| r.steps_played == 20));
    }

    #[test]
    fn zero_workers_is_an_error() {
        let runner = Runner::new(builder(), |_| Box::new(DoNothingAgent));
        assert!(matches!(runner.run(1, 0, None), Err(RunnerError::NoWorker)));
    }

    #[test]
    fn logs_episodes_to_disk() {
        let root = std::env::temp_dir().join(format!("grid_sim_runner_{}", std::process::id()));
        let builder = builder().chronics(ChronicsSource::ChangeNothing { max_iter: Some(6) });
        let runner = Runner::new(builder, |_| Box::new(DoNothingAgent));
        let results = runner.run(2, 2, Some(&root)).unwrap();
        assert_eq!(results[0].log_dir, Some(root.join("change_nothing")));
        assert_eq!(results[1].log_dir, Some(root.join("change_nothing_1")));

        let data = EpisodeData::from_disk(&root.join("change_nothing")).unwrap();
        assert_eq!(data.len(), 5);
        assert_eq!(data.meta().agent, "do_nothing");
        assert_eq!(data.meta().cumulative_reward, 5.0);
        assert_eq!(data.summary(), results[0].summary);
        std::fs::remove_dir_all(&root).ok();
    }

    /// Plays on the wrong grid from its third step on.
    struct WrongGridAgent;

    impl Agent for WrongGridAgent {
        fn act(&mut self, obs: &Observation, _: f32, _: bool, space: &ActionSpace) -> BaseAction {
            if obs.step < 2 {
                return space.do_nothing();
            }
            BaseAction::new(Arc::new(crate::grid::presets::case5().unwrap()))
        }

        fn name(&self) -> &str {
            "wrong_grid"
        }
    }

    #[test]
    fn failed_episodes_leave_no_log() {
        let root = std::env::temp_dir().join(format!("grid_sim_runner_fail_{}", std::process::id()));
        let runner = Runner::new(builder(), |_| Box::new(WrongGridAgent));
        let err = runner.run(1, 1, Some(&root)).unwrap_err();
        assert!(matches!(err, RunnerError::Env { episode: 0, .. }));
        assert!(!root.join("0000").exists());
        std::fs::remove_dir_all(&root).ok();
    }
}
