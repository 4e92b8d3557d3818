//! Episode logs on disk: one directory per episode, written while the
//! episode is played and loaded back for offline study.
//!
//! Layout of an episode directory:
//!
//! | file | content |
//! |------|---------|
//! | `episode_meta.json` | [`EpisodeMeta`] |
//! | `episode_times.json` | [`EpisodeTimes`] |
//! | `grid.json` | grid description |
//! | `observations.jsonl` | initial observation, then one per step |
//! | `actions.jsonl` | agent action of every step |
//! | `env_modifications.jsonl` | environment action of every step |
//! | `infos.jsonl` | [`StepInfo`] of every step |
//! | `rewards.csv` | reward of every step |
//! | `steps.csv` | per-step summary, see [`super::export`] |

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::export::{read_rewards_csv, write_csv, write_rewards_csv};
use crate::action::{ActionError, ActionRecord, BaseAction};
use crate::grid::{GridError, GridObjects};
use crate::sim::{EpisodeSummary, Observation, StepInfo, StepOutcome, StepRecord};

pub const META_FILE: &str = "episode_meta.json";
pub const TIMES_FILE: &str = "episode_times.json";
pub const GRID_FILE: &str = "grid.json";
pub const OBSERVATIONS_FILE: &str = "observations.jsonl";
pub const ACTIONS_FILE: &str = "actions.jsonl";
pub const ENV_MODIFICATIONS_FILE: &str = "env_modifications.jsonl";
pub const INFOS_FILE: &str = "infos.jsonl";
pub const REWARDS_FILE: &str = "rewards.csv";
pub const STEPS_FILE: &str = "steps.csv";

#[derive(Debug, Error)]
pub enum EpisodeError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}, line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("{path}, line {line}: {source}")]
    Action {
        path: PathBuf,
        line: usize,
        source: ActionError,
    },
    #[error("inconsistent episode log: {0}")]
    Inconsistent(String),
    #[error("generator {id} does not exist ({n_gen} on this grid)")]
    UnknownGenerator { id: usize, n_gen: usize },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> EpisodeError + '_ {
    move |source| EpisodeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// What an episode was and how it ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub chronics_id: String,
    /// Index of the episode in its run.
    pub episode: usize,
    pub agent: String,
    pub grid: String,
    pub seed: u64,
    pub steps_played: usize,
    pub max_step: Option<usize>,
    pub cumulative_reward: f32,
    pub game_over: bool,
    pub reward_range: (f32, f32),
    /// Step duration in hours.
    pub dt_hours: f32,
}

/// Wall-clock time spent in an episode, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeTimes {
    /// Building and resetting the environment.
    pub build_s: f64,
    pub agent_s: f64,
    pub env_s: f64,
    pub total_s: f64,
}

/// Writes the log of one episode as it is played.
pub struct EpisodeWriter {
    dir: PathBuf,
    observations: BufWriter<File>,
    actions: BufWriter<File>,
    env_modifications: BufWriter<File>,
    infos: BufWriter<File>,
    rewards: Vec<f32>,
    records: Vec<StepRecord>,
}

impl EpisodeWriter {
    /// Creates `dir` (replacing an older log) with the grid and the initial
    /// observation.
    pub fn create(dir: &Path, grid: &GridObjects, initial: &Observation) -> Result<Self, EpisodeError> {
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(io_err(dir))?;
        }
        fs::create_dir_all(dir).map_err(io_err(dir))?;
        let grid_path = dir.join(GRID_FILE);
        fs::write(&grid_path, grid.to_json()?).map_err(io_err(&grid_path))?;

        let open = |name: &str| -> Result<BufWriter<File>, EpisodeError> {
            let path = dir.join(name);
            let file = File::create(&path).map_err(io_err(&path))?;
            Ok(BufWriter::new(file))
        };
        let mut writer = Self {
            dir: dir.to_path_buf(),
            observations: open(OBSERVATIONS_FILE)?,
            actions: open(ACTIONS_FILE)?,
            env_modifications: open(ENV_MODIFICATIONS_FILE)?,
            infos: open(INFOS_FILE)?,
            rewards: Vec::new(),
            records: Vec::new(),
        };
        let path = writer.dir.join(OBSERVATIONS_FILE);
        write_line(&mut writer.observations, &path, initial)?;
        Ok(writer)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Appends one step.
    pub fn record(
        &mut self,
        action: &BaseAction,
        env_modification: &BaseAction,
        outcome: &StepOutcome,
    ) -> Result<(), EpisodeError> {
        let dir = self.dir.clone();
        write_line(&mut self.actions, &dir.join(ACTIONS_FILE), &action.to_record())?;
        write_line(
            &mut self.env_modifications,
            &dir.join(ENV_MODIFICATIONS_FILE),
            &env_modification.to_record(),
        )?;
        write_line(&mut self.observations, &dir.join(OBSERVATIONS_FILE), &outcome.observation)?;
        write_line(&mut self.infos, &dir.join(INFOS_FILE), &outcome.info)?;
        self.rewards.push(outcome.reward);
        self.records.push(StepRecord::from_outcome(outcome));
        Ok(())
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Flushes the step files and writes the summaries. Returns the step
    /// records.
    pub fn finish(
        mut self,
        meta: &EpisodeMeta,
        times: &EpisodeTimes,
    ) -> Result<Vec<StepRecord>, EpisodeError> {
        for (name, w) in [
            (OBSERVATIONS_FILE, &mut self.observations),
            (ACTIONS_FILE, &mut self.actions),
            (ENV_MODIFICATIONS_FILE, &mut self.env_modifications),
            (INFOS_FILE, &mut self.infos),
        ] {
            w.flush().map_err(io_err(&self.dir.join(name)))?;
        }

        let path = self.dir.join(REWARDS_FILE);
        let file = File::create(&path).map_err(io_err(&path))?;
        write_rewards_csv(&self.rewards, BufWriter::new(file)).map_err(io_err(&path))?;
        let path = self.dir.join(STEPS_FILE);
        let file = File::create(&path).map_err(io_err(&path))?;
        write_csv(&self.records, BufWriter::new(file)).map_err(io_err(&path))?;

        write_json(&self.dir.join(META_FILE), meta)?;
        write_json(&self.dir.join(TIMES_FILE), times)?;
        Ok(self.records)
    }
}

fn write_line<T: Serialize>(w: &mut impl Write, path: &Path, value: &T) -> Result<(), EpisodeError> {
    let json = serde_json::to_string(value).map_err(|source| EpisodeError::Json {
        path: path.to_path_buf(),
        line: 0,
        source,
    })?;
    writeln!(w, "{json}").map_err(io_err(path))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EpisodeError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| EpisodeError::Json {
        path: path.to_path_buf(),
        line: 0,
        source,
    })?;
    fs::write(path, json).map_err(io_err(path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, EpisodeError> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&text).map_err(|source| EpisodeError::Json {
        path: path.to_path_buf(),
        line: 1,
        source,
    })
}

fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, EpisodeError> {
    let file = File::open(path).map_err(io_err(path))?;
    let mut out = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line).map_err(|source| EpisodeError::Json {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        out.push(value);
    }
    Ok(out)
}

/// Why a line went out of service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectionCause {
    Agent,
    Maintenance,
    Hazard,
    /// Taken out with one of its ends by a bus change.
    Topology,
}

/// A line found disconnected at `step` while it was in service before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDisconnection {
    pub step: usize,
    pub line: usize,
    pub cause: DisconnectionCause,
}

/// Number of agent actions using each category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub do_nothing: usize,
    pub set_line_status: usize,
    pub change_line_status: usize,
    pub set_bus: usize,
    pub change_bus: usize,
    pub redispatch: usize,
    pub storage: usize,
}

/// A persisted episode loaded back from disk.
///
/// `observations[0]` is the initial observation; step `t` (from 1) played
/// `actions[t - 1]` and produced `observations[t]`.
#[derive(Debug, Clone)]
pub struct EpisodeData {
    dir: PathBuf,
    meta: EpisodeMeta,
    times: EpisodeTimes,
    grid: Arc<GridObjects>,
    observations: Vec<Observation>,
    actions: Vec<BaseAction>,
    env_modifications: Vec<BaseAction>,
    infos: Vec<StepInfo>,
    rewards: Vec<f32>,
}

fn read_actions(grid: &Arc<GridObjects>, path: &Path) -> Result<Vec<BaseAction>, EpisodeError> {
    read_lines::<ActionRecord>(path)?
        .iter()
        .enumerate()
        .map(|(i, record)| {
            BaseAction::from_record(Arc::clone(grid), record).map_err(|source| {
                EpisodeError::Action {
                    path: path.to_path_buf(),
                    line: i + 1,
                    source,
                }
            })
        })
        .collect()
}

impl EpisodeData {
    /// Loads and cross-checks every file of an episode directory.
    pub fn from_disk(dir: &Path) -> Result<Self, EpisodeError> {
        let meta: EpisodeMeta = read_json(&dir.join(META_FILE))?;
        let times: EpisodeTimes = read_json(&dir.join(TIMES_FILE))?;
        let grid_path = dir.join(GRID_FILE);
        let json = fs::read_to_string(&grid_path).map_err(io_err(&grid_path))?;
        let grid = Arc::new(GridObjects::from_json(&json)?);

        let observations: Vec<Observation> = read_lines(&dir.join(OBSERVATIONS_FILE))?;
        let actions = read_actions(&grid, &dir.join(ACTIONS_FILE))?;
        let env_modifications = read_actions(&grid, &dir.join(ENV_MODIFICATIONS_FILE))?;
        let infos: Vec<StepInfo> = read_lines(&dir.join(INFOS_FILE))?;
        let rewards_path = dir.join(REWARDS_FILE);
        let file = File::open(&rewards_path).map_err(io_err(&rewards_path))?;
        let rewards = read_rewards_csv(file).map_err(|source| EpisodeError::Csv {
            path: rewards_path.clone(),
            source,
        })?;

        let n = actions.len();
        let lengths = [
            ("observations", observations.len(), n + 1),
            ("environment actions", env_modifications.len(), n),
            ("infos", infos.len(), n),
            ("rewards", rewards.len(), n),
            ("steps in metadata", meta.steps_played, n),
        ];
        for (what, got, expected) in lengths {
            if got != expected {
                return Err(EpisodeError::Inconsistent(format!(
                    "{n} actions but {got} {what} (expected {expected})"
                )));
            }
        }
        if let Some(bad) = observations.iter().position(|o| o.gen_p.len() != grid.n_gen()) {
            return Err(EpisodeError::Inconsistent(format!(
                "observation {bad} does not match the grid"
            )));
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            meta,
            times,
            grid,
            observations,
            actions,
            env_modifications,
            infos,
            rewards,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn meta(&self) -> &EpisodeMeta {
        &self.meta
    }

    pub fn times(&self) -> &EpisodeTimes {
        &self.times
    }

    pub fn grid(&self) -> &Arc<GridObjects> {
        &self.grid
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn actions(&self) -> &[BaseAction] {
        &self.actions
    }

    pub fn env_modifications(&self) -> &[BaseAction] {
        &self.env_modifications
    }

    pub fn infos(&self) -> &[StepInfo] {
        &self.infos
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    /// Steps played.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// `(target, actual)` dispatch of a generator at every observation.
    pub fn dispatch_history(&self, gen_id: usize) -> Result<Vec<(f32, f32)>, EpisodeError> {
        let n_gen = self.grid.n_gen();
        if gen_id >= n_gen {
            return Err(EpisodeError::UnknownGenerator { id: gen_id, n_gen });
        }
        Ok(self
            .observations
            .iter()
            .map(|o| (o.target_dispatch[gen_id], o.actual_dispatch[gen_id]))
            .collect())
    }

    pub fn action_counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for action in &self.actions {
            let m = action.modified();
            if !m.any() {
                counts.do_nothing += 1;
            }
            counts.set_line_status += usize::from(m.set_status);
            counts.change_line_status += usize::from(m.change_status);
            counts.set_bus += usize::from(m.set_bus);
            counts.change_bus += usize::from(m.change_bus);
            counts.redispatch += usize::from(m.redispatch);
            counts.storage += usize::from(m.storage);
        }
        counts
    }

    /// Every line going out of service, in step order.
    pub fn line_disconnections(&self) -> Vec<LineDisconnection> {
        let mut events = Vec::new();
        for (t, pair) in self.observations.windows(2).enumerate() {
            let (before, after) = (&pair[0], &pair[1]);
            let env = &self.env_modifications[t];
            let agent = &self.actions[t];
            let dropped = before
                .line_status
                .iter()
                .zip(&after.line_status)
                .enumerate()
                .filter(|(_, (was, is))| **was && !**is);
            for (line, _) in dropped {
                let cause = if env.maintenance()[line] {
                    DisconnectionCause::Maintenance
                } else if env.hazards()[line] {
                    DisconnectionCause::Hazard
                } else if agent.set_line_status()[line] == -1 || agent.switch_line_status()[line] {
                    DisconnectionCause::Agent
                } else {
                    DisconnectionCause::Topology
                };
                events.push(LineDisconnection {
                    step: t + 1,
                    line,
                    cause,
                });
            }
        }
        events
    }

    /// Step records rebuilt from the log. A step is done on a game over or
    /// when it reaches the last step of the episode.
    pub fn records(&self) -> Vec<StepRecord> {
        self.observations
            .iter()
            .skip(1)
            .zip(&self.infos)
            .zip(&self.rewards)
            .map(|((observation, info), reward)| {
                StepRecord::from_outcome(&StepOutcome {
                    observation: observation.clone(),
                    reward: *reward,
                    done: info.game_over || self.meta.max_step == Some(observation.step),
                    info: info.clone(),
                })
            })
            .collect()
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary::from_records(&self.records(), self.meta.dt_hours)
    }
}
