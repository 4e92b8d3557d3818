//! Time series feeding the environment: injections for every step, and the
//! maintenance and hazard events that force lines out of service.

mod change_nothing;
mod data;
mod files;
mod generated;
mod outages;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::grid::GridObjects;

pub use change_nothing::ChangeNothing;
pub use data::{ChronicsData, InMemoryChronics};
pub use files::{CsvChronics, MultiFolder};
pub use generated::{GeneratedChronics, GenerationParams};
pub use outages::{hazard_duration, maintenance_duration, maintenance_time};

/// Everything a data feed provides for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInjection {
    pub load_p: Vec<f32>,
    pub load_q: Vec<f32>,
    pub prod_p: Vec<f32>,
    pub prod_v: Vec<f32>,
    /// Lines under maintenance at this step.
    pub maintenance: Vec<bool>,
    /// Lines tripping at this step.
    pub hazards: Vec<bool>,
    /// Steps until the next maintenance of each line (0 during, -1 if none).
    pub time_next_maintenance: Vec<i32>,
    /// Remaining (or upcoming) maintenance duration of each line.
    pub duration_next_maintenance: Vec<i32>,
    /// Remaining hazard duration of each line.
    pub hazard_duration: Vec<i32>,
}

#[derive(Debug, Error)]
pub enum ChronicsError {
    #[error("chronics were used before initialization")]
    NotInitialized,
    #[error("{what}: expected {expected} columns, got {got}")]
    WrongColumns {
        what: String,
        expected: usize,
        got: usize,
    },
    #[error("{what}: expected {expected} rows, got {got}")]
    WrongRows {
        what: String,
        expected: usize,
        got: usize,
    },
    #[error("{file}: unknown column \"{column}\"")]
    UnknownColumn { file: String, column: String },
    #[error("{what}: value at step {step} is not finite")]
    NotFinite { what: String, step: usize },
    #[error("chronics index {index} out of range ({available} available)")]
    UnknownChronics { index: usize, available: usize },
    #[error("no chronics found in {0}")]
    Empty(PathBuf),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

/// A source of per-step injections.
///
/// A feed may hold several chronics (scenarios); [`GridValue::set_chronics`]
/// and [`GridValue::next_chronics`] select one and rewind it.
pub trait GridValue: Send {
    /// Binds the feed to a grid, checking element counts and names.
    fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError>;

    /// Data for the next step, or `None` once the chronics is exhausted.
    fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError>;

    /// Number of steps in the current chronics, `None` if unbounded.
    fn max_timestep(&self) -> Option<usize>;

    /// Steps already served from the current chronics.
    fn current_step(&self) -> usize;

    fn done(&self) -> bool {
        self.max_timestep()
            .is_some_and(|max| self.current_step() >= max)
    }

    /// Identifier of the current chronics, used as episode directory name.
    fn chronics_id(&self) -> String;

    fn n_chronics(&self) -> usize {
        1
    }

    /// Selects a chronics by index and rewinds it.
    fn set_chronics(&mut self, index: usize) -> Result<(), ChronicsError>;

    /// Moves to the following chronics (cycling) and rewinds it.
    fn next_chronics(&mut self) -> Result<(), ChronicsError> {
        let next = (self.current_index() + 1) % self.n_chronics().max(1);
        self.set_chronics(next)
    }

    fn current_index(&self) -> usize {
        0
    }
}

/// Serializable recipe for a data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ChronicsSource {
    ChangeNothing {
        #[serde(default)]
        max_iter: Option<usize>,
    },
    Generated(GenerationParams),
    Csv {
        path: PathBuf,
    },
    MultiFolder {
        path: PathBuf,
    },
}

impl Default for ChronicsSource {
    fn default() -> Self {
        ChronicsSource::Generated(GenerationParams::default())
    }
}

impl ChronicsSource {
    /// Builds an uninitialized feed.
    pub fn build(&self) -> Box<dyn GridValue> {
        match self {
            ChronicsSource::ChangeNothing { max_iter } => Box::new(ChangeNothing::new(*max_iter)),
            ChronicsSource::Generated(params) => Box::new(GeneratedChronics::new(params.clone())),
            ChronicsSource::Csv { path } => Box::new(CsvChronics::new(path.clone())),
            ChronicsSource::MultiFolder { path } => Box::new(MultiFolder::new(path.clone())),
        }
    }
}
