//! Files written by runs: per-step CSV summaries and episode logs.

pub mod episode;
pub mod export;

pub use episode::{EpisodeData, EpisodeError, EpisodeMeta, EpisodeTimes, EpisodeWriter};
