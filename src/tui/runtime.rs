//! Replay state of a logged episode.

use std::collections::VecDeque;
use std::time::Instant;

use crate::io::EpisodeData;
use crate::plot::{Layout, PlotQuantity, Snapshot};
use crate::sim::{Observation, StepRecord};

/// Maximum number of records kept for the rolling chart.
const MAX_HISTORY: usize = 200;

/// Tick interval options in milliseconds (slowest → fastest).
const SPEED_LEVELS_MS: [u64; 6] = [500, 250, 100, 50, 20, 5];

/// Default speed index (100 ms).
const DEFAULT_SPEED_IDX: usize = 2;

const QUANTITIES: [PlotQuantity; 8] = [
    PlotQuantity::GenP,
    PlotQuantity::LoadP,
    PlotQuantity::Dispatch,
    PlotQuantity::LineStatus,
    PlotQuantity::StorageCharge,
    PlotQuantity::GenV,
    PlotQuantity::LoadQ,
    PlotQuantity::Topology,
];

/// TUI application state.
pub struct App {
    data: EpisodeData,
    records: Vec<StepRecord>,
    pub layout: Layout,
    /// Rolling window of replayed records for the chart.
    pub history: VecDeque<StepRecord>,
    /// Steps replayed so far; the grid shows `observations[step]`.
    pub step: usize,
    pub paused: bool,
    /// Current index into `SPEED_LEVELS_MS`.
    pub speed_idx: usize,
    quantity_idx: usize,
    pub quit: bool,
    /// When the last replay tick was executed.
    pub last_tick: Instant,
}

impl App {
    pub fn new(data: EpisodeData) -> Self {
        let records = data.records();
        let layout = Layout::from_grid(data.grid());
        Self {
            data,
            records,
            layout,
            history: VecDeque::with_capacity(MAX_HISTORY),
            step: 0,
            paused: false,
            speed_idx: DEFAULT_SPEED_IDX,
            quantity_idx: 0,
            quit: false,
            last_tick: Instant::now(),
        }
    }

    pub fn data(&self) -> &EpisodeData {
        &self.data
    }

    pub fn total_steps(&self) -> usize {
        self.records.len()
    }

    /// Replays one more step if not finished.
    pub fn tick(&mut self) {
        let Some(record) = self.records.get(self.step) else {
            return;
        };
        if self.history.len() >= MAX_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(record.clone());
        self.step += 1;
    }

    /// Goes back one step and pauses.
    pub fn step_back(&mut self) {
        self.paused = true;
        if self.step == 0 {
            return;
        }
        self.step -= 1;
        self.history.pop_back();
        if self.history.is_empty() && self.step > 0 {
            self.refill_history();
        }
    }

    /// Goes forward one step and pauses.
    pub fn step_forward(&mut self) {
        self.paused = true;
        self.tick();
    }

    fn refill_history(&mut self) {
        let start = self.step.saturating_sub(MAX_HISTORY);
        self.history = self.records[start..self.step].iter().cloned().collect();
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    /// Increases replay speed (shorter tick interval).
    pub fn speed_up(&mut self) {
        if self.speed_idx + 1 < SPEED_LEVELS_MS.len() {
            self.speed_idx += 1;
        }
    }

    /// Decreases replay speed (longer tick interval).
    pub fn speed_down(&mut self) {
        if self.speed_idx > 0 {
            self.speed_idx -= 1;
        }
    }

    pub fn tick_interval_ms(&self) -> u64 {
        SPEED_LEVELS_MS[self.speed_idx]
    }

    pub fn quantity(&self) -> PlotQuantity {
        QUANTITIES[self.quantity_idx]
    }

    pub fn next_quantity(&mut self) {
        self.quantity_idx = (self.quantity_idx + 1) % QUANTITIES.len();
    }

    /// Replays from the initial observation.
    pub fn restart(&mut self) {
        self.history.clear();
        self.step = 0;
        self.paused = false;
    }

    pub fn is_finished(&self) -> bool {
        self.step >= self.records.len()
    }

    pub fn last_record(&self) -> Option<&StepRecord> {
        self.history.back()
    }

    /// Observation shown at the current step.
    pub fn observation(&self) -> Option<&Observation> {
        self.data.observations().get(self.step)
    }

    /// Values of the selected quantity at the current step.
    pub fn snapshot(&self) -> Option<Snapshot> {
        Snapshot::new(self.data.grid(), self.observation()?, self.quantity()).ok()
    }
}
