//! Chronics stored on disk.

use std::fs;
use std::path::{Path, PathBuf};

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use super::data::{Cursor, ChronicsData, LOAD_P};
use super::{ChronicsError, GridValue, StepInjection};
use crate::grid::GridObjects;

/// One chronics directory holding `load_p.csv`, `load_q.csv`,
/// `prod_p.csv`, `prod_v.csv` and optionally `maintenance.csv` and
/// `hazards.csv`.
#[derive(Debug, Clone)]
pub struct CsvChronics {
    path: PathBuf,
    cursor: Option<Cursor>,
}

impl CsvChronics {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cursor: None }
    }
}

fn chronics_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl GridValue for CsvChronics {
    fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError> {
        debug!(path = %self.path.display(), "reading chronics");
        let data = ChronicsData::read_csv(&self.path, grid)?;
        self.cursor = Some(Cursor::new(data, grid)?);
        Ok(())
    }

    fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError> {
        let cursor = self.cursor.as_mut().ok_or(ChronicsError::NotInitialized)?;
        Ok(cursor.next())
    }

    fn max_timestep(&self) -> Option<usize> {
        self.cursor.as_ref().map(Cursor::n_steps)
    }

    fn current_step(&self) -> usize {
        self.cursor.as_ref().map_or(0, Cursor::step)
    }

    fn chronics_id(&self) -> String {
        chronics_name(&self.path)
    }

    fn set_chronics(&mut self, index: usize) -> Result<(), ChronicsError> {
        if index != 0 {
            return Err(ChronicsError::UnknownChronics {
                index,
                available: 1,
            });
        }
        if let Some(c) = self.cursor.as_mut() {
            c.rewind();
        }
        Ok(())
    }
}

/// A directory of chronics directories, served one after the other.
///
/// Subdirectories are taken in name order; [`MultiFolder::shuffle`] changes
/// the order in which [`GridValue::next_chronics`] visits them.
#[derive(Debug, Clone)]
pub struct MultiFolder {
    root: PathBuf,
    folders: Vec<PathBuf>,
    order: Vec<usize>,
    position: usize,
    grid: Option<GridObjects>,
    cursor: Option<Cursor>,
}

impl MultiFolder {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            folders: Vec::new(),
            order: Vec::new(),
            position: 0,
            grid: None,
            cursor: None,
        }
    }

    /// Chronics directories found under the root.
    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// Randomizes the visiting order and restarts from its first entry.
    pub fn shuffle(&mut self, seed: u64) -> Result<(), ChronicsError> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.order.shuffle(&mut rng);
        self.position = 0;
        if self.grid.is_some() {
            self.load_current()?;
        }
        Ok(())
    }

    fn scan(&mut self) -> Result<(), ChronicsError> {
        let io_err = |source| ChronicsError::Io {
            path: self.root.clone(),
            source,
        };
        let mut folders = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_dir() && path.join(LOAD_P).exists() {
                folders.push(path);
            }
        }
        if folders.is_empty() {
            return Err(ChronicsError::Empty(self.root.clone()));
        }
        folders.sort();
        self.order = (0..folders.len()).collect();
        self.folders = folders;
        Ok(())
    }

    fn load_current(&mut self) -> Result<(), ChronicsError> {
        let grid = self.grid.as_ref().ok_or(ChronicsError::NotInitialized)?;
        let folder = &self.folders[self.order[self.position]];
        debug!(path = %folder.display(), "switching chronics");
        let data = ChronicsData::read_csv(folder, grid)?;
        self.cursor = Some(Cursor::new(data, grid)?);
        Ok(())
    }
}

impl GridValue for MultiFolder {
    fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError> {
        if self.folders.is_empty() {
            self.scan()?;
        }
        self.grid = Some(grid.clone());
        self.load_current()
    }

    fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError> {
        let cursor = self.cursor.as_mut().ok_or(ChronicsError::NotInitialized)?;
        Ok(cursor.next())
    }

    fn max_timestep(&self) -> Option<usize> {
        self.cursor.as_ref().map(Cursor::n_steps)
    }

    fn current_step(&self) -> usize {
        self.cursor.as_ref().map_or(0, Cursor::step)
    }

    fn chronics_id(&self) -> String {
        self.cursor
            .as_ref()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| chronics_name(&self.root))
    }

    fn n_chronics(&self) -> usize {
        self.folders.len()
    }

    fn current_index(&self) -> usize {
        self.position
    }

    fn set_chronics(&mut self, index: usize) -> Result<(), ChronicsError> {
        if index >= self.folders.len() {
            return Err(ChronicsError::UnknownChronics {
                index,
                available: self.folders.len(),
            });
        }
        if index == self.position {
            if let Some(c) = self.cursor.as_mut() {
                c.rewind();
                return Ok(());
            }
        }
        self.position = index;
        self.load_current()
    }
}
