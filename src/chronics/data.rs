//! In-memory chronics and their `;`-separated CSV layout.

use std::fs;
use std::path::Path;

use super::outages::{by_line, hazard_duration, maintenance_duration, maintenance_time};
use super::{ChronicsError, GridValue, StepInjection};
use crate::grid::GridObjects;

pub(crate) const LOAD_P: &str = "load_p.csv";
pub(crate) const LOAD_Q: &str = "load_q.csv";
pub(crate) const PROD_P: &str = "prod_p.csv";
pub(crate) const PROD_V: &str = "prod_v.csv";
pub(crate) const MAINTENANCE: &str = "maintenance.csv";
pub(crate) const HAZARDS: &str = "hazards.csv";

/// Complete time series of one chronics, indexed `[step][element]`.
///
/// Empty `maintenance` / `hazards` mean no event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChronicsData {
    pub name: String,
    pub load_p: Vec<Vec<f32>>,
    pub load_q: Vec<Vec<f32>>,
    pub prod_p: Vec<Vec<f32>>,
    pub prod_v: Vec<Vec<f32>>,
    pub maintenance: Vec<Vec<bool>>,
    pub hazards: Vec<Vec<bool>>,
}

impl ChronicsData {
    /// Chronics holding the grid's nominal injections for `n_steps` steps.
    pub fn constant(grid: &GridObjects, n_steps: usize) -> Self {
        let n = grid.nominal();
        Self {
            name: "constant".to_string(),
            load_p: vec![n.load_p.clone(); n_steps],
            load_q: vec![n.load_q.clone(); n_steps],
            prod_p: vec![n.prod_p.clone(); n_steps],
            prod_v: vec![n.prod_v.clone(); n_steps],
            maintenance: Vec::new(),
            hazards: Vec::new(),
        }
    }

    pub fn n_steps(&self) -> usize {
        self.load_p.len()
    }

    /// Checks every matrix against the grid's element counts.
    pub fn check_validity(&self, grid: &GridObjects) -> Result<(), ChronicsError> {
        let n = self.n_steps();
        let floats = [
            ("load_p", &self.load_p, grid.n_load()),
            ("load_q", &self.load_q, grid.n_load()),
            ("prod_p", &self.prod_p, grid.n_gen()),
            ("prod_v", &self.prod_v, grid.n_gen()),
        ];
        for (what, matrix, width) in floats {
            check_shape(what, matrix, n, width)?;
            for (step, row) in matrix.iter().enumerate() {
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(ChronicsError::NotFinite {
                        what: what.to_string(),
                        step,
                    });
                }
            }
        }
        for (what, matrix) in [("maintenance", &self.maintenance), ("hazards", &self.hazards)] {
            if !matrix.is_empty() {
                check_shape(what, matrix, n, grid.n_line())?;
            }
        }
        Ok(())
    }

    /// Reads a chronics directory, reordering columns to the grid's order.
    pub fn read_csv(dir: &Path, grid: &GridObjects) -> Result<Self, ChronicsError> {
        let load_p = read_matrix(&dir.join(LOAD_P), grid.name_load())?;
        let load_q = read_matrix(&dir.join(LOAD_Q), grid.name_load())?;
        let prod_p = read_matrix(&dir.join(PROD_P), grid.name_gen())?;
        let prod_v = read_matrix(&dir.join(PROD_V), grid.name_gen())?;
        let events = |file: &str| -> Result<Vec<Vec<bool>>, ChronicsError> {
            let path = dir.join(file);
            if !path.exists() {
                return Ok(Vec::new());
            }
            let m = read_matrix(&path, grid.name_line())?;
            Ok(m.into_iter()
                .map(|row| row.into_iter().map(|v| v != 0.0).collect())
                .collect())
        };
        let data = Self {
            name: dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            load_p,
            load_q,
            prod_p,
            prod_v,
            maintenance: events(MAINTENANCE)?,
            hazards: events(HAZARDS)?,
        };
        data.check_validity(grid)?;
        Ok(data)
    }

    /// Writes the chronics in the layout [`ChronicsData::read_csv`] reads.
    pub fn write_csv(&self, dir: &Path, grid: &GridObjects) -> Result<(), ChronicsError> {
        fs::create_dir_all(dir).map_err(|source| ChronicsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        write_matrix(&dir.join(LOAD_P), grid.name_load(), &self.load_p, |v| format!("{v}"))?;
        write_matrix(&dir.join(LOAD_Q), grid.name_load(), &self.load_q, |v| format!("{v}"))?;
        write_matrix(&dir.join(PROD_P), grid.name_gen(), &self.prod_p, |v| format!("{v}"))?;
        write_matrix(&dir.join(PROD_V), grid.name_gen(), &self.prod_v, |v| format!("{v}"))?;
        let flag = |v: &bool| if *v { "1".to_string() } else { "0".to_string() };
        if !self.maintenance.is_empty() {
            write_matrix(&dir.join(MAINTENANCE), grid.name_line(), &self.maintenance, flag)?;
        }
        if !self.hazards.is_empty() {
            write_matrix(&dir.join(HAZARDS), grid.name_line(), &self.hazards, flag)?;
        }
        Ok(())
    }
}

fn check_shape<T>(what: &str, matrix: &[Vec<T>], rows: usize, width: usize) -> Result<(), ChronicsError> {
    if matrix.len() != rows {
        return Err(ChronicsError::WrongRows {
            what: what.to_string(),
            expected: rows,
            got: matrix.len(),
        });
    }
    if let Some(row) = matrix.iter().find(|r| r.len() != width) {
        return Err(ChronicsError::WrongColumns {
            what: what.to_string(),
            expected: width,
            got: row.len(),
        });
    }
    Ok(())
}

fn read_matrix(path: &Path, names: &[String]) -> Result<Vec<Vec<f32>>, ChronicsError> {
    let csv_err = |source| ChronicsError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path.display().to_string();
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(csv_err)?;
    let headers = rdr.headers().map_err(csv_err)?.clone();
    if headers.len() != names.len() {
        return Err(ChronicsError::WrongColumns {
            what: file_name,
            expected: names.len(),
            got: headers.len(),
        });
    }
    // column i of the file holds element order[i] of the grid
    let mut order = Vec::with_capacity(headers.len());
    for h in headers.iter() {
        let id = names
            .iter()
            .position(|n| n == h.trim())
            .ok_or_else(|| ChronicsError::UnknownColumn {
                file: file_name.clone(),
                column: h.to_string(),
            })?;
        order.push(id);
    }

    let mut rows = Vec::new();
    for (step, record) in rdr.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let mut row = vec![0.0_f32; names.len()];
        for (col, field) in record.iter().enumerate() {
            let value: f32 = field.trim().parse().map_err(|_| ChronicsError::NotFinite {
                what: file_name.clone(),
                step,
            })?;
            if let Some(&id) = order.get(col) {
                row[id] = value;
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

fn write_matrix<T>(
    path: &Path,
    names: &[String],
    rows: &[Vec<T>],
    fmt: impl Fn(&T) -> String,
) -> Result<(), ChronicsError> {
    let csv_err = |source| ChronicsError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(csv_err)?;
    wtr.write_record(names).map_err(csv_err)?;
    for row in rows {
        wtr.write_record(row.iter().map(&fmt)).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| ChronicsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Position in a [`ChronicsData`], with the outage schedules derived once.
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    data: ChronicsData,
    step: usize,
    time_next_maintenance: Vec<Vec<i32>>,
    duration_next_maintenance: Vec<Vec<i32>>,
    hazard_duration: Vec<Vec<i32>>,
    n_line: usize,
}

impl Cursor {
    pub(crate) fn new(data: ChronicsData, grid: &GridObjects) -> Result<Self, ChronicsError> {
        data.check_validity(grid)?;
        let n_line = grid.n_line();
        Ok(Self {
            time_next_maintenance: by_line(&data.maintenance, n_line, maintenance_time),
            duration_next_maintenance: by_line(&data.maintenance, n_line, maintenance_duration),
            hazard_duration: by_line(&data.hazards, n_line, hazard_duration),
            data,
            step: 0,
            n_line,
        })
    }

    pub(crate) fn rewind(&mut self) {
        self.step = 0;
    }

    pub(crate) fn step(&self) -> usize {
        self.step
    }

    pub(crate) fn n_steps(&self) -> usize {
        self.data.n_steps()
    }

    pub(crate) fn name(&self) -> &str {
        &self.data.name
    }

    pub(crate) fn next(&mut self) -> Option<StepInjection> {
        let t = self.step;
        if t >= self.data.n_steps() {
            return None;
        }
        self.step += 1;
        let events = |m: &Vec<Vec<bool>>| m.get(t).cloned().unwrap_or_else(|| vec![false; self.n_line]);
        let durations = |m: &Vec<Vec<i32>>, none: i32| {
            m.get(t).cloned().unwrap_or_else(|| vec![none; self.n_line])
        };
        Some(StepInjection {
            load_p: self.data.load_p[t].clone(),
            load_q: self.data.load_q[t].clone(),
            prod_p: self.data.prod_p[t].clone(),
            prod_v: self.data.prod_v[t].clone(),
            maintenance: events(&self.data.maintenance),
            hazards: events(&self.data.hazards),
            time_next_maintenance: durations(&self.time_next_maintenance, -1),
            duration_next_maintenance: durations(&self.duration_next_maintenance, 0),
            hazard_duration: durations(&self.hazard_duration, 0),
        })
    }
}

/// Replays a single [`ChronicsData`].
#[derive(Debug, Clone)]
pub struct InMemoryChronics {
    data: ChronicsData,
    cursor: Option<Cursor>,
}

impl InMemoryChronics {
    pub fn new(data: ChronicsData) -> Self {
        Self { data, cursor: None }
    }
}

impl GridValue for InMemoryChronics {
    fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError> {
        self.cursor = Some(Cursor::new(self.data.clone(), grid)?);
        Ok(())
    }

    fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError> {
        let cursor = self.cursor.as_mut().ok_or(ChronicsError::NotInitialized)?;
        Ok(cursor.next())
    }

    fn max_timestep(&self) -> Option<usize> {
        Some(self.data.n_steps())
    }

    fn current_step(&self) -> usize {
        self.cursor.as_ref().map_or(0, Cursor::step)
    }

    fn chronics_id(&self) -> String {
        self.data.name.clone()
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::presets;

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("grid_sim_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn replays_every_step_then_stops() {
        let grid = presets::case5().unwrap();
        let mut chronics = InMemoryChronics::new(ChronicsData::constant(&grid, 3));
        assert!(chronics.load_next().is_err());
        chronics.initialize(&grid).unwrap();
        for _ in 0..3 {
            assert!(chronics.load_next().unwrap().is_some());
        }
        assert!(chronics.done());
        assert!(chronics.load_next().unwrap().is_none());
        chronics.set_chronics(0).unwrap();
        assert_eq!(chronics.current_step(), 0);
        assert!(chronics.set_chronics(1).is_err());
    }

    #[test]
    fn maintenance_schedule_is_served() {
        let grid = presets::case5().unwrap();
        let mut data = ChronicsData::constant(&grid, 4);
        data.maintenance = vec![vec![false; grid.n_line()]; 4];
        data.maintenance[2][1] = true;
        let mut chronics = InMemoryChronics::new(data);
        chronics.initialize(&grid).unwrap();
        let first = chronics.load_next().unwrap().unwrap();
        assert_eq!(first.time_next_maintenance[1], 2);
        assert_eq!(first.duration_next_maintenance[1], 1);
        assert_eq!(first.time_next_maintenance[0], -1);
        chronics.load_next().unwrap();
        let third = chronics.load_next().unwrap().unwrap();
        assert!(third.maintenance[1]);
        assert_eq!(third.time_next_maintenance[1], 0);
    }

    #[test]
    fn rejects_wrong_shapes() {
        let grid = presets::case5().unwrap();
        let mut data = ChronicsData::constant(&grid, 2);
        data.prod_p[1].pop();
        assert!(matches!(
            data.check_validity(&grid),
            Err(ChronicsError::WrongColumns { .. })
        ));
        let mut data = ChronicsData::constant(&grid, 2);
        data.load_q.pop();
        assert!(matches!(data.check_validity(&grid), Err(ChronicsError::WrongRows { .. })));
        let mut data = ChronicsData::constant(&grid, 2);
        data.load_p[0][0] = f32::NAN;
        assert!(matches!(data.check_validity(&grid), Err(ChronicsError::NotFinite { .. })));
    }

    #[test]
    fn csv_round_trip() {
        let grid = presets::case14().unwrap();
        let mut data = ChronicsData::constant(&grid, 5);
        data.name = "csv_round_trip".to_string();
        data.load_p[3][2] = 51.25;
        data.hazards = vec![vec![false; grid.n_line()]; 5];
        data.hazards[4][7] = true;
        let dir = temp_dir("csv_round_trip").join("csv_round_trip");
        data.write_csv(&dir, &grid).unwrap();
        let back = ChronicsData::read_csv(&dir, &grid).unwrap();
        assert_eq!(back, ChronicsData {
            maintenance: Vec::new(),
            ..data
        });
        let _ = fs::remove_dir_all(dir.parent().unwrap());
    }

    #[test]
    fn csv_columns_are_matched_by_name() {
        let grid = presets::case5().unwrap();
        let dir = temp_dir("csv_columns");
        fs::create_dir_all(&dir).unwrap();
        let names = grid.name_load();
        fs::write(
            dir.join(LOAD_P),
            format!("{};{};{}\n1;2;3\n", names[2], names[0], names[1]),
        )
        .unwrap();
        let m = read_matrix(&dir.join(LOAD_P), names).unwrap();
        assert_eq!(m, vec![vec![2.0, 3.0, 1.0]]);

        fs::write(dir.join(LOAD_Q), "bogus;x;y\n1;2;3\n").unwrap();
        assert!(matches!(
            read_matrix(&dir.join(LOAD_Q), names),
            Err(ChronicsError::UnknownColumn { .. })
        ));
        let _ = fs::remove_dir_all(dir);
    }
}
