//! Text rendering of a grid layout and of one observation.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::grid::GridObjects;
use crate::sim::Observation;

const DEFAULT_WIDTH: usize = 60;
const DEFAULT_HEIGHT: usize = 20;

#[derive(Debug, Error, PartialEq)]
pub enum PlotError {
    #[error("unknown quantity \"{0}\", expected one of: {names}", names = PlotQuantity::ALL.join(", "))]
    UnknownQuantity(String),
    #[error("observation has {got} {what}, grid has {expected}")]
    Shape {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Value displayed next to each element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotQuantity {
    GenP,
    GenV,
    LoadP,
    LoadQ,
    LineStatus,
    /// Actual dispatch, with the target alongside.
    Dispatch,
    StorageCharge,
    /// Bus of every element end.
    Topology,
}

impl PlotQuantity {
    pub const ALL: &'static [&'static str] = &[
        "gen_p",
        "gen_v",
        "load_p",
        "load_q",
        "line_status",
        "dispatch",
        "storage_charge",
        "topology",
    ];

    fn unit(self) -> &'static str {
        match self {
            PlotQuantity::GenP | PlotQuantity::LoadP | PlotQuantity::Dispatch => "MW",
            PlotQuantity::GenV => "kV",
            PlotQuantity::LoadQ => "MVAr",
            PlotQuantity::StorageCharge => "MWh",
            PlotQuantity::LineStatus | PlotQuantity::Topology => "",
        }
    }
}

impl FromStr for PlotQuantity {
    type Err = PlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gen_p" => Ok(PlotQuantity::GenP),
            "gen_v" => Ok(PlotQuantity::GenV),
            "load_p" => Ok(PlotQuantity::LoadP),
            "load_q" => Ok(PlotQuantity::LoadQ),
            "line_status" => Ok(PlotQuantity::LineStatus),
            "dispatch" => Ok(PlotQuantity::Dispatch),
            "storage_charge" => Ok(PlotQuantity::StorageCharge),
            "topology" => Ok(PlotQuantity::Topology),
            other => Err(PlotError::UnknownQuantity(other.to_string())),
        }
    }
}

impl fmt::Display for PlotQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let i = match self {
            PlotQuantity::GenP => 0,
            PlotQuantity::GenV => 1,
            PlotQuantity::LoadP => 2,
            PlotQuantity::LoadQ => 3,
            PlotQuantity::LineStatus => 4,
            PlotQuantity::Dispatch => 5,
            PlotQuantity::StorageCharge => 6,
            PlotQuantity::Topology => 7,
        };
        f.write_str(Self::ALL[i])
    }
}

/// Substation coordinates, indexed by substation id.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    positions: Vec<(f32, f32)>,
}

impl Layout {
    /// Coordinates stored with the grid, or a circle when the grid has none
    /// or misses a substation.
    pub fn from_grid(grid: &GridObjects) -> Self {
        let stored = grid.layout().and_then(|coords| {
            grid.name_sub()
                .iter()
                .map(|name| coords.get(name).copied())
                .collect::<Option<Vec<_>>>()
        });
        match stored {
            Some(positions) => Self { positions },
            None => Self::circle(grid.n_sub()),
        }
    }

    /// `n_sub` points evenly spread on the unit circle, first one on top.
    pub fn circle(n_sub: usize) -> Self {
        let positions = (0..n_sub)
            .map(|i| {
                let angle = std::f32::consts::FRAC_PI_2
                    - std::f32::consts::TAU * i as f32 / n_sub.max(1) as f32;
                (angle.cos(), angle.sin())
            })
            .collect();
        Self { positions }
    }

    pub fn position(&self, sub: usize) -> Option<(f32, f32)> {
        self.positions.get(sub).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// `((x_min, x_max), (y_min, y_max))`.
    pub fn bounds(&self) -> ((f32, f32), (f32, f32)) {
        let (mut x, mut y) = ((f32::INFINITY, f32::NEG_INFINITY), (f32::INFINITY, f32::NEG_INFINITY));
        for &(px, py) in &self.positions {
            x = (x.0.min(px), x.1.max(px));
            y = (y.0.min(py), y.1.max(py));
        }
        (x, y)
    }
}

/// One labelled value of a [`Snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub name: String,
    pub sub: usize,
    pub value: f32,
    /// Target dispatch, for [`PlotQuantity::Dispatch`].
    pub target: Option<f32>,
}

/// Values of one quantity at one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub step: usize,
    pub quantity: PlotQuantity,
    pub entries: Vec<SnapshotEntry>,
    /// Status of every line, for drawing.
    pub line_status: Vec<bool>,
}

fn check(what: &'static str, expected: usize, got: usize) -> Result<(), PlotError> {
    if expected == got {
        Ok(())
    } else {
        Err(PlotError::Shape { what, expected, got })
    }
}

impl Snapshot {
    pub fn new(grid: &GridObjects, obs: &Observation, quantity: PlotQuantity) -> Result<Self, PlotError> {
        check("generators", grid.n_gen(), obs.gen_p.len())?;
        check("loads", grid.n_load(), obs.load_p.len())?;
        check("lines", grid.n_line(), obs.line_status.len())?;
        check("storage units", grid.n_storage(), obs.storage_charge.len())?;
        check("topology positions", grid.dim_topo(), obs.topo_vect.len())?;

        let entries_of = |names: &[String], subs: &[usize], values: &[f32]| -> Vec<SnapshotEntry> {
            names
                .iter()
                .zip(subs)
                .zip(values)
                .map(|((name, &sub), &value)| SnapshotEntry {
                    name: name.clone(),
                    sub,
                    value,
                    target: None,
                })
                .collect()
        };

        let entries = match quantity {
            PlotQuantity::GenP => entries_of(grid.name_gen(), grid.gen_to_subid(), &obs.gen_p),
            PlotQuantity::GenV => entries_of(grid.name_gen(), grid.gen_to_subid(), &obs.gen_v),
            PlotQuantity::LoadP => entries_of(grid.name_load(), grid.load_to_subid(), &obs.load_p),
            PlotQuantity::LoadQ => entries_of(grid.name_load(), grid.load_to_subid(), &obs.load_q),
            PlotQuantity::StorageCharge => {
                entries_of(grid.name_storage(), grid.storage_to_subid(), &obs.storage_charge)
            }
            PlotQuantity::LineStatus => {
                let status: Vec<f32> = obs
                    .line_status
                    .iter()
                    .map(|&s| if s { 1.0 } else { 0.0 })
                    .collect();
                entries_of(grid.name_line(), grid.line_or_to_subid(), &status)
            }
            PlotQuantity::Dispatch => {
                let mut entries =
                    entries_of(grid.name_gen(), grid.gen_to_subid(), &obs.actual_dispatch);
                for (e, &t) in entries.iter_mut().zip(&obs.target_dispatch) {
                    e.target = Some(t);
                }
                entries
            }
            PlotQuantity::Topology => (0..grid.dim_topo())
                .filter_map(|pos| {
                    let object = grid.object_at(pos)?;
                    let name = &grid.names(object.kind)[object.id];
                    Some(SnapshotEntry {
                        name: format!("{name} ({})", object.kind),
                        sub: object.sub,
                        value: obs.topo_vect[pos] as f32,
                        target: None,
                    })
                })
                .collect(),
        };

        Ok(Self {
            step: obs.step,
            quantity,
            entries,
            line_status: obs.line_status.clone(),
        })
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- {} at step {} ---", self.quantity, self.step)?;
        if self.entries.is_empty() {
            return writeln!(f, "(no element)");
        }
        let unit = self.quantity.unit();
        for e in &self.entries {
            write!(f, "sub {:>3} | {:<28} ", e.sub, e.name)?;
            match self.quantity {
                PlotQuantity::LineStatus => {
                    let state = if e.value > 0.5 { "connected" } else { "disconnected" };
                    writeln!(f, "{state}")?;
                }
                PlotQuantity::Topology => {
                    let bus = e.value as i32;
                    if bus < 0 {
                        writeln!(f, "disconnected")?;
                    } else {
                        writeln!(f, "bus {bus}")?;
                    }
                }
                _ => match e.target {
                    Some(target) => writeln!(f, "{:>9.2} {unit} (target {:.2})", e.value, target)?,
                    None => writeln!(f, "{:>9.2} {unit}", e.value)?,
                },
            }
        }
        Ok(())
    }
}

/// Character canvas with substations as their ids and lines as dots.
/// Disconnected lines show a single `x` at their middle.
fn draw(grid: &GridObjects, layout: &Layout, line_status: Option<&[bool]>, width: usize, height: usize) -> String {
    let (width, height) = (width.max(2), height.max(2));
    let mut canvas = vec![vec![' '; width]; height];
    let ((x0, x1), (y0, y1)) = layout.bounds();
    let scale = |lo: f32, hi: f32, v: f32, cells: usize| -> f32 {
        if hi - lo <= f32::EPSILON {
            (cells - 1) as f32 / 2.0
        } else {
            (v - lo) / (hi - lo) * (cells - 1) as f32
        }
    };
    let cell = |sub: usize| -> Option<(f32, f32)> {
        let (x, y) = layout.position(sub)?;
        let col = scale(x0, x1, x, width);
        let row = (height - 1) as f32 - scale(y0, y1, y, height);
        Some((col, row))
    };

    let ends = |line: usize| Some((cell(grid.line_or_to_subid()[line])?, cell(grid.line_ex_to_subid()[line])?));
    let connected = |line: usize| line_status.is_none_or(|s| s.get(line).copied().unwrap_or(true));

    for line in (0..grid.n_line()).filter(|&l| connected(l)) {
        let Some((a, b)) = ends(line) else {
            continue;
        };
        let n = (b.0 - a.0).abs().max((b.1 - a.1).abs()).ceil() as usize;
        for k in 0..=n {
            let t = if n == 0 { 0.0 } else { k as f32 / n as f32 };
            let col = (a.0 + (b.0 - a.0) * t).round() as usize;
            let row = (a.1 + (b.1 - a.1) * t).round() as usize;
            canvas[row.min(height - 1)][col.min(width - 1)] = '.';
        }
    }
    for line in (0..grid.n_line()).filter(|&l| !connected(l)) {
        let Some((a, b)) = ends(line) else {
            continue;
        };
        let col = ((a.0 + b.0) / 2.0).round() as usize;
        let row = ((a.1 + b.1) / 2.0).round() as usize;
        canvas[row.min(height - 1)][col.min(width - 1)] = 'x';
    }

    for sub in 0..grid.n_sub() {
        let Some((col, row)) = cell(sub) else {
            continue;
        };
        let (row, col) = ((row.round() as usize).min(height - 1), col.round() as usize);
        for (k, c) in sub.to_string().chars().enumerate() {
            if let Some(slot) = canvas[row].get_mut(col + k) {
                *slot = c;
            }
        }
    }

    let mut out = String::new();
    for row in canvas {
        let line: String = row.into_iter().collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Draws the grid and lists its substations with what they host.
pub fn render_layout(grid: &GridObjects, layout: &Layout) -> String {
    let mut out = format!("--- {} ---\n", grid.name());
    out.push_str(&draw(grid, layout, None, DEFAULT_WIDTH, DEFAULT_HEIGHT));
    for sub in 0..grid.n_sub() {
        let Ok(c) = grid.connected_to(sub) else {
            continue;
        };
        out.push_str(&format!(
            "{:>3} {:<12} loads={} gens={} lines={} storage={}\n",
            sub,
            grid.name_sub()[sub],
            c.loads.len(),
            c.generators.len(),
            c.lines_or.len() + c.lines_ex.len(),
            c.storage.len(),
        ));
    }
    out
}

/// Draws the grid at one step, then lists the chosen quantity.
pub fn render_snapshot(
    grid: &GridObjects,
    layout: &Layout,
    obs: &Observation,
    quantity: PlotQuantity,
) -> Result<String, PlotError> {
    let snapshot = Snapshot::new(grid, obs, quantity)?;
    let mut out = draw(grid, layout, Some(&snapshot.line_status), DEFAULT_WIDTH, DEFAULT_HEIGHT);
    out.push_str(&snapshot.to_string());
    Ok(out)
}
