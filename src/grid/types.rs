//! Element records and errors shared by the grid description.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Primary energy source of a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenType {
    Solar,
    Wind,
    Hydro,
    Thermal,
    Nuclear,
}

impl GenType {
    /// Whether the unit follows a weather-driven profile.
    pub fn is_renewable(self) -> bool {
        matches!(self, GenType::Solar | GenType::Wind)
    }
}

impl fmt::Display for GenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GenType::Solar => "solar",
            GenType::Wind => "wind",
            GenType::Hydro => "hydro",
            GenType::Thermal => "thermal",
            GenType::Nuclear => "nuclear",
        };
        f.write_str(s)
    }
}

impl FromStr for GenType {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solar" => Ok(GenType::Solar),
            "wind" => Ok(GenType::Wind),
            "hydro" => Ok(GenType::Hydro),
            "thermal" => Ok(GenType::Thermal),
            "nuclear" => Ok(GenType::Nuclear),
            other => Err(GridError::InvalidGenerator {
                id: 0,
                reason: format!("unknown generator type \"{other}\""),
            }),
        }
    }
}

/// Static characteristics of one generator (MW, MW/step, steps, $).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorData {
    pub gen_type: GenType,
    pub pmin: f32,
    pub pmax: f32,
    pub redispatchable: bool,
    #[serde(default)]
    pub ramp_up: f32,
    #[serde(default)]
    pub ramp_down: f32,
    #[serde(default)]
    pub min_up_time: u32,
    #[serde(default)]
    pub min_down_time: u32,
    #[serde(default)]
    pub cost_per_mw: f32,
    #[serde(default)]
    pub startup_cost: f32,
    #[serde(default)]
    pub shutdown_cost: f32,
}

impl GeneratorData {
    /// A unit that follows its schedule and cannot be redispatched.
    pub fn fixed(gen_type: GenType, pmax: f32) -> Self {
        Self {
            gen_type,
            pmin: 0.0,
            pmax,
            redispatchable: false,
            ramp_up: 0.0,
            ramp_down: 0.0,
            min_up_time: 0,
            min_down_time: 0,
            cost_per_mw: 0.0,
            startup_cost: 0.0,
            shutdown_cost: 0.0,
        }
    }

    /// A controllable unit with symmetric ramps.
    pub fn dispatchable(gen_type: GenType, pmin: f32, pmax: f32, ramp: f32, cost_per_mw: f32) -> Self {
        Self {
            gen_type,
            pmin,
            pmax,
            redispatchable: true,
            ramp_up: ramp,
            ramp_down: ramp,
            min_up_time: 0,
            min_down_time: 0,
            cost_per_mw,
            startup_cost: 0.0,
            shutdown_cost: 0.0,
        }
    }

    fn numbers(&self) -> [(&'static str, f32); 7] {
        [
            ("pmin", self.pmin),
            ("pmax", self.pmax),
            ("ramp_up", self.ramp_up),
            ("ramp_down", self.ramp_down),
            ("cost_per_mw", self.cost_per_mw),
            ("startup_cost", self.startup_cost),
            ("shutdown_cost", self.shutdown_cost),
        ]
    }

    pub(crate) fn validate(&self, id: usize) -> Result<(), GridError> {
        let invalid = |reason: String| GridError::InvalidGenerator { id, reason };
        for (field, value) in self.numbers() {
            if !value.is_finite() {
                return Err(invalid(format!("{field} is not finite")));
            }
            if value < 0.0 {
                return Err(invalid(format!("{field} must be >= 0, got {value}")));
            }
        }
        if self.pmin > self.pmax {
            return Err(invalid(format!(
                "pmin ({}) is above pmax ({})",
                self.pmin, self.pmax
            )));
        }
        if self.redispatchable && self.ramp_up > self.pmax {
            return Err(invalid(format!(
                "ramp_up ({}) is above pmax ({})",
                self.ramp_up, self.pmax
            )));
        }
        Ok(())
    }
}

/// Static characteristics of one storage unit (MWh, MW).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageData {
    pub emax: f32,
    #[serde(default)]
    pub emin: f32,
    pub max_p_prod: f32,
    pub max_p_absorb: f32,
    #[serde(default = "unit_efficiency")]
    pub charging_efficiency: f32,
    #[serde(default = "unit_efficiency")]
    pub discharging_efficiency: f32,
    /// Constant self-discharge (MW).
    #[serde(default)]
    pub loss: f32,
}

fn unit_efficiency() -> f32 {
    1.0
}

impl StorageData {
    /// Energy the unit holds at the start of an episode.
    pub fn initial_charge(&self) -> f32 {
        0.5 * (self.emin + self.emax)
    }

    pub(crate) fn validate(&self, id: usize) -> Result<(), GridError> {
        let invalid = |reason: String| GridError::InvalidStorage { id, reason };
        let values = [
            ("emax", self.emax),
            ("emin", self.emin),
            ("max_p_prod", self.max_p_prod),
            ("max_p_absorb", self.max_p_absorb),
            ("charging_efficiency", self.charging_efficiency),
            ("discharging_efficiency", self.discharging_efficiency),
            ("loss", self.loss),
        ];
        for (field, value) in values {
            if !value.is_finite() {
                return Err(invalid(format!("{field} is not finite")));
            }
            if value < 0.0 {
                return Err(invalid(format!("{field} must be >= 0, got {value}")));
            }
        }
        if self.emax < self.emin {
            return Err(invalid(format!(
                "emax ({}) is below emin ({})",
                self.emax, self.emin
            )));
        }
        if self.discharging_efficiency <= 0.0 || self.discharging_efficiency > 1.0 {
            return Err(invalid("discharging_efficiency must be in (0, 1]".to_string()));
        }
        if self.charging_efficiency > 1.0 {
            return Err(invalid("charging_efficiency must be in [0, 1]".to_string()));
        }
        if self.loss > self.max_p_absorb {
            return Err(invalid(format!(
                "loss ({}) is above max_p_absorb ({})",
                self.loss, self.max_p_absorb
            )));
        }
        Ok(())
    }
}

/// Kind of element connected to a substation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Load,
    Generator,
    LineOr,
    LineEx,
    Storage,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectType::Load => "load",
            ObjectType::Generator => "generator",
            ObjectType::LineOr => "line (origin)",
            ObjectType::LineEx => "line (extremity)",
            ObjectType::Storage => "storage",
        };
        f.write_str(s)
    }
}

/// Element found at a given position of the topology vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopoObject {
    pub kind: ObjectType,
    pub id: usize,
    pub sub: usize,
}

/// Identifiers of every element attached to one substation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectedObjects {
    pub loads: Vec<usize>,
    pub generators: Vec<usize>,
    pub lines_or: Vec<usize>,
    pub lines_ex: Vec<usize>,
    pub storage: Vec<usize>,
    pub nb_elements: usize,
}

/// Reference set points used when no time series says otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NominalInjections {
    pub load_p: Vec<f32>,
    pub load_q: Vec<f32>,
    pub prod_p: Vec<f32>,
    pub prod_v: Vec<f32>,
}

/// Errors raised while building or querying a grid description.
#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("the grid must have at least one {0}")]
    Empty(&'static str),
    #[error("{kind} {id} is connected to substation {sub}, but the grid has {n_sub} substations")]
    SubstationOutOfRange {
        kind: ObjectType,
        id: usize,
        sub: usize,
        n_sub: usize,
    },
    #[error("{what}: expected {expected} entries, got {got}")]
    WrongLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("positions in substation must be given for every element kind or for none")]
    PartialPositions,
    #[error("{kind} {id} has position {pos} on substation {sub}, which only holds {size} elements")]
    PositionOutOfRange {
        kind: ObjectType,
        id: usize,
        sub: usize,
        pos: usize,
        size: usize,
    },
    #[error("two elements share position {0} of the topology vector")]
    DuplicatePosition(usize),
    #[error("generator {id}: {reason}")]
    InvalidGenerator { id: usize, reason: String },
    #[error("storage unit {id}: {reason}")]
    InvalidStorage { id: usize, reason: String },
    #[error("nominal injections: {0}")]
    InvalidNominal(String),
    #[error("substation {0} does not exist")]
    UnknownSubstation(usize),
    #[error("no {kind} found {detail}")]
    NotFound { kind: &'static str, detail: String },
    #[error("unknown {kind} name \"{name}\"")]
    UnknownName { kind: &'static str, name: String },
    #[error("invalid grid json: {0}")]
    Json(String),
}
