//! The action object shared by agents and the environment.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::ActionError;
use crate::grid::GridObjects;

/// Which categories of an action carry a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modified {
    pub injection: bool,
    pub set_bus: bool,
    pub change_bus: bool,
    pub set_status: bool,
    pub change_status: bool,
    pub redispatch: bool,
    pub storage: bool,
    pub hazards: bool,
    pub maintenance: bool,
}

impl Modified {
    pub fn any(&self) -> bool {
        self.injection
            || self.set_bus
            || self.change_bus
            || self.set_status
            || self.change_status
            || self.redispatch
            || self.storage
            || self.hazards
            || self.maintenance
    }

    pub(super) fn merge(&mut self, other: &Modified) {
        self.injection |= other.injection;
        self.set_bus |= other.set_bus;
        self.change_bus |= other.change_bus;
        self.set_status |= other.set_status;
        self.change_status |= other.change_status;
        self.redispatch |= other.redispatch;
        self.storage |= other.storage;
        self.hazards |= other.hazards;
        self.maintenance |= other.maintenance;
    }
}

/// New injection values. `None` leaves the quantity untouched; inside a
/// vector, NaN leaves that element untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Injection {
    pub load_p: Option<Vec<f32>>,
    pub load_q: Option<Vec<f32>>,
    pub prod_p: Option<Vec<f32>>,
    pub prod_v: Option<Vec<f32>>,
}

impl Injection {
    pub fn is_empty(&self) -> bool {
        self.entries().iter().all(|(_, v)| v.is_none())
    }

    pub(super) fn entries(&self) -> [(&'static str, Option<&Vec<f32>>); 4] {
        [
            ("load_p", self.load_p.as_ref()),
            ("load_q", self.load_q.as_ref()),
            ("prod_p", self.prod_p.as_ref()),
            ("prod_v", self.prod_v.as_ref()),
        ]
    }

    pub(super) fn slot_mut(&mut self, key: &str) -> Option<&mut Option<Vec<f32>>> {
        match key {
            "load_p" => Some(&mut self.load_p),
            "load_q" => Some(&mut self.load_q),
            "prod_p" => Some(&mut self.prod_p),
            "prod_v" => Some(&mut self.prod_v),
            _ => None,
        }
    }
}

/// A request to modify the grid for one step.
///
/// Built from an [`ActionUpdate`](super::ActionUpdate) through
/// [`BaseAction::update`] or an [`ActionSpace`](super::ActionSpace). Bus
/// values follow the topology vector convention: `-1` disconnects, `0`
/// leaves untouched, `1`/`2` assign a busbar. Storage power uses the load
/// convention (positive absorbs).
#[derive(Debug, Clone)]
pub struct BaseAction {
    pub(super) grid: Arc<GridObjects>,
    pub(super) injection: Injection,
    pub(super) set_line_status: Vec<i32>,
    pub(super) switch_line_status: Vec<bool>,
    pub(super) set_topo_vect: Vec<i32>,
    pub(super) change_bus: Vec<bool>,
    pub(super) hazards: Vec<bool>,
    pub(super) maintenance: Vec<bool>,
    pub(super) redispatch: Vec<f32>,
    pub(super) storage_power: Vec<f32>,
    pub(super) modified: Modified,
    pub(super) single_act: bool,
}

/// One element an action may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef {
    Load(usize),
    Generator(usize),
    Line(usize),
    Storage(usize),
    Substation(usize),
}

/// What an action does to a single element.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Load {
        new_p: f32,
        new_q: f32,
        set_bus: i32,
        change_bus: bool,
    },
    Generator {
        new_p: f32,
        new_v: f32,
        set_bus: i32,
        change_bus: bool,
        redispatch: f32,
    },
    Line {
        set_bus_or: i32,
        set_bus_ex: i32,
        change_bus_or: bool,
        change_bus_ex: bool,
        set_line_status: i32,
        change_line_status: bool,
    },
    Storage {
        power: f32,
        set_bus: i32,
        change_bus: bool,
    },
    Substation {
        set_bus: Vec<i32>,
        change_bus: Vec<bool>,
    },
}

impl BaseAction {
    /// An action that does nothing on `grid`.
    pub fn new(grid: Arc<GridObjects>) -> Self {
        let n_line = grid.n_line();
        let dim_topo = grid.dim_topo();
        let n_gen = grid.n_gen();
        let n_storage = grid.n_storage();
        Self {
            grid,
            injection: Injection::default(),
            set_line_status: vec![0; n_line],
            switch_line_status: vec![false; n_line],
            set_topo_vect: vec![0; dim_topo],
            change_bus: vec![false; dim_topo],
            hazards: vec![false; n_line],
            maintenance: vec![false; n_line],
            redispatch: vec![0.0; n_gen],
            storage_power: vec![0.0; n_storage],
            modified: Modified::default(),
            single_act: true,
        }
    }

    /// Returns the action to "do nothing", keeping the grid.
    pub fn reset(&mut self) {
        *self = Self::new(Arc::clone(&self.grid));
    }

    pub fn grid(&self) -> &Arc<GridObjects> {
        &self.grid
    }

    pub fn injection(&self) -> &Injection {
        &self.injection
    }

    pub fn set_line_status(&self) -> &[i32] {
        &self.set_line_status
    }

    pub fn switch_line_status(&self) -> &[bool] {
        &self.switch_line_status
    }

    pub fn set_topo_vect(&self) -> &[i32] {
        &self.set_topo_vect
    }

    pub fn change_bus(&self) -> &[bool] {
        &self.change_bus
    }

    pub fn hazards(&self) -> &[bool] {
        &self.hazards
    }

    pub fn maintenance(&self) -> &[bool] {
        &self.maintenance
    }

    pub fn redispatch(&self) -> &[f32] {
        &self.redispatch
    }

    pub fn storage_power(&self) -> &[f32] {
        &self.storage_power
    }

    pub fn modified(&self) -> Modified {
        self.modified
    }

    /// Whether this action came straight from an agent. Ramp limits are only
    /// checked on such actions.
    pub fn is_single_act(&self) -> bool {
        self.single_act
    }

    pub fn set_single_act(&mut self, single_act: bool) {
        self.single_act = single_act;
    }

    /// Whether the action requests anything at all.
    pub fn is_do_nothing(&self) -> bool {
        !self.modified.any()
    }

    /// Zeroes the redispatch request, keeping everything else.
    pub fn clear_redispatch(&mut self) {
        self.redispatch.iter_mut().for_each(|v| *v = 0.0);
        self.modified.redispatch = false;
    }

    fn injected(values: Option<&Vec<f32>>, id: usize) -> f32 {
        values.and_then(|v| v.get(id).copied()).unwrap_or(f32::NAN)
    }

    /// Effect of the action on a single element.
    pub fn effect_on(&self, element: ElementRef) -> Result<Effect, ActionError> {
        let g = &self.grid;
        let check = |kind: &'static str, id: usize, n: usize| {
            if id >= n {
                Err(ActionError::UnknownElement { kind, id })
            } else {
                Ok(())
            }
        };
        match element {
            ElementRef::Load(id) => {
                check("load", id, g.n_load())?;
                let pos = g.load_pos_topo_vect()[id];
                Ok(Effect::Load {
                    new_p: Self::injected(self.injection.load_p.as_ref(), id),
                    new_q: Self::injected(self.injection.load_q.as_ref(), id),
                    set_bus: self.set_topo_vect[pos],
                    change_bus: self.change_bus[pos],
                })
            }
            ElementRef::Generator(id) => {
                check("generator", id, g.n_gen())?;
                let pos = g.gen_pos_topo_vect()[id];
                Ok(Effect::Generator {
                    new_p: Self::injected(self.injection.prod_p.as_ref(), id),
                    new_v: Self::injected(self.injection.prod_v.as_ref(), id),
                    set_bus: self.set_topo_vect[pos],
                    change_bus: self.change_bus[pos],
                    redispatch: self.redispatch[id],
                })
            }
            ElementRef::Line(id) => {
                check("powerline", id, g.n_line())?;
                let or = g.line_or_pos_topo_vect()[id];
                let ex = g.line_ex_pos_topo_vect()[id];
                Ok(Effect::Line {
                    set_bus_or: self.set_topo_vect[or],
                    set_bus_ex: self.set_topo_vect[ex],
                    change_bus_or: self.change_bus[or],
                    change_bus_ex: self.change_bus[ex],
                    set_line_status: self.set_line_status[id],
                    change_line_status: self.switch_line_status[id],
                })
            }
            ElementRef::Storage(id) => {
                check("storage unit", id, g.n_storage())?;
                let pos = g.storage_pos_topo_vect()[id];
                Ok(Effect::Storage {
                    power: self.storage_power[id],
                    set_bus: self.set_topo_vect[pos],
                    change_bus: self.change_bus[pos],
                })
            }
            ElementRef::Substation(id) => {
                check("substation", id, g.n_sub())?;
                let range = g.sub_range(id);
                Ok(Effect::Substation {
                    set_bus: self.set_topo_vect[range.clone()].to_vec(),
                    change_bus: self.change_bus[range].to_vec(),
                })
            }
        }
    }

    /// `(new_p, new_q, set_bus, change_bus)` of a load.
    pub fn load_modif(&self, id: usize) -> Result<(f32, f32, i32, bool), ActionError> {
        match self.effect_on(ElementRef::Load(id))? {
            Effect::Load {
                new_p,
                new_q,
                set_bus,
                change_bus,
            } => Ok((new_p, new_q, set_bus, change_bus)),
            _ => Err(ActionError::UnknownElement { kind: "load", id }),
        }
    }

    /// `(new_p, new_v, set_bus, change_bus)` of a generator.
    pub fn gen_modif(&self, id: usize) -> Result<(f32, f32, i32, bool), ActionError> {
        match self.effect_on(ElementRef::Generator(id))? {
            Effect::Generator {
                new_p,
                new_v,
                set_bus,
                change_bus,
                ..
            } => Ok((new_p, new_v, set_bus, change_bus)),
            _ => Err(ActionError::UnknownElement {
                kind: "generator",
                id,
            }),
        }
    }

    /// `(power, set_bus, change_bus)` of a storage unit.
    pub fn storage_modif(&self, id: usize) -> Result<(f32, i32, bool), ActionError> {
        match self.effect_on(ElementRef::Storage(id))? {
            Effect::Storage {
                power,
                set_bus,
                change_bus,
            } => Ok((power, set_bus, change_bus)),
            _ => Err(ActionError::UnknownElement {
                kind: "storage unit",
                id,
            }),
        }
    }

    /// Serializable form, keeping only the categories in use.
    pub fn to_record(&self) -> ActionRecord {
        let finite = |v: &Vec<f32>| -> Vec<Option<f32>> {
            v.iter().map(|x| x.is_finite().then_some(*x)).collect()
        };
        let m = &self.modified;
        ActionRecord {
            load_p: self.injection.load_p.as_ref().map(finite),
            load_q: self.injection.load_q.as_ref().map(finite),
            prod_p: self.injection.prod_p.as_ref().map(finite),
            prod_v: self.injection.prod_v.as_ref().map(finite),
            set_line_status: m.set_status.then(|| self.set_line_status.clone()),
            switch_line_status: m.change_status.then(|| self.switch_line_status.clone()),
            set_bus: m.set_bus.then(|| self.set_topo_vect.clone()),
            change_bus: m.change_bus.then(|| self.change_bus.clone()),
            hazards: m.hazards.then(|| self.hazards.clone()),
            maintenance: m.maintenance.then(|| self.maintenance.clone()),
            redispatch: m.redispatch.then(|| self.redispatch.clone()),
            storage_power: m.storage.then(|| self.storage_power.clone()),
        }
    }

    /// Rebuilds an action from its record, rejecting vectors whose length
    /// does not match the grid.
    pub fn from_record(grid: Arc<GridObjects>, record: &ActionRecord) -> Result<Self, ActionError> {
        let mut act = Self::new(grid);
        let restore = |v: &Vec<Option<f32>>| -> Vec<f32> {
            v.iter().map(|x| x.unwrap_or(f32::NAN)).collect()
        };
        act.injection = Injection {
            load_p: record.load_p.as_ref().map(restore),
            load_q: record.load_q.as_ref().map(restore),
            prod_p: record.prod_p.as_ref().map(restore),
            prod_v: record.prod_v.as_ref().map(restore),
        };
        act.modified.injection = !act.injection.is_empty();
        if let Some(v) = &record.set_line_status {
            act.set_line_status = v.clone();
            act.modified.set_status = true;
        }
        if let Some(v) = &record.switch_line_status {
            act.switch_line_status = v.clone();
            act.modified.change_status = true;
        }
        if let Some(v) = &record.set_bus {
            act.set_topo_vect = v.clone();
            act.modified.set_bus = true;
        }
        if let Some(v) = &record.change_bus {
            act.change_bus = v.clone();
            act.modified.change_bus = true;
        }
        if let Some(v) = &record.hazards {
            act.hazards = v.clone();
            act.modified.hazards = true;
        }
        if let Some(v) = &record.maintenance {
            act.maintenance = v.clone();
            act.modified.maintenance = true;
        }
        if let Some(v) = &record.redispatch {
            act.redispatch = v.clone();
            act.modified.redispatch = true;
        }
        if let Some(v) = &record.storage_power {
            act.storage_power = v.clone();
            act.modified.storage = true;
        }
        act.check_sizes()?;
        Ok(act)
    }
}

fn same_values(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
}

impl PartialEq for BaseAction {
    fn eq(&self, other: &Self) -> bool {
        if !(Arc::ptr_eq(&self.grid, &other.grid) || *self.grid == *other.grid) {
            return false;
        }
        if self.modified != other.modified {
            return false;
        }
        let m = &self.modified;
        let injections_match = self
            .injection
            .entries()
            .iter()
            .zip(other.injection.entries().iter())
            .all(|((_, a), (_, b))| match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => same_values(a, b),
                _ => false,
            });
        injections_match
            && (!m.set_status || self.set_line_status == other.set_line_status)
            && (!m.change_status || self.switch_line_status == other.switch_line_status)
            && (!m.set_bus || self.set_topo_vect == other.set_topo_vect)
            && (!m.change_bus || self.change_bus == other.change_bus)
            && (!m.hazards || self.hazards == other.hazards)
            && (!m.maintenance || self.maintenance == other.maintenance)
            && (!m.redispatch || same_values(&self.redispatch, &other.redispatch))
            && (!m.storage || same_values(&self.storage_power, &other.storage_power))
    }
}

/// JSON form of an action as stored in episode logs. Absent fields are not
/// part of the action; `null` injection entries are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_p: Option<Vec<Option<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_q: Option<Vec<Option<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_p: Option<Vec<Option<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_v: Option<Vec<Option<f32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_line_status: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_line_status: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_bus: Option<Vec<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_bus: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazards: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redispatch: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_power: Option<Vec<f32>>,
}
