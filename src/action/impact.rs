//! What an action touches: line and substation counts used by the game
//! rules, a structured per-object report and a readable description.

use std::fmt;

use serde::Serialize;

use super::base::BaseAction;
use crate::grid::ObjectType;

/// Lines and substations an action acts upon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologicalImpact {
    pub lines: Vec<bool>,
    pub subs: Vec<bool>,
}

impl TopologicalImpact {
    pub fn n_lines(&self) -> usize {
        self.lines.iter().filter(|l| **l).count()
    }

    pub fn n_subs(&self) -> usize {
        self.subs.iter().filter(|s| **s).count()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InjectionChange {
    pub quantity: String,
    pub element: String,
    pub value: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InjectionImpact {
    pub changed: bool,
    pub count: usize,
    pub impacted: Vec<InjectionChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LineList {
    pub count: usize,
    pub powerlines: Vec<usize>,
}

impl LineList {
    fn from_mask(mask: impl Iterator<Item = bool>) -> Self {
        let powerlines: Vec<usize> = mask.enumerate().filter(|(_, m)| *m).map(|(i, _)| i).collect();
        Self {
            count: powerlines.len(),
            powerlines,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForceLineImpact {
    pub changed: bool,
    pub reconnections: LineList,
    pub disconnections: LineList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusChange {
    /// Assigned bus; absent for a bus switch or a disconnection.
    pub bus: Option<i32>,
    pub object_type: ObjectType,
    pub object_id: usize,
    pub substation: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopologyImpact {
    pub changed: bool,
    pub bus_switch: Vec<BusChange>,
    pub assigned_bus: Vec<BusChange>,
    pub disconnect_bus: Vec<BusChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenRedispatch {
    pub gen_id: usize,
    pub gen_name: String,
    pub amount: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RedispatchImpact {
    pub changed: bool,
    pub generators: Vec<GenRedispatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageChange {
    pub storage_id: usize,
    pub storage_name: String,
    pub new_capacity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StorageImpact {
    pub changed: bool,
    pub capacities: Vec<StorageChange>,
}

/// Structured description of everything an action does.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionImpact {
    pub has_impact: bool,
    pub injection: InjectionImpact,
    pub force_line: ForceLineImpact,
    pub switch_line: LineList,
    pub topology: TopologyImpact,
    pub redispatch: RedispatchImpact,
    pub storage: StorageImpact,
}

impl BaseAction {
    /// Lines and substations this action would act upon.
    ///
    /// Bus requests on the ends of a line whose status is already acted upon
    /// do not count for the substation. With a known `line_status`, assigning
    /// a bus to an end of a disconnected line (or disconnecting an end of a
    /// connected one) counts as a line action instead.
    pub fn topological_impact(&self, line_status: Option<&[bool]>) -> TopologicalImpact {
        let g = &self.grid;
        let n_line = g.n_line();
        let or_pos = g.line_or_pos_topo_vect();
        let ex_pos = g.line_ex_pos_topo_vect();

        let mut lines: Vec<bool> = (0..n_line)
            .map(|l| self.switch_line_status[l] || self.set_line_status[l] != 0)
            .collect();
        let mut effective: Vec<bool> = self
            .change_bus
            .iter()
            .zip(&self.set_topo_vect)
            .map(|(c, s)| *c || *s != 0)
            .collect();

        let connected = |l: usize| line_status.is_some_and(|s| s.get(l).copied().unwrap_or(false));
        for l in 0..n_line {
            if lines[l] && !connected(l) {
                effective[or_pos[l]] = false;
                effective[ex_pos[l]] = false;
            }
        }

        if let Some(status) = line_status {
            for l in 0..n_line {
                let is_connected = status.get(l).copied().unwrap_or(false);
                let set_or = self.set_topo_vect[or_pos[l]];
                let set_ex = self.set_topo_vect[ex_pos[l]];
                let reconnects = !is_connected && (set_or > 0 || set_ex > 0);
                let disconnects = is_connected && (set_or < 0 || set_ex < 0);
                if reconnects || disconnects {
                    lines[l] = true;
                    effective[or_pos[l]] = false;
                    effective[ex_pos[l]] = false;
                }
            }
        }

        let mut subs = vec![false; g.n_sub()];
        for (pos, e) in effective.iter().enumerate() {
            if *e {
                subs[g.topo_vect_to_sub()[pos]] = true;
            }
        }
        TopologicalImpact { lines, subs }
    }

    /// Structured report of the action, element by element.
    pub fn impact_on_objects(&self) -> ActionImpact {
        let g = &self.grid;

        let mut injection = InjectionImpact::default();
        for (key, values) in self.injection.entries() {
            let Some(values) = values else { continue };
            let names = if key.starts_with("load") {
                g.name_load()
            } else {
                g.name_gen()
            };
            for (i, v) in values.iter().enumerate() {
                if v.is_finite() {
                    injection.impacted.push(InjectionChange {
                        quantity: key.to_string(),
                        element: names.get(i).cloned().unwrap_or_default(),
                        value: *v,
                    });
                }
            }
        }
        injection.count = injection.impacted.len();
        injection.changed = injection.count > 0;

        let reconnections = LineList::from_mask(self.set_line_status.iter().map(|s| *s == 1));
        let disconnections = LineList::from_mask(self.set_line_status.iter().map(|s| *s == -1));
        let force_line = ForceLineImpact {
            changed: reconnections.count + disconnections.count > 0,
            reconnections,
            disconnections,
        };
        let switch_line = LineList::from_mask(self.switch_line_status.iter().copied());

        let mut topology = TopologyImpact::default();
        for pos in 0..self.set_topo_vect.len() {
            let Some(obj) = g.object_at(pos) else { continue };
            let change = |bus| BusChange {
                bus,
                object_type: obj.kind,
                object_id: obj.id,
                substation: obj.sub,
            };
            if self.change_bus[pos] {
                topology.bus_switch.push(change(None));
            }
            match self.set_topo_vect[pos] {
                0 => {}
                b if b < 0 => topology.disconnect_bus.push(change(None)),
                b => topology.assigned_bus.push(change(Some(b))),
            }
        }
        topology.changed = !(topology.bus_switch.is_empty()
            && topology.assigned_bus.is_empty()
            && topology.disconnect_bus.is_empty());

        let generators: Vec<GenRedispatch> = self
            .redispatch
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0 && v.is_finite())
            .map(|(gen_id, v)| GenRedispatch {
                gen_id,
                gen_name: g.name_gen()[gen_id].clone(),
                amount: *v,
            })
            .collect();
        let redispatch = RedispatchImpact {
            changed: !generators.is_empty(),
            generators,
        };

        let capacities: Vec<StorageChange> = self
            .storage_power
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0 && v.is_finite())
            .map(|(storage_id, v)| StorageChange {
                storage_id,
                storage_name: g.name_storage()[storage_id].clone(),
                new_capacity: *v,
            })
            .collect();
        let storage = StorageImpact {
            changed: !capacities.is_empty(),
            capacities,
        };

        ActionImpact {
            has_impact: injection.changed
                || force_line.changed
                || switch_line.count > 0
                || topology.changed
                || redispatch.changed
                || storage.changed,
            injection,
            force_line,
            switch_line,
            topology,
            redispatch,
            storage,
        }
    }
}

fn write_bus_changes(f: &mut fmt::Formatter<'_>, changes: &[BusChange], verb: &str) -> fmt::Result {
    for c in changes {
        let what = match c.bus {
            Some(b) => format!("Assign bus {b} to"),
            None => verb.to_string(),
        };
        writeln!(
            f,
            "\t \t - {what} {} id {} [on substation {}]",
            c.object_type, c.object_id, c.substation
        )?;
    }
    Ok(())
}

impl fmt::Display for BaseAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let impact = self.impact_on_objects();
        writeln!(f, "This action will:")?;

        if impact.injection.changed {
            for (key, values) in self.injection.entries() {
                if let Some(values) = values {
                    writeln!(f, "\t - Set {key} to {values:?}")?;
                }
            }
        } else {
            writeln!(f, "\t - NOT change anything to the injections")?;
        }

        if impact.redispatch.changed {
            writeln!(f, "\t - Perform the following redispatching action:")?;
            for r in &impact.redispatch.generators {
                writeln!(f, "\t \t - Redispatch \"{}\" of {:.2} MW", r.gen_name, r.amount)?;
            }
        } else {
            writeln!(f, "\t - NOT perform any redispatching action")?;
        }

        if impact.storage.changed {
            writeln!(f, "\t - Modify the storage units in the following way:")?;
            for s in &impact.storage.capacities {
                let verb = if s.new_capacity > 0.0 { "absorb" } else { "produce" };
                writeln!(
                    f,
                    "\t \t - Ask unit \"{}\" to {verb} {:.2} MW (setpoint: {:.2} MW)",
                    s.storage_name,
                    s.new_capacity.abs(),
                    s.new_capacity
                )?;
            }
        } else {
            writeln!(f, "\t - NOT modify any storage capacity")?;
        }

        let force = &impact.force_line;
        if force.reconnections.count > 0 {
            writeln!(
                f,
                "\t - Force reconnection of {} powerlines ({:?})",
                force.reconnections.count, force.reconnections.powerlines
            )?;
        }
        if force.disconnections.count > 0 {
            writeln!(
                f,
                "\t - Force disconnection of {} powerlines ({:?})",
                force.disconnections.count, force.disconnections.powerlines
            )?;
        }
        if !force.changed {
            writeln!(f, "\t - NOT force any line status")?;
        }

        if impact.switch_line.count > 0 {
            writeln!(
                f,
                "\t - Switch status of {} powerlines ({:?})",
                impact.switch_line.count, impact.switch_line.powerlines
            )?;
        } else {
            writeln!(f, "\t - NOT switch any line status")?;
        }

        let topo = &impact.topology;
        if topo.bus_switch.is_empty() {
            writeln!(f, "\t - NOT switch anything in the topology")?;
        } else {
            writeln!(f, "\t - Change the bus of the following element(s):")?;
            write_bus_changes(f, &topo.bus_switch, "Switch bus of")?;
        }
        if topo.assigned_bus.is_empty() && topo.disconnect_bus.is_empty() {
            write!(f, "\t - NOT force any particular bus configuration")?;
        } else {
            writeln!(f, "\t - Set the bus of the following element(s):")?;
            write_bus_changes(f, &topo.assigned_bus, "")?;
            write_bus_changes(f, &topo.disconnect_bus, "Disconnect")?;
        }
        Ok(())
    }
}
