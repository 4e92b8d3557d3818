//! Grid state kept between steps and the balance computation.

use std::sync::Arc;

use thiserror::Error;

use crate::action::BaseAction;
use crate::grid::{GridObjects, ObjectType};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("{kind} {id} is disconnected")]
    Disconnected { kind: ObjectType, id: usize },
    #[error("{kind} {id} is islanded from the slack bus")]
    Islanded { kind: ObjectType, id: usize },
    #[error("the grid has no generator to act as slack")]
    NoSlack,
    #[error("expected {expected} {what} values, got {got}")]
    WrongLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },
}

/// Solver of the grid state for one step.
///
/// The environment feeds it the combined action of the step, the dispatch
/// offsets and the storage powers, then asks it to [`Backend::run`].
pub trait Backend: Send {
    /// Restores the initial topology and clears injections.
    fn reset(&mut self);

    /// Applies injections, line status and bus changes.
    fn apply_action(&mut self, action: &BaseAction) -> Result<(), BackendError>;

    /// Offsets added to the scheduled production.
    fn set_dispatch(&mut self, offsets: &[f32]) -> Result<(), BackendError>;

    /// Storage power, load convention.
    fn set_storage_power(&mut self, power: &[f32]) -> Result<(), BackendError>;

    /// Computes the state. An error ends the episode.
    fn run(&mut self) -> Result<(), BackendError>;

    fn gen_p(&self) -> &[f32];
    fn gen_v(&self) -> &[f32];
    fn load_p(&self) -> &[f32];
    fn load_q(&self) -> &[f32];
    fn topo_vect(&self) -> &[i32];
    fn line_status(&self) -> Vec<bool>;
}

/// Balance without line flows: every connected element must be reachable
/// from the slack generator and the slack takes whatever is left.
#[derive(Debug, Clone)]
pub struct CopperPlate {
    grid: Arc<GridObjects>,
    slack: Option<usize>,
    topo_vect: Vec<i32>,
    /// Bus each position held when last connected.
    last_bus: Vec<i32>,
    load_p: Vec<f32>,
    load_q: Vec<f32>,
    prod_p: Vec<f32>,
    prod_v: Vec<f32>,
    dispatch: Vec<f32>,
    storage_p: Vec<f32>,
    gen_p: Vec<f32>,
}

impl CopperPlate {
    pub fn new(grid: Arc<GridObjects>) -> Self {
        let slack = grid
            .generators()
            .iter()
            .enumerate()
            .max_by(|a, b| {
                a.1.redispatchable
                    .cmp(&b.1.redispatchable)
                    .then(a.1.pmax.total_cmp(&b.1.pmax))
            })
            .map(|(id, _)| id);
        let nominal = grid.nominal().clone();
        Self {
            slack,
            topo_vect: vec![1; grid.dim_topo()],
            last_bus: vec![1; grid.dim_topo()],
            load_p: nominal.load_p,
            load_q: nominal.load_q,
            gen_p: nominal.prod_p.clone(),
            prod_p: nominal.prod_p,
            prod_v: nominal.prod_v,
            dispatch: vec![0.0; grid.n_gen()],
            storage_p: vec![0.0; grid.n_storage()],
            grid,
        }
    }

    /// Generator balancing the grid: the largest controllable unit, or the
    /// largest unit when none is controllable.
    pub fn slack(&self) -> Option<usize> {
        self.slack
    }

    fn set_bus(&mut self, pos: usize, bus: i32) {
        self.topo_vect[pos] = bus;
        if bus > 0 {
            self.last_bus[pos] = bus;
        }
    }

    fn set_line(&mut self, line: usize, connected: bool) {
        let ends = [
            self.grid.line_or_pos_topo_vect()[line],
            self.grid.line_ex_pos_topo_vect()[line],
        ];
        for pos in ends {
            let bus = if connected { self.last_bus[pos] } else { -1 };
            self.set_bus(pos, bus);
        }
    }

    fn line_connected(&self, line: usize) -> bool {
        self.topo_vect[self.grid.line_or_pos_topo_vect()[line]] > 0
            && self.topo_vect[self.grid.line_ex_pos_topo_vect()[line]] > 0
    }

    /// Busbar node `(sub, bus)` of a topology position.
    fn node(&self, pos: usize) -> Option<usize> {
        let bus = self.topo_vect[pos];
        (bus > 0).then(|| 2 * self.grid.topo_vect_to_sub()[pos] + (bus as usize - 1))
    }

    fn reachable_from(&self, start: usize) -> Vec<bool> {
        let g = &self.grid;
        let mut seen = vec![false; 2 * g.n_sub()];
        seen[start] = true;
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for l in 0..g.n_line() {
                let (Some(a), Some(b)) = (
                    self.node(g.line_or_pos_topo_vect()[l]),
                    self.node(g.line_ex_pos_topo_vect()[l]),
                ) else {
                    continue;
                };
                let other = if a == node {
                    b
                } else if b == node {
                    a
                } else {
                    continue;
                };
                if !seen[other] {
                    seen[other] = true;
                    stack.push(other);
                }
            }
        }
        seen
    }
}

fn check_len(what: &'static str, expected: usize, got: usize) -> Result<(), BackendError> {
    if expected != got {
        return Err(BackendError::WrongLength {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

fn overwrite(target: &mut [f32], values: Option<&Vec<f32>>) {
    if let Some(values) = values {
        for (t, v) in target.iter_mut().zip(values) {
            if v.is_finite() {
                *t = *v;
            }
        }
    }
}

impl Backend for CopperPlate {
    fn reset(&mut self) {
        self.topo_vect.iter_mut().for_each(|b| *b = 1);
        self.last_bus.iter_mut().for_each(|b| *b = 1);
        let nominal = self.grid.nominal();
        self.load_p = nominal.load_p.clone();
        self.load_q = nominal.load_q.clone();
        self.prod_p = nominal.prod_p.clone();
        self.prod_v = nominal.prod_v.clone();
        self.gen_p = nominal.prod_p.clone();
        self.dispatch.iter_mut().for_each(|d| *d = 0.0);
        self.storage_p.iter_mut().for_each(|p| *p = 0.0);
    }

    fn apply_action(&mut self, action: &BaseAction) -> Result<(), BackendError> {
        let g = Arc::clone(&self.grid);
        check_len("topology", g.dim_topo(), action.set_topo_vect().len())?;
        check_len("line status", g.n_line(), action.set_line_status().len())?;

        let inj = action.injection();
        overwrite(&mut self.load_p, inj.load_p.as_ref());
        overwrite(&mut self.load_q, inj.load_q.as_ref());
        overwrite(&mut self.prod_p, inj.prod_p.as_ref());
        overwrite(&mut self.prod_v, inj.prod_v.as_ref());

        for l in 0..g.n_line() {
            match action.set_line_status()[l] {
                1 => self.set_line(l, true),
                -1 => self.set_line(l, false),
                _ => {}
            }
            if action.switch_line_status()[l] {
                let connected = self.line_connected(l);
                self.set_line(l, !connected);
            }
        }
        for (pos, bus) in action.set_topo_vect().iter().enumerate() {
            if *bus != 0 {
                self.set_bus(pos, *bus);
            }
        }
        for (pos, change) in action.change_bus().iter().enumerate() {
            if *change && self.topo_vect[pos] > 0 {
                let flipped = 3 - self.topo_vect[pos];
                self.set_bus(pos, flipped);
            }
        }
        // A line with one end out is out at both ends.
        for l in 0..g.n_line() {
            if !self.line_connected(l) {
                self.topo_vect[g.line_or_pos_topo_vect()[l]] = -1;
                self.topo_vect[g.line_ex_pos_topo_vect()[l]] = -1;
            }
        }
        Ok(())
    }

    fn set_dispatch(&mut self, offsets: &[f32]) -> Result<(), BackendError> {
        check_len("dispatch", self.dispatch.len(), offsets.len())?;
        self.dispatch.copy_from_slice(offsets);
        Ok(())
    }

    fn set_storage_power(&mut self, power: &[f32]) -> Result<(), BackendError> {
        check_len("storage", self.storage_p.len(), power.len())?;
        self.storage_p.copy_from_slice(power);
        Ok(())
    }

    fn run(&mut self) -> Result<(), BackendError> {
        let g = Arc::clone(&self.grid);
        let slack = self.slack.ok_or(BackendError::NoSlack)?;
        let slack_pos = g.gen_pos_topo_vect()[slack];
        let slack_node = self.node(slack_pos).ok_or(BackendError::Disconnected {
            kind: ObjectType::Generator,
            id: slack,
        })?;
        let reachable = self.reachable_from(slack_node);

        let groups = [
            (ObjectType::Load, g.load_pos_topo_vect()),
            (ObjectType::Generator, g.gen_pos_topo_vect()),
        ];
        for (kind, positions) in groups {
            for (id, pos) in positions.iter().enumerate() {
                match self.node(*pos) {
                    None => return Err(BackendError::Disconnected { kind, id }),
                    Some(n) if !reachable[n] => return Err(BackendError::Islanded { kind, id }),
                    Some(_) => {}
                }
            }
        }
        for (id, pos) in g.storage_pos_topo_vect().iter().enumerate() {
            match self.node(*pos) {
                Some(n) if !reachable[n] => {
                    return Err(BackendError::Islanded {
                        kind: ObjectType::Storage,
                        id,
                    });
                }
                _ => {}
            }
        }

        self.gen_p = self
            .prod_p
            .iter()
            .zip(&self.dispatch)
            .map(|(p, d)| p + d)
            .collect();
        let storage: f32 = g
            .storage_pos_topo_vect()
            .iter()
            .zip(&self.storage_p)
            .filter(|(pos, _)| self.topo_vect[**pos] > 0)
            .map(|(_, p)| p)
            .sum();
        let demand = self.load_p.iter().sum::<f32>() + storage;
        let supply: f32 = self.gen_p.iter().sum();
        self.gen_p[slack] += demand - supply;
        Ok(())
    }

    fn gen_p(&self) -> &[f32] {
        &self.gen_p
    }

    fn gen_v(&self) -> &[f32] {
        &self.prod_v
    }

    fn load_p(&self) -> &[f32] {
        &self.load_p
    }

    fn load_q(&self) -> &[f32] {
        &self.load_q
    }

    fn topo_vect(&self) -> &[i32] {
        &self.topo_vect
    }

    fn line_status(&self) -> Vec<bool> {
        (0..self.grid.n_line()).map(|l| self.line_connected(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ActionUpdate, InjectionUpdate, Values};
    use crate::grid::presets;

    fn backend() -> (Arc<GridObjects>, CopperPlate) {
        let grid = Arc::new(presets::case5().unwrap());
        (Arc::clone(&grid), CopperPlate::new(grid))
    }

    #[test]
    fn slack_is_the_largest_controllable_unit() {
        let (_, b) = backend();
        assert_eq!(b.slack(), Some(0));
        let grid = Arc::new(presets::case14().unwrap());
        assert_eq!(CopperPlate::new(grid).slack(), Some(0));
    }

    #[test]
    fn slack_absorbs_the_imbalance() {
        let (grid, mut b) = backend();
        let mut act = BaseAction::new(Arc::clone(&grid));
        act.update(&ActionUpdate {
            injection: Some(InjectionUpdate {
                load_p: Some(Values::Full(vec![20.0, 20.0, 20.0])),
                prod_p: Some(Values::Full(vec![30.0, 25.0])),
                ..InjectionUpdate::default()
            }),
            ..ActionUpdate::default()
        })
        .unwrap();
        b.apply_action(&act).unwrap();
        b.set_dispatch(&[0.0, 2.0]).unwrap();
        b.run().unwrap();
        assert_eq!(b.gen_p()[1], 27.0);
        assert!((b.gen_p().iter().sum::<f32>() - 60.0).abs() < 1e-4);
    }

    #[test]
    fn status_and_bus_changes() {
        let (grid, mut b) = backend();
        let act = ActionUpdate::set_line_status([(7, -1)]);
        let mut a = BaseAction::new(Arc::clone(&grid));
        a.update(&act).unwrap();
        b.apply_action(&a).unwrap();
        assert!(!b.line_status()[7]);
        b.run().unwrap();

        let mut a = BaseAction::new(Arc::clone(&grid));
        a.update(&ActionUpdate::change_line_status([7])).unwrap();
        b.apply_action(&a).unwrap();
        assert!(b.line_status()[7]);
        assert!(b.topo_vect().iter().all(|bus| *bus == 1));
    }

    #[test]
    fn reconnection_uses_the_last_bus() {
        let (grid, mut b) = backend();
        let or = grid.line_or_pos_topo_vect()[4];
        let mut a = BaseAction::new(Arc::clone(&grid));
        a.update(&ActionUpdate::set_bus_of(ObjectType::LineOr, [(4, 2)])).unwrap();
        b.apply_action(&a).unwrap();
        assert_eq!(b.topo_vect()[or], 2);

        let mut off = BaseAction::new(Arc::clone(&grid));
        off.update(&ActionUpdate::set_line_status([(4, -1)])).unwrap();
        b.apply_action(&off).unwrap();
        assert_eq!(b.topo_vect()[or], -1);

        let mut on = BaseAction::new(Arc::clone(&grid));
        on.update(&ActionUpdate::set_line_status([(4, 1)])).unwrap();
        b.apply_action(&on).unwrap();
        assert_eq!(b.topo_vect()[or], 2);
    }

    #[test]
    fn islanded_substation_is_an_error() {
        let (grid, mut b) = backend();
        let mut a = BaseAction::new(Arc::clone(&grid));
        a.update(&ActionUpdate::set_line_status([(3, -1), (7, -1)])).unwrap();
        b.apply_action(&a).unwrap();
        assert_eq!(
            b.run(),
            Err(BackendError::Islanded {
                kind: ObjectType::Load,
                id: 2
            })
        );
    }

    #[test]
    fn element_alone_on_a_busbar_is_islanded() {
        let (grid, mut b) = backend();
        let mut a = BaseAction::new(Arc::clone(&grid));
        a.update(&ActionUpdate::set_bus_of(ObjectType::Load, [(0, 2)])).unwrap();
        b.apply_action(&a).unwrap();
        assert!(matches!(b.run(), Err(BackendError::Islanded { .. })));
        b.reset();
        b.run().unwrap();
    }

    #[test]
    fn disconnected_generator_is_an_error() {
        let (grid, mut b) = backend();
        let mut a = BaseAction::new(Arc::clone(&grid));
        a.update(&ActionUpdate::set_bus_of(ObjectType::Generator, [(1, -1)])).unwrap();
        b.apply_action(&a).unwrap();
        assert_eq!(
            b.run(),
            Err(BackendError::Disconnected {
                kind: ObjectType::Generator,
                id: 1
            })
        );
    }
}
