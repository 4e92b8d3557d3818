//! Consistency checks run before an action reaches the grid.

use super::base::BaseAction;
use super::error::AmbiguousAction;

fn expect_len(what: &'static str, expected: usize, got: usize) -> Result<(), AmbiguousAction> {
    if expected != got {
        return Err(AmbiguousAction::WrongSize {
            what,
            expected,
            got,
        });
    }
    Ok(())
}

impl BaseAction {
    /// Reports whether the action contradicts itself or the grid.
    pub fn is_ambiguous(&self) -> (bool, Option<AmbiguousAction>) {
        match self.check_ambiguity() {
            Ok(()) => (false, None),
            Err(e) => (true, Some(e)),
        }
    }

    pub(super) fn check_sizes(&self) -> Result<(), AmbiguousAction> {
        let g = &self.grid;
        let inj = &self.injection;
        let sizes = [
            ("loads (active power)", g.n_load(), inj.load_p.as_ref()),
            ("loads (reactive power)", g.n_load(), inj.load_q.as_ref()),
            ("generators (active power)", g.n_gen(), inj.prod_p.as_ref()),
            ("generators (voltage)", g.n_gen(), inj.prod_v.as_ref()),
        ];
        for (what, expected, values) in sizes {
            if let Some(v) = values {
                expect_len(what, expected, v.len())?;
            }
        }
        expect_len("powerlines", g.n_line(), self.set_line_status.len())?;
        expect_len("powerlines", g.n_line(), self.switch_line_status.len())?;
        expect_len("powerlines", g.n_line(), self.hazards.len())?;
        expect_len("powerlines", g.n_line(), self.maintenance.len())?;
        expect_len("object ends", g.dim_topo(), self.set_topo_vect.len())?;
        expect_len("object ends", g.dim_topo(), self.change_bus.len())?;
        expect_len("generators", g.n_gen(), self.redispatch.len())?;
        expect_len("storage units", g.n_storage(), self.storage_power.len())?;
        Ok(())
    }

    /// Fails with the first inconsistency found.
    ///
    /// Ramp limits, and the bounds on `prod_p + redispatch`, are only
    /// checked on single agent actions.
    pub fn check_ambiguity(&self) -> Result<(), AmbiguousAction> {
        let g = &self.grid;

        for l in 0..self.set_line_status.len().min(self.switch_line_status.len()) {
            if self.set_line_status[l] != 0 && self.switch_line_status[l] {
                return Err(AmbiguousAction::InvalidLineStatus(format!(
                    "powerline {l} is both set and switched"
                )));
            }
        }

        self.check_sizes()?;

        if self.modified.redispatch {
            self.check_redispatch()?;
        }
        if self.modified.storage {
            self.check_storage()?;
        }

        for (pos, (&set, &change)) in self.set_topo_vect.iter().zip(&self.change_bus).enumerate() {
            if set != 0 && change {
                return Err(AmbiguousAction::InvalidBusStatus(format!(
                    "element at topology position {pos} is both set and changed"
                )));
            }
            if !(-1..=2).contains(&set) {
                return Err(AmbiguousAction::InvalidBusStatus(format!(
                    "bus {set} at topology position {pos} is outside [-1, 2]"
                )));
            }
        }

        for l in 0..g.n_line() {
            let or = g.line_or_pos_topo_vect()[l];
            let ex = g.line_ex_pos_topo_vect()[l];
            let (set_or, set_ex) = (self.set_topo_vect[or], self.set_topo_vect[ex]);
            if (set_or == -1 && set_ex > 0) || (set_ex == -1 && set_or > 0) {
                return Err(AmbiguousAction::InvalidLineStatus(format!(
                    "powerline {l} has one end disconnected and the other assigned to a bus"
                )));
            }
            let status = self.set_line_status[l];
            if status == -1 && (set_or > 0 || set_ex > 0) {
                return Err(AmbiguousAction::InvalidLineStatus(format!(
                    "powerline {l} is disconnected while one of its ends is assigned to a bus"
                )));
            }
            if status == 1 && (set_or == -1 || set_ex == -1) {
                return Err(AmbiguousAction::InvalidLineStatus(format!(
                    "powerline {l} is reconnected while one of its ends is disconnected"
                )));
            }
            if status != 0 && (self.change_bus[or] || self.change_bus[ex]) {
                return Err(AmbiguousAction::InvalidLineStatus(format!(
                    "powerline {l} has its status set while the bus of one end is changed"
                )));
            }
        }
        Ok(())
    }

    fn check_redispatch(&self) -> Result<(), AmbiguousAction> {
        let g = &self.grid;
        if !g.redispatching_available() {
            return Err(AmbiguousAction::RedispatchUnavailable);
        }
        for (id, (gen_data, &amount)) in g.generators().iter().zip(&self.redispatch).enumerate() {
            if amount == 0.0 {
                continue;
            }
            let name = &g.name_gen()[id];
            if !gen_data.redispatchable {
                return Err(AmbiguousAction::InvalidRedispatching(format!(
                    "generator \"{name}\" cannot be redispatched"
                )));
            }
            if !self.single_act {
                continue;
            }
            if amount > gen_data.ramp_up {
                return Err(AmbiguousAction::InvalidRedispatching(format!(
                    "{amount} MW on \"{name}\" is above its ramp up ({} MW)",
                    gen_data.ramp_up
                )));
            }
            if -amount > gen_data.ramp_down {
                return Err(AmbiguousAction::InvalidRedispatching(format!(
                    "{amount} MW on \"{name}\" is below its ramp down (-{} MW)",
                    gen_data.ramp_down
                )));
            }
            let scheduled = self
                .injection
                .prod_p
                .as_ref()
                .and_then(|p| p.get(id).copied())
                .filter(|p| p.is_finite());
            if let Some(p) = scheduled {
                let target = p + amount;
                if target > gen_data.pmax || target < gen_data.pmin {
                    return Err(AmbiguousAction::InvalidRedispatching(format!(
                        "\"{name}\" would produce {target} MW, outside [{}, {}]",
                        gen_data.pmin, gen_data.pmax
                    )));
                }
            }
        }
        Ok(())
    }

    fn check_storage(&self) -> Result<(), AmbiguousAction> {
        let g = &self.grid;
        if g.n_storage() == 0 {
            return Err(AmbiguousAction::InvalidStorage(
                "there is no storage unit on this grid".to_string(),
            ));
        }
        for (id, (unit, &power)) in g.storage().iter().zip(&self.storage_power).enumerate() {
            if power < -unit.max_p_prod {
                return Err(AmbiguousAction::InvalidStorage(format!(
                    "unit {id} cannot produce {} MW (max {})",
                    -power, unit.max_p_prod
                )));
            }
            if power > unit.max_p_absorb {
                return Err(AmbiguousAction::InvalidStorage(format!(
                    "unit {id} cannot absorb {power} MW (max {})",
                    unit.max_p_absorb
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::{ActionUpdate, InjectionUpdate, Values};
    use crate::grid::{ObjectType, presets};

    fn case14() -> BaseAction {
        BaseAction::new(Arc::new(presets::case14().unwrap()))
    }

    fn with(update: ActionUpdate) -> BaseAction {
        let mut act = case14();
        act.update(&update).unwrap();
        act
    }

    #[test]
    fn do_nothing_is_not_ambiguous() {
        assert_eq!(case14().is_ambiguous(), (false, None));
    }

    #[test]
    fn set_and_switch_same_line() {
        let mut act = with(ActionUpdate::set_line_status([(3, 1)]));
        act.update(&ActionUpdate::change_line_status([3])).unwrap();
        assert!(matches!(
            act.check_ambiguity(),
            Err(AmbiguousAction::InvalidLineStatus(_))
        ));
    }

    #[test]
    fn redispatching_a_renewable_unit() {
        // generator 2 is the wind farm
        let act = with(ActionUpdate::redispatch([(2, 1.0)]));
        assert!(matches!(
            act.check_ambiguity(),
            Err(AmbiguousAction::InvalidRedispatching(_))
        ));
    }

    #[test]
    fn redispatch_above_ramp_only_matters_for_single_actions() {
        let mut act = with(ActionUpdate::redispatch([(0, 11.0)]));
        assert!(act.is_ambiguous().0);
        act.set_single_act(false);
        assert!(!act.is_ambiguous().0);

        let act = with(ActionUpdate::redispatch([(0, -10.5)]));
        assert!(act.is_ambiguous().0);
        let act = with(ActionUpdate::redispatch([(0, 10.0), (1, -10.0)]));
        assert!(!act.is_ambiguous().0);
    }

    #[test]
    fn redispatch_against_scheduled_production() {
        let mut prod = vec![f32::NAN; 6];
        prod[0] = 135.0;
        let update = ActionUpdate {
            injection: Some(InjectionUpdate {
                prod_p: Some(Values::Full(prod)),
                ..InjectionUpdate::default()
            }),
            ..ActionUpdate::redispatch([(0, 8.0)])
        };
        let act = with(update);
        assert!(matches!(
            act.check_ambiguity(),
            Err(AmbiguousAction::InvalidRedispatching(_))
        ));
    }

    #[test]
    fn redispatch_unavailable_without_dispatchable_units() {
        let mut desc = presets::case14_description();
        for g in &mut desc.generators {
            g.redispatchable = false;
        }
        let grid = Arc::new(crate::grid::GridObjects::new(desc).unwrap());
        let mut act = BaseAction::new(grid);
        act.update(&ActionUpdate::redispatch([(0, 1.0)])).unwrap();
        assert_eq!(act.check_ambiguity(), Err(AmbiguousAction::RedispatchUnavailable));
    }

    #[test]
    fn storage_limits() {
        let grid = Arc::new(presets::case14_storage().unwrap());
        let mut act = BaseAction::new(Arc::clone(&grid));
        act.update(&ActionUpdate::set_storage([(0, 5.0), (1, -5.0)])).unwrap();
        assert!(!act.is_ambiguous().0);
        act.update(&ActionUpdate::set_storage([(0, 5.5)])).unwrap();
        assert!(matches!(act.check_ambiguity(), Err(AmbiguousAction::InvalidStorage(_))));
        act.update(&ActionUpdate::set_storage([(0, -6.0)])).unwrap();
        assert!(matches!(act.check_ambiguity(), Err(AmbiguousAction::InvalidStorage(_))));
    }

    #[test]
    fn set_and_change_same_element() {
        let mut act = with(ActionUpdate::set_bus_of(ObjectType::Load, [(0, 2)]));
        act.update(&ActionUpdate::change_bus_of(ObjectType::Load, [0])).unwrap();
        assert!(matches!(act.check_ambiguity(), Err(AmbiguousAction::InvalidBusStatus(_))));
    }

    #[test]
    fn line_end_disconnected_other_end_assigned() {
        let mut act = with(ActionUpdate::set_bus_of(ObjectType::LineOr, [(4, -1)]));
        act.update(&ActionUpdate::set_bus_of(ObjectType::LineEx, [(4, 1)])).unwrap();
        assert!(matches!(act.check_ambiguity(), Err(AmbiguousAction::InvalidLineStatus(_))));
    }

    #[test]
    fn disconnected_line_with_end_on_bus() {
        let mut act = with(ActionUpdate::set_line_status([(4, -1)]));
        act.update(&ActionUpdate::set_bus_of(ObjectType::LineOr, [(4, 2)])).unwrap();
        assert!(matches!(act.check_ambiguity(), Err(AmbiguousAction::InvalidLineStatus(_))));
    }

    #[test]
    fn status_set_while_end_changed() {
        let mut act = with(ActionUpdate::set_line_status([(6, 1)]));
        act.update(&ActionUpdate::change_bus_of(ObjectType::LineEx, [6])).unwrap();
        assert!(matches!(act.check_ambiguity(), Err(AmbiguousAction::InvalidLineStatus(_))));
    }

    #[test]
    fn reconnect_with_both_ends_assigned_is_fine() {
        let mut act = with(ActionUpdate::set_line_status([(6, 1)]));
        act.update(&ActionUpdate::set_bus_of(ObjectType::LineOr, [(6, 2)])).unwrap();
        act.update(&ActionUpdate::set_bus_of(ObjectType::LineEx, [(6, 1)])).unwrap();
        assert!(!act.is_ambiguous().0);
    }
}
