//! Sequential combination of actions: `a + b` means "a, then b".

use std::ops::Add;
use std::sync::Arc;

use super::base::BaseAction;
use super::error::ActionError;

/// Merges a "set" vector and a "change" mask with the ones of a later
/// action. `flip` maps a set value to its toggled counterpart.
fn merge_set_change(
    my_set: &mut [i32],
    my_change: &mut [bool],
    other_set: &[i32],
    other_change: &[bool],
    flip: impl Fn(i32) -> i32,
) {
    let slots = my_set.iter_mut().zip(my_change.iter_mut());
    for ((set, change), (&o_set, &o_change)) in slots.zip(other_set.iter().zip(other_change)) {
        if o_change {
            if *change {
                *change = false;
            } else if *set != 0 {
                *set = flip(*set);
            } else {
                *change = true;
            }
        }
        if o_set != 0 {
            *set = o_set;
            *change = false;
        }
    }
}

impl BaseAction {
    /// Appends `other` to this action.
    ///
    /// Injections of `other` override; redispatch and storage requests add
    /// up; a later "set" wins over an earlier one and two "change" requests
    /// cancel out.
    pub fn combine(&mut self, other: &BaseAction) -> Result<(), ActionError> {
        if !(Arc::ptr_eq(&self.grid, &other.grid) || *self.grid == *other.grid) {
            return Err(ActionError::DifferentGrid);
        }

        for (key, values) in other.injection.entries() {
            let Some(values) = values else { continue };
            let Some(slot) = self.injection.slot_mut(key) else {
                continue;
            };
            let mine = slot.get_or_insert_with(|| vec![f32::NAN; values.len()]);
            for (m, v) in mine.iter_mut().zip(values) {
                if v.is_finite() {
                    *m = *v;
                }
            }
        }

        if other.modified.redispatch {
            for (m, v) in self.redispatch.iter_mut().zip(&other.redispatch) {
                if v.is_finite() {
                    *m += *v;
                }
            }
        }
        if other.modified.storage {
            for (m, v) in self.storage_power.iter_mut().zip(&other.storage_power) {
                *m += *v;
            }
        }

        for (m, o) in self.hazards.iter_mut().zip(&other.hazards) {
            *m |= *o;
        }
        for (m, o) in self.maintenance.iter_mut().zip(&other.maintenance) {
            *m |= *o;
        }

        merge_set_change(
            &mut self.set_line_status,
            &mut self.switch_line_status,
            &other.set_line_status,
            &other.switch_line_status,
            |s| -s,
        );
        merge_set_change(
            &mut self.set_topo_vect,
            &mut self.change_bus,
            &other.set_topo_vect,
            &other.change_bus,
            |b| match b {
                1 => 2,
                2 => 1,
                other => other,
            },
        );

        self.modified.merge(&other.modified);
        Ok(())
    }
}

impl Add for &BaseAction {
    type Output = Result<BaseAction, ActionError>;

    fn add(self, other: &BaseAction) -> Self::Output {
        let mut out = self.clone();
        out.combine(other)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionUpdate;
    use crate::grid::{ObjectType, presets};
    use proptest::prelude::*;

    fn grid() -> Arc<crate::grid::GridObjects> {
        Arc::new(presets::case14().unwrap())
    }

    fn act(grid: &Arc<crate::grid::GridObjects>, update: ActionUpdate) -> BaseAction {
        let mut a = BaseAction::new(Arc::clone(grid));
        a.update(&update).unwrap();
        a
    }

    #[test]
    fn redispatch_adds_up() {
        let g = grid();
        let a = act(&g, ActionUpdate::redispatch([(0, 2.0), (1, -2.0)]));
        let b = act(&g, ActionUpdate::redispatch([(0, 1.5)]));
        let c = (&a + &b).unwrap();
        assert_eq!(&c.redispatch()[..2], &[3.5, -2.0]);
    }

    #[test]
    fn two_switches_cancel() {
        let g = grid();
        let a = act(&g, ActionUpdate::change_line_status([1]));
        let c = (&a + &a).unwrap();
        assert!(!c.switch_line_status()[1]);
    }

    #[test]
    fn later_set_wins() {
        let g = grid();
        let a = act(&g, ActionUpdate::change_line_status([1]));
        let b = act(&g, ActionUpdate::set_line_status([(1, -1)]));
        let c = (&a + &b).unwrap();
        assert_eq!(c.set_line_status()[1], -1);
        assert!(!c.switch_line_status()[1]);
        assert!(!c.is_ambiguous().0);
    }

    #[test]
    fn switch_after_set_flips_the_set() {
        let g = grid();
        let set = act(&g, ActionUpdate::set_line_status([(1, -1)]));
        let switch = act(&g, ActionUpdate::change_line_status([1]));
        let c = (&set + &switch).unwrap();
        assert_eq!(c.set_line_status()[1], 1);
        assert!(!c.switch_line_status()[1]);

        let bus = act(&g, ActionUpdate::set_bus_of(ObjectType::Load, [(2, 2)]));
        let change = act(&g, ActionUpdate::change_bus_of(ObjectType::Load, [2]));
        let c = (&bus + &change).unwrap();
        assert_eq!(c.set_topo_vect()[g.load_pos_topo_vect()[2]], 1);
    }

    #[test]
    fn combination_is_not_commutative() {
        let g = grid();
        let a = act(&g, ActionUpdate::set_line_status([(3, -1)]));
        let b = act(&g, ActionUpdate::set_line_status([(3, 1)]));
        assert_eq!((&a + &b).unwrap().set_line_status()[3], 1);
        assert_eq!((&b + &a).unwrap().set_line_status()[3], -1);
    }

    #[test]
    fn different_grids_do_not_combine() {
        let a = BaseAction::new(grid());
        let b = BaseAction::new(Arc::new(presets::case5().unwrap()));
        assert_eq!((&a + &b).unwrap_err(), ActionError::DifferentGrid);
    }

    #[test]
    fn flags_are_merged() {
        let g = grid();
        let a = act(&g, ActionUpdate::redispatch([(0, 1.0)]));
        let b = act(&g, ActionUpdate::change_line_status([0]));
        let c = (&a + &b).unwrap();
        assert!(c.modified().redispatch);
        assert!(c.modified().change_status);
    }

    proptest! {
        #[test]
        fn combining_follows_the_order_of_requests(
            line in 0usize..20,
            first in prop::sample::select(vec![-1, 1]),
            second in prop::sample::select(vec![-1, 1]),
            switches in 0usize..4,
            dispatch in prop::collection::vec(-5.0f32..5.0, 1..5),
        ) {
            let g = grid();
            let mut acc = act(&g, ActionUpdate::set_line_status([(line, first)]));
            let switch = act(&g, ActionUpdate::change_line_status([line]));
            for _ in 0..switches {
                acc.combine(&switch).unwrap();
            }
            let expected = if switches % 2 == 0 { first } else { -first };
            prop_assert_eq!(acc.set_line_status()[line], expected);
            prop_assert!(!acc.switch_line_status()[line]);

            let later = act(&g, ActionUpdate::set_line_status([(line, second)]));
            acc.combine(&later).unwrap();
            prop_assert_eq!(acc.set_line_status()[line], second);

            let mut total = BaseAction::new(Arc::clone(&g));
            for d in &dispatch {
                total.combine(&act(&g, ActionUpdate::redispatch([(0, *d)]))).unwrap();
            }
            let sum: f32 = dispatch.iter().sum();
            prop_assert!((total.redispatch()[0] - sum).abs() < 1e-4);
        }
    }
}
