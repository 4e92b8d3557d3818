//! Zero-sum redispatching of the controllable generators.
//!
//! The agent asks for cumulative offsets (the *target* dispatch). Each step
//! they are clipped into what every unit can physically do and rebalanced so
//! that generation offsets add up to the storage consumption; the result is
//! the *actual* dispatch added to the scheduled production.

use thiserror::Error;

use crate::grid::GeneratorData;

/// Imbalance below which a dispatch counts as balanced (MW).
pub const BALANCE_TOLERANCE: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RedispatchError {
    #[error("expected {expected} {what} values, got {got}")]
    WrongLength {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("redispatching cannot be balanced: {residual:.3} MW left over")]
    Infeasible { residual: f32 },
}

/// Admissible offset `[lo, hi]` of one unit around its scheduled output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub lo: f32,
    pub hi: f32,
}

impl Window {
    fn clip(self, v: f32) -> f32 {
        v.clamp(self.lo, self.hi)
    }
}

/// Offset window of a unit scheduled at `p` that produced `previous` at the
/// last step. Ramp limits are narrowed into the physical limits, so the
/// physical limits win when both cannot be met.
pub fn window(data: &GeneratorData, p: f32, previous: Option<f32>) -> Window {
    let phys_lo = data.pmin - p;
    let phys_hi = data.pmax - p;
    match previous {
        Some(prev) => Window {
            lo: (prev - data.ramp_down - p).clamp(phys_lo, phys_hi),
            hi: (prev + data.ramp_up - p).clamp(phys_lo, phys_hi),
        },
        None => Window {
            lo: phys_lo,
            hi: phys_hi,
        },
    }
}

/// Target and actual dispatch, both kept across steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Redispatcher {
    target: Vec<f32>,
    actual: Vec<f32>,
}

impl Redispatcher {
    pub fn new(n_gen: usize) -> Self {
        Self {
            target: vec![0.0; n_gen],
            actual: vec![0.0; n_gen],
        }
    }

    pub fn reset(&mut self) {
        self.target.iter_mut().for_each(|v| *v = 0.0);
        self.actual.iter_mut().for_each(|v| *v = 0.0);
    }

    pub fn target_dispatch(&self) -> &[f32] {
        &self.target
    }

    pub fn actual_dispatch(&self) -> &[f32] {
        &self.actual
    }

    /// Accumulates a redispatch request into the target. Non-finite entries
    /// are ignored.
    pub fn add_target(&mut self, redispatch: &[f32]) -> Result<(), RedispatchError> {
        if redispatch.len() != self.target.len() {
            return Err(RedispatchError::WrongLength {
                what: "redispatch",
                expected: self.target.len(),
                got: redispatch.len(),
            });
        }
        for (t, r) in self.target.iter_mut().zip(redispatch) {
            if r.is_finite() {
                *t += r;
            }
        }
        Ok(())
    }

    /// Replaces the target, e.g. to revert a request that could not be met.
    pub fn set_target(&mut self, target: Vec<f32>) -> Result<(), RedispatchError> {
        if target.len() != self.target.len() {
            return Err(RedispatchError::WrongLength {
                what: "target",
                expected: self.target.len(),
                got: target.len(),
            });
        }
        self.target = target;
        Ok(())
    }

    /// Computes the actual dispatch for the current target without storing
    /// it.
    ///
    /// `scheduled` is the production the chronics ask for, `previous` the
    /// production of the last step (`None` right after a reset) and
    /// `storage_power` the total power absorbed by storage units.
    pub fn compute(
        &self,
        gens: &[GeneratorData],
        scheduled: &[f32],
        previous: Option<&[f32]>,
        storage_power: f32,
    ) -> Result<Vec<f32>, RedispatchError> {
        let n = self.target.len();
        for (what, got) in [("generator", gens.len()), ("scheduled", scheduled.len())] {
            if got != n {
                return Err(RedispatchError::WrongLength {
                    what,
                    expected: n,
                    got,
                });
            }
        }
        if let Some(prev) = previous {
            if prev.len() != n {
                return Err(RedispatchError::WrongLength {
                    what: "previous",
                    expected: n,
                    got: prev.len(),
                });
            }
        }

        let mut actual = vec![0.0; n];
        if !gens.iter().any(|g| g.redispatchable) {
            // Without controllable units the slack takes the storage balance.
            return Ok(actual);
        }

        let windows: Vec<Option<Window>> = gens
            .iter()
            .enumerate()
            .map(|(g, data)| {
                data.redispatchable
                    .then(|| window(data, scheduled[g], previous.map(|p| p[g])))
            })
            .collect();
        for (g, w) in windows.iter().enumerate() {
            if let Some(w) = w {
                actual[g] = w.clip(self.target[g]);
            }
        }

        let untargeted: Vec<bool> = windows
            .iter()
            .zip(&self.target)
            .map(|(w, t)| w.is_some() && *t == 0.0)
            .collect();
        let everyone: Vec<bool> = windows.iter().map(Option::is_some).collect();

        let mut residual = storage_power - actual.iter().sum::<f32>();
        for group in [&untargeted, &everyone] {
            if residual.abs() <= BALANCE_TOLERANCE {
                break;
            }
            residual = spread(residual, &mut actual, &windows, group);
        }
        if residual.abs() > BALANCE_TOLERANCE {
            return Err(RedispatchError::Infeasible { residual });
        }
        Ok(actual)
    }

    /// Computes and stores the actual dispatch. On error the previous actual
    /// dispatch is kept.
    pub fn apply(
        &mut self,
        gens: &[GeneratorData],
        scheduled: &[f32],
        previous: Option<&[f32]>,
        storage_power: f32,
    ) -> Result<(), RedispatchError> {
        self.actual = self.compute(gens, scheduled, previous, storage_power)?;
        Ok(())
    }
}

/// Shares `amount` among the `members`, proportionally to the room each has
/// left in the direction of `amount`. Returns what could not be placed.
fn spread(amount: f32, actual: &mut [f32], windows: &[Option<Window>], members: &[bool]) -> f32 {
    let room: Vec<f32> = windows
        .iter()
        .enumerate()
        .map(|(g, w)| match w {
            Some(w) if members[g] && amount > 0.0 => (w.hi - actual[g]).max(0.0),
            Some(w) if members[g] => (actual[g] - w.lo).max(0.0),
            _ => 0.0,
        })
        .collect();
    let total: f32 = room.iter().sum();
    if total <= 0.0 {
        return amount;
    }
    let placed = amount.abs().min(total);
    for (g, r) in room.iter().enumerate() {
        if *r > 0.0 {
            let delta = amount.signum() * placed * r / total;
            actual[g] = windows[g].map_or(actual[g] + delta, |w| w.clip(actual[g] + delta));
        }
    }
    amount - amount.signum() * placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GenType;
    use proptest::prelude::*;

    fn fleet() -> Vec<GeneratorData> {
        vec![
            GeneratorData::dispatchable(GenType::Thermal, 0.0, 100.0, 10.0, 30.0),
            GeneratorData::dispatchable(GenType::Hydro, 0.0, 80.0, 5.0, 20.0),
            GeneratorData::fixed(GenType::Wind, 50.0),
            GeneratorData::dispatchable(GenType::Thermal, 10.0, 60.0, 20.0, 40.0),
        ]
    }

    #[test]
    fn window_narrows_ramps_into_physical_limits() {
        let data = GeneratorData::dispatchable(GenType::Thermal, 0.0, 100.0, 10.0, 30.0);
        let w = window(&data, 50.0, Some(50.0));
        assert_eq!(w, Window { lo: -10.0, hi: 10.0 });
        let w = window(&data, 95.0, Some(95.0));
        assert_eq!(w, Window { lo: -10.0, hi: 5.0 });
        let w = window(&data, 50.0, None);
        assert_eq!(w, Window { lo: -50.0, hi: 50.0 });
        // Schedule 50 MW above the last output: the unit reaches 40 to 60 MW.
        let w = window(&data, 100.0, Some(50.0));
        assert_eq!(w, Window { lo: -60.0, hi: -50.0 });
        // Ramping up from 100 MW is capped by pmax.
        let w = window(&data, 5.0, Some(100.0));
        assert_eq!(w, Window { lo: 85.0, hi: 95.0 });
    }

    #[test]
    fn target_is_compensated_by_the_other_units() {
        let gens = fleet();
        let mut r = Redispatcher::new(gens.len());
        r.add_target(&[5.0, 0.0, 0.0, 0.0]).unwrap();
        let p = [50.0, 40.0, 20.0, 30.0];
        r.apply(&gens, &p, Some(&p), 0.0).unwrap();
        let actual = r.actual_dispatch();
        assert_eq!(actual[0], 5.0);
        assert_eq!(actual[2], 0.0);
        assert!((actual.iter().sum::<f32>()).abs() < BALANCE_TOLERANCE);
        // Compensation follows the remaining room (5 MW down on unit 1,
        // 20 MW down on unit 3).
        assert!((actual[1] + 1.0).abs() < 1e-4);
        assert!((actual[3] + 4.0).abs() < 1e-4);
    }

    #[test]
    fn target_is_clipped_to_the_ramp() {
        let gens = fleet();
        let mut r = Redispatcher::new(gens.len());
        r.add_target(&[30.0, 0.0, 0.0, 0.0]).unwrap();
        let p = [50.0, 40.0, 20.0, 30.0];
        r.apply(&gens, &p, Some(&p), 0.0).unwrap();
        assert_eq!(r.actual_dispatch()[0], 10.0);
        assert_eq!(r.target_dispatch()[0], 30.0);
    }

    #[test]
    fn targets_persist_until_cancelled() {
        let gens = fleet();
        let mut r = Redispatcher::new(gens.len());
        let p = [50.0, 40.0, 20.0, 30.0];
        r.add_target(&[5.0, 0.0, 0.0, 0.0]).unwrap();
        r.apply(&gens, &p, Some(&p), 0.0).unwrap();
        r.add_target(&[0.0; 4]).unwrap();
        r.apply(&gens, &p, Some(&p), 0.0).unwrap();
        assert_eq!(r.actual_dispatch()[0], 5.0);
        r.add_target(&[-5.0, 0.0, 0.0, 0.0]).unwrap();
        r.apply(&gens, &p, Some(&p), 0.0).unwrap();
        assert!(r.actual_dispatch().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn storage_consumption_is_covered() {
        let gens = fleet();
        let r = Redispatcher::new(gens.len());
        let p = [50.0, 40.0, 20.0, 30.0];
        let actual = r.compute(&gens, &p, Some(&p), 6.0).unwrap();
        assert!((actual.iter().sum::<f32>() - 6.0).abs() < BALANCE_TOLERANCE);
        assert_eq!(actual[2], 0.0);
    }

    #[test]
    fn targeted_units_give_back_when_the_others_are_short() {
        let gens = vec![
            GeneratorData::dispatchable(GenType::Thermal, 0.0, 100.0, 10.0, 30.0),
            GeneratorData::dispatchable(GenType::Hydro, 0.0, 80.0, 1.0, 20.0),
        ];
        let mut r = Redispatcher::new(2);
        r.add_target(&[10.0, 0.0]).unwrap();
        let p = [50.0, 40.0];
        let actual = r.compute(&gens, &p, Some(&p), 0.0).unwrap();
        assert!((actual[0] - 1.0).abs() < 1e-4);
        assert!((actual[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn infeasible_when_capacity_is_short() {
        let gens = vec![
            GeneratorData::dispatchable(GenType::Thermal, 0.0, 100.0, 10.0, 30.0),
            GeneratorData::dispatchable(GenType::Hydro, 0.0, 80.0, 1.0, 20.0),
        ];
        let mut r = Redispatcher::new(2);
        let p = [50.0, 40.0];
        let err = r.compute(&gens, &p, Some(&p), 30.0).unwrap_err();
        assert!(matches!(err, RedispatchError::Infeasible { residual } if (residual - 19.0).abs() < 1e-3));
        assert!(r.apply(&gens, &p, Some(&p), 30.0).is_err());
        assert!(r.actual_dispatch().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn rejects_wrong_lengths() {
        let mut r = Redispatcher::new(3);
        assert!(r.add_target(&[1.0]).is_err());
        assert!(r.set_target(vec![0.0; 2]).is_err());
        let gens = fleet();
        assert!(r.compute(&gens, &[0.0; 4], None, 0.0).is_err());
    }

    #[test]
    fn no_controllable_unit_leaves_balance_to_the_slack() {
        let gens = vec![GeneratorData::fixed(GenType::Nuclear, 100.0)];
        let r = Redispatcher::new(1);
        assert_eq!(r.compute(&gens, &[50.0], None, 5.0).unwrap(), vec![0.0]);
    }

    proptest! {
        #[test]
        fn balanced_dispatch_stays_within_windows(
            sched in prop::collection::vec(10.0f32..50.0, 4),
            drift in prop::collection::vec(-5.0f32..5.0, 4),
            target in prop::collection::vec(-15.0f32..15.0, 4),
            storage in -3.0f32..3.0,
        ) {
            let gens = fleet();
            let previous: Vec<f32> = sched.iter().zip(&drift).map(|(p, d)| p + d).collect();
            let mut r = Redispatcher::new(4);
            r.set_target(target).unwrap();
            if let Ok(actual) = r.compute(&gens, &sched, Some(&previous), storage) {
                prop_assert!((actual.iter().sum::<f32>() - storage).abs() <= 1e-2);
                for (g, data) in gens.iter().enumerate() {
                    if !data.redispatchable {
                        prop_assert_eq!(actual[g], 0.0);
                        continue;
                    }
                    let w = window(data, sched[g], Some(previous[g]));
                    prop_assert!(actual[g] >= w.lo - 1e-4 && actual[g] <= w.hi + 1e-4);
                }
            }
        }
    }
}
