//! Feed that keeps the grid's nominal injections forever.

use super::{ChronicsError, GridValue, StepInjection};
use crate::grid::GridObjects;

/// Repeats the nominal injections, with no outage, optionally for a bounded
/// number of steps.
#[derive(Debug, Clone)]
pub struct ChangeNothing {
    max_iter: Option<usize>,
    template: Option<StepInjection>,
    step: usize,
}

impl ChangeNothing {
    pub fn new(max_iter: Option<usize>) -> Self {
        Self {
            max_iter,
            template: None,
            step: 0,
        }
    }
}

impl GridValue for ChangeNothing {
    fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError> {
        let n = grid.nominal();
        let n_line = grid.n_line();
        self.template = Some(StepInjection {
            load_p: n.load_p.clone(),
            load_q: n.load_q.clone(),
            prod_p: n.prod_p.clone(),
            prod_v: n.prod_v.clone(),
            maintenance: vec![false; n_line],
            hazards: vec![false; n_line],
            time_next_maintenance: vec![-1; n_line],
            duration_next_maintenance: vec![0; n_line],
            hazard_duration: vec![0; n_line],
        });
        self.step = 0;
        Ok(())
    }

    fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError> {
        let template = self.template.as_ref().ok_or(ChronicsError::NotInitialized)?;
        if self.done() {
            return Ok(None);
        }
        self.step += 1;
        Ok(Some(template.clone()))
    }

    fn max_timestep(&self) -> Option<usize> {
        self.max_iter
    }

    fn current_step(&self) -> usize {
        self.step
    }

    fn chronics_id(&self) -> String {
        "change_nothing".to_string()
    }

    fn set_chronics(&mut self, index: usize) -> Result<(), ChronicsError> {
        if index != 0 {
            return Err(ChronicsError::UnknownChronics {
                index,
                available: 1,
            });
        }
        self.step = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::presets;

    #[test]
    fn serves_nominal_values_until_max_iter() {
        let grid = presets::case5().unwrap();
        let mut chronics = ChangeNothing::new(Some(2));
        chronics.initialize(&grid).unwrap();
        let first = chronics.load_next().unwrap().unwrap();
        assert_eq!(first.load_p, grid.nominal().load_p);
        assert!(chronics.load_next().unwrap().is_some());
        assert!(chronics.load_next().unwrap().is_none());
        chronics.next_chronics().unwrap();
        assert_eq!(chronics.current_step(), 0);
    }

    #[test]
    fn unbounded_without_max_iter() {
        let grid = presets::case5().unwrap();
        let mut chronics = ChangeNothing::new(None);
        chronics.initialize(&grid).unwrap();
        for _ in 0..1000 {
            assert!(chronics.load_next().unwrap().is_some());
        }
        assert!(!chronics.done());
    }
}
