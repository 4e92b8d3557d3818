//! Energy bookkeeping of storage units.

use crate::grid::StorageData;

/// Charge and power of every storage unit.
///
/// Powers use the load convention: positive absorbs from the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageState {
    /// Stored energy (MWh).
    pub charge: Vec<f32>,
    /// Power requested for the current step (MW).
    pub target: Vec<f32>,
    /// Power actually exchanged during the current step (MW).
    pub power: Vec<f32>,
}

impl StorageState {
    pub fn new(units: &[StorageData]) -> Self {
        Self {
            charge: units.iter().map(StorageData::initial_charge).collect(),
            target: vec![0.0; units.len()],
            power: vec![0.0; units.len()],
        }
    }

    pub fn reset(&mut self, units: &[StorageData]) {
        *self = Self::new(units);
    }

    pub fn total_power(&self) -> f32 {
        self.power.iter().sum()
    }

    /// Moves every unit by one step of `dt_hours`, honouring power limits,
    /// energy bounds and efficiencies.
    pub fn step(&mut self, units: &[StorageData], requested: &[f32], dt_hours: f32) {
        for (i, unit) in units.iter().enumerate() {
            let cmd = requested.get(i).copied().filter(|p| p.is_finite()).unwrap_or(0.0);
            self.target[i] = cmd;
            let cmd = cmd.clamp(-unit.max_p_prod, unit.max_p_absorb);
            let charge = self.charge[i];

            let actual = if cmd > 0.0 && unit.charging_efficiency > 0.0 {
                let room = (unit.emax - charge).max(0.0);
                let max_p = room / (dt_hours * unit.charging_efficiency);
                let p = cmd.min(max_p);
                self.charge[i] += p * dt_hours * unit.charging_efficiency;
                p
            } else if cmd < 0.0 {
                let available = (charge - unit.emin).max(0.0);
                let max_p = available * unit.discharging_efficiency / dt_hours;
                let p = (-cmd).min(max_p);
                self.charge[i] -= p * dt_hours / unit.discharging_efficiency;
                -p
            } else {
                0.0
            };
            self.power[i] = actual;
            self.charge[i] = (self.charge[i] - unit.loss * dt_hours).clamp(0.0, unit.emax);
        }
    }
}
