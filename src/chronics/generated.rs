//! Synthetic chronics drawn from a seeded random generator.

use std::f32::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::data::{ChronicsData, Cursor};
use super::{ChronicsError, GridValue, StepInjection};
use crate::grid::{GenType, GridObjects};

/// Parameters of [`GeneratedChronics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationParams {
    /// Steps in each scenario.
    pub n_steps: usize,
    /// Steps in one simulated day (288 = 5 minute resolution).
    pub steps_per_day: usize,
    /// Number of scenarios, each drawn from `seed + index`.
    pub n_scenarios: usize,
    /// Relative standard deviation of the per-step load noise.
    pub load_noise: f32,
    /// Relative amplitude of the daily load swing around nominal.
    pub load_amplitude: f32,
    /// Innovation standard deviation of the wind AR(1) multiplier.
    pub wind_variability: f32,
    /// Relative standard deviation of the solar output noise.
    pub solar_noise: f32,
    /// Probability that a line gets one maintenance window on a given day.
    pub maintenance_rate: f32,
    /// Length of a maintenance window, in steps.
    pub maintenance_duration: usize,
    /// Per-line, per-step probability that a hazard starts.
    pub hazard_rate: f32,
    /// Length of a hazard, in steps.
    pub hazard_duration: usize,
    pub seed: u64,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            n_steps: 288,
            steps_per_day: 288,
            n_scenarios: 1,
            load_noise: 0.02,
            load_amplitude: 0.2,
            wind_variability: 0.1,
            solar_noise: 0.05,
            maintenance_rate: 0.0,
            maintenance_duration: 24,
            hazard_rate: 0.0,
            hazard_duration: 12,
            seed: 42,
        }
    }
}

/// AR(1) persistence of the wind multiplier.
const WIND_ALPHA: f32 = 0.9;

/// Reactive to active power ratio used when the nominal load has no P.
const DEFAULT_POWER_FACTOR_RATIO: f32 = 0.7;

/// Draws a sample from N(0, std_dev²) with the Box-Muller transform.
pub(crate) fn gaussian_noise(rng: &mut StdRng, std_dev: f32) -> f32 {
    if std_dev <= 0.0 {
        return 0.0;
    }

    let u1: f32 = rng.random::<f32>().clamp(1e-6, 1.0);
    let u2: f32 = rng.random::<f32>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    z0 * std_dev
}

/// Daily load shape in [-1, 1]: lowest at midnight, highest at noon.
fn load_shape(t: usize, steps_per_day: usize) -> f32 {
    let frac = (t % steps_per_day) as f32 / steps_per_day as f32;
    -(TAU * frac).cos()
}

/// Half-sine between 06:00 and 18:00, zero at night.
fn daylight_frac(t: usize, steps_per_day: usize) -> f32 {
    let sunrise = steps_per_day / 4;
    let sunset = 3 * steps_per_day / 4;
    let tod = t % steps_per_day;
    if tod < sunrise || tod >= sunset {
        return 0.0;
    }
    let x = (tod - sunrise) as f32 / (sunset - sunrise) as f32;
    (PI * x).sin()
}

/// Whether every substation stays reachable with the `out` lines removed.
pub(crate) fn substations_connected(grid: &GridObjects, out: &[bool]) -> bool {
    let n_sub = grid.n_sub();
    if n_sub == 0 {
        return true;
    }
    let mut seen = vec![false; n_sub];
    let mut stack = vec![0];
    seen[0] = true;
    while let Some(sub) = stack.pop() {
        for l in 0..grid.n_line() {
            if out.get(l).copied().unwrap_or(false) {
                continue;
            }
            let (or, ex) = (grid.line_or_to_subid()[l], grid.line_ex_to_subid()[l]);
            let other = if or == sub {
                ex
            } else if ex == sub {
                or
            } else {
                continue;
            };
            if !seen[other] {
                seen[other] = true;
                stack.push(other);
            }
        }
    }
    seen.into_iter().all(|s| s)
}

/// Seeded synthetic scenarios for any grid.
///
/// Loads follow a daily profile around their nominal value, solar units a
/// daylight curve and wind units an AR(1) multiplier. The remaining demand
/// is shared by the redispatchable units within their limits and ramps; what
/// they cannot cover goes to the largest other thermal-like unit. Maintenance
/// and hazards are only scheduled on lines whose outage leaves the
/// substation graph connected.
#[derive(Debug, Clone)]
pub struct GeneratedChronics {
    params: GenerationParams,
    scenarios: Vec<ChronicsData>,
    index: usize,
    grid: Option<GridObjects>,
    cursor: Option<Cursor>,
}

impl GeneratedChronics {
    pub fn new(params: GenerationParams) -> Self {
        Self {
            params,
            scenarios: Vec::new(),
            index: 0,
            grid: None,
            cursor: None,
        }
    }

    pub fn params(&self) -> &GenerationParams {
        &self.params
    }

    /// Generated scenarios, empty before [`GridValue::initialize`].
    pub fn scenarios(&self) -> &[ChronicsData] {
        &self.scenarios
    }

    /// Draws one scenario.
    pub fn generate(params: &GenerationParams, grid: &GridObjects, index: usize) -> ChronicsData {
        let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));
        let spd = params.steps_per_day.max(1);
        let n_steps = params.n_steps;
        let nominal = grid.nominal();
        let gens = grid.generators();

        let mut load_p = Vec::with_capacity(n_steps);
        let mut load_q = Vec::with_capacity(n_steps);
        for t in 0..n_steps {
            let swing = 1.0 + params.load_amplitude * load_shape(t, spd);
            let mut p_row = Vec::with_capacity(grid.n_load());
            let mut q_row = Vec::with_capacity(grid.n_load());
            for (p0, q0) in nominal.load_p.iter().zip(&nominal.load_q) {
                let noise = 1.0 + gaussian_noise(&mut rng, params.load_noise);
                let p = (p0 * swing * noise).max(0.0);
                let ratio = if *p0 > 0.0 {
                    q0 / p0
                } else {
                    DEFAULT_POWER_FACTOR_RATIO
                };
                p_row.push(p);
                q_row.push(p * ratio);
            }
            load_p.push(p_row);
            load_q.push(q_row);
        }

        let fallback = gens
            .iter()
            .enumerate()
            .filter(|(_, g)| !g.redispatchable && !g.gen_type.is_renewable())
            .max_by(|a, b| a.1.pmax.total_cmp(&b.1.pmax))
            .map(|(i, _)| i);

        let mut wind_m: Vec<f32> = gens
            .iter()
            .zip(&nominal.prod_p)
            .map(|(g, p)| if g.pmax > 0.0 { p / g.pmax } else { 0.0 })
            .collect();
        let wind_mean = wind_m.clone();

        let mut prod_p: Vec<Vec<f32>> = Vec::with_capacity(n_steps);
        for t in 0..n_steps {
            let mut row = vec![0.0; grid.n_gen()];
            for (g, data) in gens.iter().enumerate() {
                row[g] = match data.gen_type {
                    GenType::Solar => {
                        let noise = 1.0 + gaussian_noise(&mut rng, params.solar_noise);
                        (data.pmax * daylight_frac(t, spd) * noise).clamp(0.0, data.pmax)
                    }
                    GenType::Wind => {
                        let eps = gaussian_noise(&mut rng, params.wind_variability);
                        wind_m[g] = (WIND_ALPHA * wind_m[g] + (1.0 - WIND_ALPHA) * wind_mean[g] + eps)
                            .clamp(0.0, 1.0);
                        data.pmax * wind_m[g]
                    }
                    _ if data.redispatchable => 0.0,
                    _ => nominal.prod_p[g],
                };
            }

            let demand: f32 = load_p[t].iter().sum();
            let fixed: f32 = row
                .iter()
                .zip(gens)
                .filter(|(_, d)| !d.redispatchable)
                .map(|(p, _)| p)
                .sum();
            let residual = demand - fixed;

            let windows: Vec<Option<(f32, f32)>> = gens
                .iter()
                .enumerate()
                .map(|(g, d)| {
                    if !d.redispatchable {
                        return None;
                    }
                    let (mut lo, mut hi) = (d.pmin, d.pmax);
                    if let Some(prev) = prod_p.last() {
                        lo = lo.max(prev[g] - d.ramp_down);
                        hi = hi.min(prev[g] + d.ramp_up);
                    }
                    Some((lo.min(hi), hi))
                })
                .collect();
            let capacity: f32 = gens.iter().filter(|d| d.redispatchable).map(|d| d.pmax).sum();
            for (g, w) in windows.iter().enumerate() {
                if let Some((lo, hi)) = w {
                    let share = if capacity > 0.0 {
                        residual * gens[g].pmax / capacity
                    } else {
                        0.0
                    };
                    row[g] = share.clamp(*lo, *hi);
                }
            }
            let dispatched: f32 = windows
                .iter()
                .enumerate()
                .filter(|(_, w)| w.is_some())
                .map(|(g, _)| row[g])
                .sum();
            let mut leftover = residual - dispatched;

            // One proportional pass over the remaining room of each unit.
            let room: Vec<f32> = windows
                .iter()
                .enumerate()
                .map(|(g, w)| match w {
                    Some((_, hi)) if leftover > 0.0 => hi - row[g],
                    Some((lo, _)) => row[g] - lo,
                    None => 0.0,
                })
                .collect();
            let total_room: f32 = room.iter().sum();
            if total_room > 0.0 {
                let used = leftover.abs().min(total_room);
                for (g, r) in room.iter().enumerate() {
                    row[g] += leftover.signum() * used * r / total_room;
                }
                leftover -= leftover.signum() * used;
            }

            if let Some(f) = fallback {
                let d = &gens[f];
                let adjusted = (row[f] + leftover).clamp(d.pmin, d.pmax);
                leftover -= adjusted - row[f];
                row[f] = adjusted;
            }
            if leftover.abs() > 1e-3 {
                debug!(step = t, leftover, "generated production left unbalanced");
            }
            prod_p.push(row);
        }

        let prod_v = vec![nominal.prod_v.clone(); n_steps];
        let (maintenance, hazards) = Self::outages(params, grid, &mut rng);

        ChronicsData {
            name: format!("{:04}", index),
            load_p,
            load_q,
            prod_p,
            prod_v,
            maintenance,
            hazards,
        }
    }

    fn outages(
        params: &GenerationParams,
        grid: &GridObjects,
        rng: &mut StdRng,
    ) -> (Vec<Vec<bool>>, Vec<Vec<bool>>) {
        let n_steps = params.n_steps;
        let n_line = grid.n_line();
        if params.maintenance_rate <= 0.0 && params.hazard_rate <= 0.0 {
            return (Vec::new(), Vec::new());
        }
        let mut out = vec![vec![false; n_line]; n_steps];
        let mut maintenance = vec![vec![false; n_line]; n_steps];
        let mut hazards = vec![vec![false; n_line]; n_steps];

        // Tries to take `line` out over `start..end`, keeping the grid whole.
        let mut schedule = |line: usize, start: usize, len: usize, target: &mut Vec<Vec<bool>>| {
            let end = (start + len).min(n_steps);
            if start >= end {
                return;
            }
            let fits = (start..end).all(|t| {
                if out[t][line] {
                    return false;
                }
                let mut trial = out[t].clone();
                trial[line] = true;
                substations_connected(grid, &trial)
            });
            if fits {
                for t in start..end {
                    out[t][line] = true;
                    target[t][line] = true;
                }
            }
        };

        let spd = params.steps_per_day.max(1);
        if params.maintenance_rate > 0.0 && params.maintenance_duration > 0 {
            let n_days = n_steps.div_ceil(spd);
            for day in 0..n_days {
                for line in 0..n_line {
                    if rng.random::<f32>() >= params.maintenance_rate {
                        continue;
                    }
                    // Maintenance starts during working hours.
                    let earliest = spd / 4;
                    let latest = (3 * spd / 4).max(earliest + 1);
                    let start = day * spd + rng.random_range(earliest..latest);
                    schedule(line, start, params.maintenance_duration, &mut maintenance);
                }
            }
        }
        if params.hazard_rate > 0.0 && params.hazard_duration > 0 {
            for t in 0..n_steps {
                for line in 0..n_line {
                    if rng.random::<f32>() < params.hazard_rate {
                        schedule(line, t, params.hazard_duration, &mut hazards);
                    }
                }
            }
        }
        (maintenance, hazards)
    }

    fn load_current(&mut self) -> Result<(), ChronicsError> {
        let grid = self.grid.as_ref().ok_or(ChronicsError::NotInitialized)?;
        let data = self.scenarios[self.index].clone();
        self.cursor = Some(Cursor::new(data, grid)?);
        Ok(())
    }
}

impl GridValue for GeneratedChronics {
    fn initialize(&mut self, grid: &GridObjects) -> Result<(), ChronicsError> {
        let n = self.params.n_scenarios.max(1);
        debug!(scenarios = n, steps = self.params.n_steps, "generating chronics");
        self.scenarios = (0..n)
            .map(|i| Self::generate(&self.params, grid, i))
            .collect();
        self.grid = Some(grid.clone());
        self.index = 0;
        self.load_current()
    }

    fn load_next(&mut self) -> Result<Option<StepInjection>, ChronicsError> {
        let cursor = self.cursor.as_mut().ok_or(ChronicsError::NotInitialized)?;
        Ok(cursor.next())
    }

    fn max_timestep(&self) -> Option<usize> {
        Some(self.params.n_steps)
    }

    fn current_step(&self) -> usize {
        self.cursor.as_ref().map_or(0, Cursor::step)
    }

    fn chronics_id(&self) -> String {
        self.cursor
            .as_ref()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| format!("{:04}", self.index))
    }

    fn n_chronics(&self) -> usize {
        self.params.n_scenarios.max(1)
    }

    fn current_index(&self) -> usize {
        self.index
    }

    fn set_chronics(&mut self, index: usize) -> Result<(), ChronicsError> {
        if index >= self.n_chronics() {
            return Err(ChronicsError::UnknownChronics {
                index,
                available: self.n_chronics(),
            });
        }
        self.index = index;
        self.load_current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::presets;

    fn params(n_steps: usize) -> GenerationParams {
        GenerationParams {
            n_steps,
            ..GenerationParams::default()
        }
    }

    #[test]
    fn gaussian_noise_zero_std_is_zero() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(gaussian_noise(&mut rng, 0.0), 0.0);
        assert_eq!(gaussian_noise(&mut rng, -1.0), 0.0);
    }

    #[test]
    fn load_peaks_at_noon() {
        assert!((load_shape(0, 288) + 1.0).abs() < 1e-6);
        assert!((load_shape(144, 288) - 1.0).abs() < 1e-5);
        assert_eq!(daylight_frac(0, 288), 0.0);
        assert!(daylight_frac(144, 288) > 0.99);
        assert_eq!(daylight_frac(230, 288), 0.0);
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let grid = presets::case14().unwrap();
        let a = GeneratedChronics::generate(&params(48), &grid, 0);
        let b = GeneratedChronics::generate(&params(48), &grid, 0);
        let c = GeneratedChronics::generate(&params(48), &grid, 1);
        assert_eq!(a, b);
        assert_ne!(a.load_p, c.load_p);
        a.check_validity(&grid).unwrap();
    }

    #[test]
    fn production_respects_limits_and_ramps() {
        let grid = presets::case14().unwrap();
        let data = GeneratedChronics::generate(&params(288), &grid, 0);
        for (t, row) in data.prod_p.iter().enumerate() {
            for (g, p) in row.iter().enumerate() {
                let d = &grid.generators()[g];
                assert!(*p >= d.pmin - 1e-3 && *p <= d.pmax + 1e-3, "gen {g} at {t}: {p}");
                if d.redispatchable && t > 0 {
                    let prev = data.prod_p[t - 1][g];
                    assert!(*p - prev <= d.ramp_up + 1e-3);
                    assert!(prev - *p <= d.ramp_down + 1e-3);
                }
            }
        }
    }

    #[test]
    fn production_roughly_follows_demand() {
        let grid = presets::case14().unwrap();
        let data = GeneratedChronics::generate(&params(60), &grid, 0);
        for t in 0..60 {
            let demand: f32 = data.load_p[t].iter().sum();
            let prod: f32 = data.prod_p[t].iter().sum();
            assert!((demand - prod).abs() < 0.1 * demand, "step {t}: {demand} vs {prod}");
        }
    }

    #[test]
    fn outages_keep_the_grid_connected() {
        let grid = presets::case14().unwrap();
        let p = GenerationParams {
            n_steps: 288,
            maintenance_rate: 0.5,
            hazard_rate: 0.01,
            ..GenerationParams::default()
        };
        let data = GeneratedChronics::generate(&p, &grid, 0);
        assert!(data.maintenance.iter().flatten().any(|m| *m));
        for t in 0..288 {
            let out: Vec<bool> = (0..grid.n_line())
                .map(|l| data.maintenance[t][l] || data.hazards[t][l])
                .collect();
            assert!(substations_connected(&grid, &out), "split at step {t}");
        }
    }

    #[test]
    fn cycles_through_scenarios() {
        let grid = presets::case5().unwrap();
        let mut chronics = GeneratedChronics::new(GenerationParams {
            n_steps: 3,
            n_scenarios: 2,
            ..GenerationParams::default()
        });
        chronics.initialize(&grid).unwrap();
        assert_eq!(chronics.chronics_id(), "0000");
        for _ in 0..3 {
            assert!(chronics.load_next().unwrap().is_some());
        }
        assert!(chronics.load_next().unwrap().is_none());
        assert!(chronics.done());
        chronics.next_chronics().unwrap();
        assert_eq!(chronics.chronics_id(), "0001");
        assert_eq!(chronics.current_step(), 0);
        chronics.next_chronics().unwrap();
        assert_eq!(chronics.chronics_id(), "0000");
    }

    #[test]
    fn substation_graph_connectivity() {
        let grid = presets::case5().unwrap();
        let none = vec![false; grid.n_line()];
        assert!(substations_connected(&grid, &none));
        // Substation 4 is only reached through lines 3 and 7.
        let mut cut = none.clone();
        cut[3] = true;
        cut[7] = true;
        assert!(!substations_connected(&grid, &cut));
    }
}
