//! Which actions an agent may build, and random sampling among them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::base::{BaseAction, Modified};
use super::error::{ActionError, IllegalAction};
use super::update::ActionUpdate;
use crate::grid::GridObjects;

/// Categories of request an action space accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionProfile {
    /// Only the empty action.
    DoNothing,
    /// Line status and bus changes.
    TopologyOnly,
    /// Topology plus redispatching.
    #[default]
    TopologyAndDispatch,
    /// Topology, redispatching and storage.
    Playable,
    /// Everything, injections and forced outages included.
    Full,
}

impl ActionProfile {
    pub const ALL: &'static [&'static str] = &[
        "do_nothing",
        "topology_only",
        "topology_and_dispatch",
        "playable",
        "full",
    ];

    fn allows_topology(self) -> bool {
        !matches!(self, ActionProfile::DoNothing)
    }

    fn allows_redispatch(self) -> bool {
        matches!(
            self,
            ActionProfile::TopologyAndDispatch | ActionProfile::Playable | ActionProfile::Full
        )
    }

    fn allows_storage(self) -> bool {
        matches!(self, ActionProfile::Playable | ActionProfile::Full)
    }

    fn allows_environment(self) -> bool {
        matches!(self, ActionProfile::Full)
    }

    /// First category in `modified` this profile forbids.
    fn forbidden(self, m: &Modified) -> Option<&'static str> {
        let checks = [
            (m.injection, self.allows_environment(), "injection"),
            (m.hazards, self.allows_environment(), "hazards"),
            (m.maintenance, self.allows_environment(), "maintenance"),
            (m.set_status, self.allows_topology(), "set_line_status"),
            (m.change_status, self.allows_topology(), "change_line_status"),
            (m.set_bus, self.allows_topology(), "set_bus"),
            (m.change_bus, self.allows_topology(), "change_bus"),
            (m.redispatch, self.allows_redispatch(), "redispatch"),
            (m.storage, self.allows_storage(), "set_storage"),
        ];
        checks
            .into_iter()
            .find(|(used, allowed, _)| *used && !*allowed)
            .map(|(_, _, name)| name)
    }
}

impl fmt::Display for ActionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionProfile::DoNothing => "do_nothing",
            ActionProfile::TopologyOnly => "topology_only",
            ActionProfile::TopologyAndDispatch => "topology_and_dispatch",
            ActionProfile::Playable => "playable",
            ActionProfile::Full => "full",
        };
        f.write_str(s)
    }
}

impl FromStr for ActionProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "do_nothing" => Ok(ActionProfile::DoNothing),
            "topology_only" => Ok(ActionProfile::TopologyOnly),
            "topology_and_dispatch" => Ok(ActionProfile::TopologyAndDispatch),
            "playable" => Ok(ActionProfile::Playable),
            "full" => Ok(ActionProfile::Full),
            other => Err(format!(
                "unknown action profile \"{other}\" (expected one of {:?})",
                ActionProfile::ALL
            )),
        }
    }
}

/// Factory for actions on one grid, restricted to a profile.
#[derive(Debug, Clone)]
pub struct ActionSpace {
    grid: Arc<GridObjects>,
    profile: ActionProfile,
}

#[derive(Debug, Clone, Copy)]
enum SampleKind {
    SetStatus,
    ChangeStatus,
    SetBus,
    ChangeBus,
    Redispatch,
    Storage,
}

impl ActionSpace {
    pub fn new(grid: Arc<GridObjects>, profile: ActionProfile) -> Self {
        Self { grid, profile }
    }

    pub fn grid(&self) -> &Arc<GridObjects> {
        &self.grid
    }

    pub fn profile(&self) -> ActionProfile {
        self.profile
    }

    pub fn do_nothing(&self) -> BaseAction {
        BaseAction::new(Arc::clone(&self.grid))
    }

    /// Builds an action from a keyword request.
    pub fn build(&self, update: &ActionUpdate) -> Result<BaseAction, ActionError> {
        let mut act = self.do_nothing();
        act.update(update)?;
        self.check_authorized(&act)?;
        Ok(act)
    }

    /// Rejects actions using a category this space does not allow.
    pub fn check_authorized(&self, action: &BaseAction) -> Result<(), IllegalAction> {
        match self.profile.forbidden(&action.modified()) {
            Some(category) => Err(IllegalAction(format!(
                "\"{category}\" is not allowed by the {} action space",
                self.profile
            ))),
            None => Ok(()),
        }
    }

    /// Length of the flat vector of the categories this space allows.
    pub fn size(&self) -> usize {
        let g = &self.grid;
        let mut n = 0;
        if self.profile.allows_environment() {
            n += 2 * g.n_load() + 2 * g.n_gen() + 2 * g.n_line();
        }
        if self.profile.allows_topology() {
            n += 2 * g.n_line() + 2 * g.dim_topo();
        }
        if self.profile.allows_redispatch() {
            n += g.n_gen();
        }
        if self.profile.allows_storage() {
            n += g.n_storage();
        }
        n
    }

    fn sample_kinds(&self) -> Vec<SampleKind> {
        let mut kinds = Vec::new();
        if self.profile.allows_topology() {
            kinds.extend([
                SampleKind::SetStatus,
                SampleKind::ChangeStatus,
                SampleKind::SetBus,
                SampleKind::ChangeBus,
            ]);
        }
        if self.profile.allows_redispatch() && self.grid.redispatching_available() {
            kinds.push(SampleKind::Redispatch);
        }
        if self.profile.allows_storage() && self.grid.n_storage() > 0 {
            kinds.push(SampleKind::Storage);
        }
        kinds
    }

    /// Draws a random unambiguous action touching a single element or
    /// substation.
    pub fn sample(&self, rng: &mut StdRng) -> BaseAction {
        let kinds = self.sample_kinds();
        if kinds.is_empty() {
            return self.do_nothing();
        }
        let g = &self.grid;
        let update = match kinds[rng.random_range(0..kinds.len())] {
            SampleKind::SetStatus => {
                let line = rng.random_range(0..g.n_line());
                let status = if rng.random_bool(0.5) { 1 } else { -1 };
                ActionUpdate::set_line_status([(line, status)])
            }
            SampleKind::ChangeStatus => {
                ActionUpdate::change_line_status([rng.random_range(0..g.n_line())])
            }
            SampleKind::SetBus => {
                let sub = rng.random_range(0..g.n_sub());
                let buses = (0..g.sub_info()[sub])
                    .map(|_| rng.random_range(1..=2))
                    .collect();
                ActionUpdate::set_substation(sub, buses)
            }
            SampleKind::ChangeBus => {
                let pos = rng.random_range(0..g.dim_topo());
                let mut mask = vec![false; g.dim_topo()];
                mask[pos] = true;
                ActionUpdate {
                    change_bus: Some(super::update::ChangeBus::Topology(mask)),
                    ..ActionUpdate::default()
                }
            }
            SampleKind::Redispatch => {
                let candidates: Vec<usize> = g
                    .generators()
                    .iter()
                    .enumerate()
                    .filter(|(_, gen_data)| gen_data.redispatchable)
                    .map(|(id, _)| id)
                    .collect();
                let id = candidates[rng.random_range(0..candidates.len())];
                let data = &g.generators()[id];
                let amount = if data.ramp_up + data.ramp_down > 0.0 {
                    rng.random_range(-data.ramp_down..=data.ramp_up)
                } else {
                    0.0
                };
                ActionUpdate::redispatch([(id, amount)])
            }
            SampleKind::Storage => {
                let id = rng.random_range(0..g.n_storage());
                let unit = &g.storage()[id];
                let power = if unit.max_p_prod + unit.max_p_absorb > 0.0 {
                    rng.random_range(-unit.max_p_prod..=unit.max_p_absorb)
                } else {
                    0.0
                };
                ActionUpdate::set_storage([(id, power)])
            }
        };
        self.build(&update).unwrap_or_else(|_| self.do_nothing())
    }
}
