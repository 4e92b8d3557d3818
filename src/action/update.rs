//! Keyword-style action requests and how they are applied.
//!
//! An [`ActionUpdate`] deserializes from JSON or TOML, e.g.
//! `{"redispatch": [[0, 5.0], ["gen_2_1", -5.0]]}` or
//! `{"set_bus": {"lines_or_id": [[3, 2]]}}`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::base::BaseAction;
use super::error::{ActionError, AmbiguousAction, IllegalAction};
use crate::grid::ObjectType;

/// An element named by index or by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElementKey {
    Id(i64),
    Name(String),
}

impl From<usize> for ElementKey {
    fn from(id: usize) -> Self {
        ElementKey::Id(id as i64)
    }
}

impl From<&str> for ElementKey {
    fn from(name: &str) -> Self {
        ElementKey::Name(name.to_string())
    }
}

/// Values for one kind of element: either one per element, or a list of
/// `(element, value)` pairs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values<T> {
    Full(Vec<T>),
    Pairs(Vec<(ElementKey, T)>),
}

/// Elements to toggle: a mask over every element, or a list of elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Toggle {
    Mask(Vec<bool>),
    Ids(Vec<ElementKey>),
}

/// New injections, per quantity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InjectionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_p: Option<Values<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_q: Option<Values<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_p: Option<Values<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prod_v: Option<Values<f32>>,
}

/// Bus assignment, per element kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    deny_unknown_fields,
    bound(deserialize = "V: Deserialize<'de>, S: Deserialize<'de>")
)]
pub struct BusSelection<V, S> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loads_id: Option<V>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generators_id: Option<V>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_or_id: Option<V>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_ex_id: Option<V>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storages_id: Option<V>,
    /// `(substation, one value per element of the substation)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substations_id: Option<Vec<(usize, Vec<S>)>>,
}

impl<V, S> Default for BusSelection<V, S> {
    fn default() -> Self {
        Self {
            loads_id: None,
            generators_id: None,
            lines_or_id: None,
            lines_ex_id: None,
            storages_id: None,
            substations_id: None,
        }
    }
}

impl<V, S> BusSelection<V, S> {
    fn is_empty(&self) -> bool {
        self.loads_id.is_none()
            && self.generators_id.is_none()
            && self.lines_or_id.is_none()
            && self.lines_ex_id.is_none()
            && self.storages_id.is_none()
            && self.substations_id.is_none()
    }

    fn by_kind(&self) -> [(ObjectType, Option<&V>); 5] {
        [
            (ObjectType::Load, self.loads_id.as_ref()),
            (ObjectType::Generator, self.generators_id.as_ref()),
            (ObjectType::LineOr, self.lines_or_id.as_ref()),
            (ObjectType::LineEx, self.lines_ex_id.as_ref()),
            (ObjectType::Storage, self.storages_id.as_ref()),
        ]
    }
}

/// `set_bus` request: the whole topology vector or a per-kind selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetBus {
    Topology(Vec<i32>),
    Select(BusSelection<Values<i32>, i32>),
}

/// `change_bus` request: a mask over the topology vector or a per-kind
/// selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChangeBus {
    Topology(Vec<bool>),
    Select(BusSelection<Toggle, bool>),
}

/// Keyword description of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injection: Option<InjectionUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_bus: Option<SetBus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_bus: Option<ChangeBus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_line_status: Option<Values<i32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hazards: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_line_status: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redispatch: Option<Values<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_storage: Option<Values<f32>>,
}

impl ActionUpdate {
    /// Redispatch request from `(generator, MW)` pairs.
    pub fn redispatch(pairs: impl IntoIterator<Item = (usize, f32)>) -> Self {
        Self {
            redispatch: Some(Values::Pairs(
                pairs.into_iter().map(|(g, v)| (g.into(), v)).collect(),
            )),
            ..Self::default()
        }
    }

    /// Storage set points from `(unit, MW)` pairs.
    pub fn set_storage(pairs: impl IntoIterator<Item = (usize, f32)>) -> Self {
        Self {
            set_storage: Some(Values::Pairs(
                pairs.into_iter().map(|(s, v)| (s.into(), v)).collect(),
            )),
            ..Self::default()
        }
    }

    /// Forced line status from `(line, -1 | 1)` pairs.
    pub fn set_line_status(pairs: impl IntoIterator<Item = (usize, i32)>) -> Self {
        Self {
            set_line_status: Some(Values::Pairs(
                pairs.into_iter().map(|(l, v)| (l.into(), v)).collect(),
            )),
            ..Self::default()
        }
    }

    /// Status switch of the given lines.
    pub fn change_line_status(lines: impl IntoIterator<Item = usize>) -> Self {
        Self {
            change_line_status: Some(Toggle::Ids(lines.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Bus assignment of one substation, one value per element.
    pub fn set_substation(sub: usize, buses: Vec<i32>) -> Self {
        Self {
            set_bus: Some(SetBus::Select(BusSelection {
                substations_id: Some(vec![(sub, buses)]),
                ..BusSelection::default()
            })),
            ..Self::default()
        }
    }

    /// Bus assignment of elements of one kind from `(element, bus)` pairs.
    pub fn set_bus_of(kind: ObjectType, pairs: impl IntoIterator<Item = (usize, i32)>) -> Self {
        let values = Some(Values::Pairs(
            pairs.into_iter().map(|(id, b)| (id.into(), b)).collect(),
        ));
        let mut sel = BusSelection::default();
        match kind {
            ObjectType::Load => sel.loads_id = values,
            ObjectType::Generator => sel.generators_id = values,
            ObjectType::LineOr => sel.lines_or_id = values,
            ObjectType::LineEx => sel.lines_ex_id = values,
            ObjectType::Storage => sel.storages_id = values,
        }
        Self {
            set_bus: Some(SetBus::Select(sel)),
            ..Self::default()
        }
    }

    /// Bus switch of elements of one kind.
    pub fn change_bus_of(kind: ObjectType, ids: impl IntoIterator<Item = usize>) -> Self {
        let toggle = Some(Toggle::Ids(ids.into_iter().map(Into::into).collect()));
        let mut sel = BusSelection::default();
        match kind {
            ObjectType::Load => sel.loads_id = toggle,
            ObjectType::Generator => sel.generators_id = toggle,
            ObjectType::LineOr => sel.lines_or_id = toggle,
            ObjectType::LineEx => sel.lines_ex_id = toggle,
            ObjectType::Storage => sel.storages_id = toggle,
        }
        Self {
            change_bus: Some(ChangeBus::Select(sel)),
            ..Self::default()
        }
    }

    /// Whether the update names no category at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn resolve(key: &ElementKey, names: &[String], what: &str) -> Result<usize, IllegalAction> {
    match key {
        ElementKey::Id(id) if *id < 0 => Err(IllegalAction(format!(
            "{what} id {id} is negative"
        ))),
        ElementKey::Id(id) => {
            let id = *id as usize;
            if id >= names.len() {
                Err(IllegalAction(format!(
                    "{what} id {id} is out of range (there are {} of them)",
                    names.len()
                )))
            } else {
                Ok(id)
            }
        }
        ElementKey::Name(name) => names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| IllegalAction(format!("no {what} named \"{name}\""))),
    }
}

fn assign_int(
    target: &mut [i32],
    values: &Values<i32>,
    (min, max): (i32, i32),
    names: &[String],
    what: &str,
) -> Result<(), IllegalAction> {
    let check = |v: i32| {
        if v < min || v > max {
            Err(IllegalAction(format!(
                "{what}: value {v} outside [{min}, {max}]"
            )))
        } else {
            Ok(())
        }
    };
    match values {
        Values::Full(v) => {
            if v.len() != target.len() {
                return Err(IllegalAction(format!(
                    "{what}: expected {} values, got {}",
                    target.len(),
                    v.len()
                )));
            }
            for &x in v {
                check(x)?;
            }
            target.copy_from_slice(v);
        }
        Values::Pairs(pairs) => {
            for (key, v) in pairs {
                let id = resolve(key, names, what)?;
                check(*v)?;
                target[id] = *v;
            }
        }
    }
    Ok(())
}

fn assign_float(
    target: &mut [f32],
    values: &Values<f32>,
    names: &[String],
    what: &str,
) -> Result<(), IllegalAction> {
    match values {
        Values::Full(v) => {
            if v.len() != target.len() {
                return Err(IllegalAction(format!(
                    "{what}: expected {} values, got {}",
                    target.len(),
                    v.len()
                )));
            }
            for (t, x) in target.iter_mut().zip(v) {
                if x.is_finite() {
                    *t = *x;
                }
            }
        }
        Values::Pairs(pairs) => {
            for (key, v) in pairs {
                let id = resolve(key, names, what)?;
                if !v.is_finite() {
                    return Err(IllegalAction(format!("{what} {id}: value {v} is not finite")));
                }
                target[id] = *v;
            }
        }
    }
    Ok(())
}

fn toggle(target: &mut [bool], t: &Toggle, names: &[String], what: &str) -> Result<(), IllegalAction> {
    for id in selected(t, target.len(), names, what)? {
        target[id] = !target[id];
    }
    Ok(())
}

/// Distinct element ids named by a toggle.
fn selected(t: &Toggle, n: usize, names: &[String], what: &str) -> Result<BTreeSet<usize>, IllegalAction> {
    match t {
        Toggle::Mask(mask) => {
            if mask.len() != n {
                return Err(IllegalAction(format!(
                    "{what}: expected a mask of {n} values, got {}",
                    mask.len()
                )));
            }
            Ok(mask
                .iter()
                .enumerate()
                .filter(|(_, m)| **m)
                .map(|(i, _)| i)
                .collect())
        }
        Toggle::Ids(ids) => ids.iter().map(|k| resolve(k, names, what)).collect(),
    }
}

const BUS_RANGE: (i32, i32) = (-1, 2);
const STATUS_RANGE: (i32, i32) = (-1, 1);

impl BaseAction {
    /// Applies a keyword request. On error the action is left unchanged.
    pub fn update(&mut self, update: &ActionUpdate) -> Result<(), ActionError> {
        let mut next = self.clone();
        next.apply(update)?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, u: &ActionUpdate) -> Result<(), ActionError> {
        if let Some(inj) = &u.injection {
            self.apply_injection(inj)?;
        }
        if let Some(set_bus) = &u.set_bus {
            self.apply_set_bus(set_bus)?;
        }
        if let Some(change_bus) = &u.change_bus {
            self.apply_change_bus(change_bus)?;
        }
        if let Some(status) = &u.set_line_status {
            let names = self.grid.name_line().to_vec();
            assign_int(&mut self.set_line_status, status, STATUS_RANGE, &names, "powerline")?;
            self.modified.set_status = true;
        }
        if let Some(hazards) = &u.hazards {
            let lines = self.forced_lines(hazards)?;
            for &l in &lines {
                self.hazards[l] = true;
            }
            self.disconnect_lines(&lines);
            self.modified.hazards = true;
        }
        if let Some(maintenance) = &u.maintenance {
            let lines = self.forced_lines(maintenance)?;
            for &l in &lines {
                self.maintenance[l] = true;
            }
            self.disconnect_lines(&lines);
            self.modified.maintenance = true;
        }
        if let Some(change) = &u.change_line_status {
            let names = self.grid.name_line().to_vec();
            toggle(&mut self.switch_line_status, change, &names, "powerline")?;
            self.modified.change_status = true;
        }
        if let Some(redispatch) = &u.redispatch {
            let names = self.grid.name_gen().to_vec();
            assign_float(&mut self.redispatch, redispatch, &names, "generator")?;
            self.modified.redispatch = true;
        }
        if let Some(storage) = &u.set_storage {
            if self.grid.n_storage() == 0 {
                return Err(IllegalAction("there is no storage unit on this grid".to_string()).into());
            }
            let names = self.grid.name_storage().to_vec();
            assign_float(&mut self.storage_power, storage, &names, "storage unit")?;
            self.modified.storage = true;
        }
        Ok(())
    }

    fn apply_injection(&mut self, inj: &InjectionUpdate) -> Result<(), ActionError> {
        let grid = std::sync::Arc::clone(&self.grid);
        let parts = [
            ("load_p", inj.load_p.as_ref(), grid.name_load()),
            ("load_q", inj.load_q.as_ref(), grid.name_load()),
            ("prod_p", inj.prod_p.as_ref(), grid.name_gen()),
            ("prod_v", inj.prod_v.as_ref(), grid.name_gen()),
        ];
        for (key, values, names) in parts {
            let Some(values) = values else { continue };
            let Some(slot) = self.injection.slot_mut(key) else {
                continue;
            };
            let current = slot.get_or_insert_with(|| vec![f32::NAN; names.len()]);
            assign_float(current, values, names, key)?;
        }
        self.modified.injection = !self.injection.is_empty();
        Ok(())
    }

    fn apply_set_bus(&mut self, set_bus: &SetBus) -> Result<(), ActionError> {
        let grid = std::sync::Arc::clone(&self.grid);
        match set_bus {
            SetBus::Topology(v) => {
                let names: Vec<String> = (0..grid.dim_topo()).map(|p| p.to_string()).collect();
                assign_int(
                    &mut self.set_topo_vect,
                    &Values::Full(v.clone()),
                    BUS_RANGE,
                    &names,
                    "topology",
                )?;
            }
            SetBus::Select(sel) => {
                if sel.is_empty() {
                    return Err(AmbiguousAction::EmptySelection.into());
                }
                for (kind, values) in sel.by_kind() {
                    let Some(values) = values else { continue };
                    let pos = grid.pos_topo_vect(kind);
                    let mut view: Vec<i32> = pos.iter().map(|&p| self.set_topo_vect[p]).collect();
                    assign_int(&mut view, values, BUS_RANGE, grid.names(kind), &kind.to_string())?;
                    for (&p, v) in pos.iter().zip(view) {
                        self.set_topo_vect[p] = v;
                    }
                }
                for (sub, buses) in sel.substations_id.iter().flatten() {
                    let range = self.substation_range(*sub, buses.len())?;
                    if let Some(bad) = buses.iter().find(|b| **b < BUS_RANGE.0 || **b > BUS_RANGE.1) {
                        return Err(IllegalAction(format!(
                            "substation {sub}: bus {bad} outside [-1, 2]"
                        ))
                        .into());
                    }
                    self.set_topo_vect[range].copy_from_slice(buses);
                }
            }
        }
        self.modified.set_bus = true;
        Ok(())
    }

    fn apply_change_bus(&mut self, change_bus: &ChangeBus) -> Result<(), ActionError> {
        let grid = std::sync::Arc::clone(&self.grid);
        match change_bus {
            ChangeBus::Topology(mask) => {
                let names: Vec<String> = (0..grid.dim_topo()).map(|p| p.to_string()).collect();
                toggle(&mut self.change_bus, &Toggle::Mask(mask.clone()), &names, "topology")?;
            }
            ChangeBus::Select(sel) => {
                if sel.is_empty() {
                    return Err(AmbiguousAction::EmptySelection.into());
                }
                for (kind, t) in sel.by_kind() {
                    let Some(t) = t else { continue };
                    let pos = grid.pos_topo_vect(kind);
                    for id in selected(t, pos.len(), grid.names(kind), &kind.to_string())? {
                        let p = pos[id];
                        self.change_bus[p] = !self.change_bus[p];
                    }
                }
                for (sub, mask) in sel.substations_id.iter().flatten() {
                    let range = self.substation_range(*sub, mask.len())?;
                    for (slot, flip) in self.change_bus[range].iter_mut().zip(mask) {
                        *slot ^= *flip;
                    }
                }
            }
        }
        self.modified.change_bus = true;
        Ok(())
    }

    fn substation_range(&self, sub: usize, given: usize) -> Result<std::ops::Range<usize>, IllegalAction> {
        if sub >= self.grid.n_sub() {
            return Err(IllegalAction(format!("substation {sub} does not exist")));
        }
        let expected = self.grid.sub_info()[sub];
        if given != expected {
            return Err(IllegalAction(format!(
                "substation {sub} has {expected} elements, got {given} values"
            )));
        }
        Ok(self.grid.sub_range(sub))
    }

    /// Lines named by a hazard or maintenance request.
    fn forced_lines(&self, t: &Toggle) -> Result<BTreeSet<usize>, ActionError> {
        let n_line = self.grid.n_line();
        if let Toggle::Mask(mask) = t {
            if mask.len() != n_line {
                return Err(AmbiguousAction::WrongSize {
                    what: "powerlines",
                    expected: n_line,
                    got: mask.len(),
                }
                .into());
            }
        }
        Ok(selected(t, n_line, self.grid.name_line(), "powerline")?)
    }

    /// Forces lines out and drops any bus request on their ends.
    fn disconnect_lines(&mut self, lines: &BTreeSet<usize>) {
        for &l in lines {
            self.set_line_status[l] = -1;
            for pos in [
                self.grid.line_or_pos_topo_vect()[l],
                self.grid.line_ex_pos_topo_vect()[l],
            ] {
                self.set_topo_vect[pos] = 0;
                self.change_bus[pos] = false;
            }
        }
        if !lines.is_empty() {
            self.modified.set_status = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::grid::presets;

    fn action() -> BaseAction {
        BaseAction::new(Arc::new(presets::case14().unwrap()))
    }

    #[test]
    fn parses_redispatch_pairs_from_json() {
        let u: ActionUpdate = serde_json::from_str(r#"{"redispatch": [[0, 5.0], ["gen_2_1", -5.0]]}"#).unwrap();
        let mut act = action();
        act.update(&u).unwrap();
        assert_eq!(act.redispatch()[0], 5.0);
        assert_eq!(act.redispatch()[1], -5.0);
        assert!(act.modified().redispatch);
    }

    #[test]
    fn redispatch_pairs_assign_instead_of_accumulating() {
        let mut act = action();
        act.update(&ActionUpdate::redispatch([(0, 3.0)])).unwrap();
        act.update(&ActionUpdate::redispatch([(0, 4.0)])).unwrap();
        assert_eq!(act.redispatch()[0], 4.0);
    }

    #[test]
    fn parses_set_bus_selection_from_toml() {
        let u: ActionUpdate = toml::from_str(
            r#"
            [set_bus]
            lines_or_id = [[3, 2]]
            loads_id = [["load_1_0", 2]]
            "#,
        )
        .unwrap();
        let mut act = action();
        act.update(&u).unwrap();
        let grid = act.grid().clone();
        assert_eq!(act.set_topo_vect()[grid.line_or_pos_topo_vect()[3]], 2);
        assert_eq!(act.set_topo_vect()[grid.load_pos_topo_vect()[0]], 2);
        assert!(act.modified().set_bus);
    }

    #[test]
    fn parses_change_bus_selection_from_json() {
        let u: ActionUpdate = serde_json::from_str(
            r#"{"change_bus": {"generators_id": [0, "gen_2_1"], "substations_id": [[4, [true]]]}}"#,
        )
        .unwrap();
        let Some(ChangeBus::Select(sel)) = &u.change_bus else {
            panic!("expected a per-kind selection, got {:?}", u.change_bus);
        };
        assert!(matches!(sel.generators_id, Some(Toggle::Ids(ref ids)) if ids.len() == 2));
        assert_eq!(sel.substations_id, Some(vec![(4, vec![true])]));
        assert!(sel.loads_id.is_none());

        let mut act = action();
        act.update(&ActionUpdate {
            change_bus: Some(ChangeBus::Select(BusSelection {
                generators_id: sel.generators_id.clone(),
                ..BusSelection::default()
            })),
            ..ActionUpdate::default()
        })
        .unwrap();
        let grid = act.grid().clone();
        assert!(act.change_bus()[grid.gen_pos_topo_vect()[0]]);
        assert!(act.change_bus()[grid.gen_pos_topo_vect()[1]]);
    }

    #[test]
    fn full_line_status_vector() {
        let mut status = vec![0; 20];
        status[4] = -1;
        let u = ActionUpdate {
            set_line_status: Some(Values::Full(status)),
            ..ActionUpdate::default()
        };
        let mut act = action();
        act.update(&u).unwrap();
        assert_eq!(act.set_line_status()[4], -1);
    }

    #[test]
    fn out_of_range_values_are_illegal_and_roll_back() {
        let mut act = action();
        act.update(&ActionUpdate::set_line_status([(1, 1)])).unwrap();
        let before = act.clone();
        let err = act
            .update(&ActionUpdate::set_line_status([(2, -1), (3, 2)]))
            .unwrap_err();
        assert!(matches!(err, ActionError::Illegal(_)));
        assert_eq!(act, before);
        assert_eq!(act.set_line_status()[2], 0);
    }

    #[test]
    fn bad_ids_and_names_are_illegal() {
        let mut act = action();
        let negative = ActionUpdate {
            set_line_status: Some(Values::Pairs(vec![(ElementKey::Id(-1), 1)])),
            ..ActionUpdate::default()
        };
        assert!(matches!(act.update(&negative), Err(ActionError::Illegal(_))));
        assert!(matches!(
            act.update(&ActionUpdate::set_line_status([(20, 1)])),
            Err(ActionError::Illegal(_))
        ));
        let unknown = ActionUpdate {
            redispatch: Some(Values::Pairs(vec![(ElementKey::from("nope"), 1.0)])),
            ..ActionUpdate::default()
        };
        assert!(matches!(act.update(&unknown), Err(ActionError::Illegal(_))));
    }

    #[test]
    fn change_status_toggles() {
        let mut act = action();
        act.update(&ActionUpdate::change_line_status([2, 2, 5])).unwrap();
        assert!(act.switch_line_status()[2]);
        assert!(act.switch_line_status()[5]);
        act.update(&ActionUpdate::change_line_status([5])).unwrap();
        assert!(!act.switch_line_status()[5]);
    }

    #[test]
    fn change_status_mask_must_cover_every_line() {
        let mut act = action();
        let u = ActionUpdate {
            change_line_status: Some(Toggle::Mask(vec![true; 3])),
            ..ActionUpdate::default()
        };
        assert!(act.update(&u).is_err());
    }

    #[test]
    fn substation_vector_must_match_its_size() {
        let mut act = action();
        let n = act.grid().sub_info()[1];
        assert!(act.update(&ActionUpdate::set_substation(1, vec![2; n])).is_ok());
        assert!(act.update(&ActionUpdate::set_substation(1, vec![2; n + 1])).is_err());
        assert!(act.update(&ActionUpdate::set_substation(1, vec![3; n])).is_err());
        assert!(act.update(&ActionUpdate::set_substation(99, vec![1])).is_err());
    }

    #[test]
    fn empty_selection_is_ambiguous() {
        let mut act = action();
        let u: ActionUpdate = serde_json::from_str(r#"{"set_bus": {}}"#).unwrap();
        assert_eq!(
            act.update(&u).unwrap_err(),
            ActionError::Ambiguous(AmbiguousAction::EmptySelection)
        );
    }

    #[test]
    fn maintenance_disconnects_and_clears_bus_requests() {
        let mut act = action();
        let grid = act.grid().clone();
        let u = ActionUpdate {
            maintenance: Some(Toggle::Ids(vec![0.into()])),
            ..ActionUpdate::set_bus_of(ObjectType::LineOr, [(0, 2)])
        };
        act.update(&u).unwrap();
        assert!(act.maintenance()[0]);
        assert_eq!(act.set_line_status()[0], -1);
        assert_eq!(act.set_topo_vect()[grid.line_or_pos_topo_vect()[0]], 0);
        assert!(act.modified().set_status);
    }

    #[test]
    fn hazard_mask_of_wrong_size_is_ambiguous() {
        let mut act = action();
        let u = ActionUpdate {
            hazards: Some(Toggle::Mask(vec![true])),
            ..ActionUpdate::default()
        };
        assert!(matches!(
            act.update(&u),
            Err(ActionError::Ambiguous(AmbiguousAction::WrongSize { .. }))
        ));
    }

    #[test]
    fn storage_on_grid_without_storage_is_illegal() {
        let mut act = action();
        assert!(matches!(
            act.update(&ActionUpdate::set_storage([(0, 1.0)])),
            Err(ActionError::Illegal(_))
        ));
        let mut with_storage = BaseAction::new(Arc::new(presets::case14_storage().unwrap()));
        with_storage.update(&ActionUpdate::set_storage([(1, -2.0)])).unwrap();
        assert_eq!(with_storage.storage_power(), &[0.0, -2.0]);
    }

    #[test]
    fn injection_full_vector_keeps_nan_as_unchanged() {
        let mut act = action();
        let mut load_p = vec![f32::NAN; 11];
        load_p[3] = 12.5;
        let u = ActionUpdate {
            injection: Some(InjectionUpdate {
                load_p: Some(Values::Full(load_p)),
                ..InjectionUpdate::default()
            }),
            ..ActionUpdate::default()
        };
        act.update(&u).unwrap();
        let (p, q, _, _) = act.load_modif(3).unwrap();
        assert_eq!(p, 12.5);
        assert!(q.is_nan());
        assert!(act.load_modif(0).unwrap().0.is_nan());
        assert!(act.modified().injection);
    }

    #[test]
    fn unknown_keys_are_rejected_at_parse_time() {
        let parsed: Result<ActionUpdate, _> = serde_json::from_str(r#"{"teleport": [1]}"#);
        assert!(parsed.is_err());
    }
}
