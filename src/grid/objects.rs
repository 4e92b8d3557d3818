//! Validated grid layout: which element sits on which substation, and where.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{
    ConnectedObjects, GeneratorData, GridError, NominalInjections, ObjectType, StorageData,
    TopoObject,
};

/// Serializable description of a grid, as written in `grid.json`.
///
/// Names and positions in substation are optional; missing values are
/// derived by [`GridObjects::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridDescription {
    #[serde(default)]
    pub name: String,
    pub n_sub: usize,
    pub load_to_subid: Vec<usize>,
    pub gen_to_subid: Vec<usize>,
    pub line_or_to_subid: Vec<usize>,
    pub line_ex_to_subid: Vec<usize>,
    #[serde(default)]
    pub storage_to_subid: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_load: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_gen: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_line: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_sub: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_storage: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_to_sub_pos: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen_to_sub_pos: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_or_to_sub_pos: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_ex_to_sub_pos: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_to_sub_pos: Option<Vec<usize>>,
    pub generators: Vec<GeneratorData>,
    #[serde(default)]
    pub storage: Vec<StorageData>,
    /// Substation name to plotting coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<BTreeMap<String, (f32, f32)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<NominalInjections>,
}

/// Positions of the elements of one kind: in their substation and in the
/// global topology vector.
#[derive(Debug, Clone, PartialEq)]
struct Placement {
    to_subid: Vec<usize>,
    to_sub_pos: Vec<usize>,
    pos_topo_vect: Vec<usize>,
}

/// Immutable, validated description of a power grid.
///
/// Every element end (load, generator, line origin, line extremity,
/// storage unit) owns one slot of the topology vector; slots are grouped by
/// substation. Two instances compare equal when they describe the same grid.
#[derive(Debug, Clone)]
pub struct GridObjects {
    description: GridDescription,
    name_load: Vec<String>,
    name_gen: Vec<String>,
    name_line: Vec<String>,
    name_sub: Vec<String>,
    name_storage: Vec<String>,
    load: Placement,
    generator: Placement,
    line_or: Placement,
    line_ex: Placement,
    storage: Placement,
    sub_info: Vec<usize>,
    sub_start: Vec<usize>,
    topo_vect_to_sub: Vec<usize>,
    objects: Vec<TopoObject>,
    nominal: NominalInjections,
}

impl PartialEq for GridObjects {
    fn eq(&self, other: &Self) -> bool {
        self.name_load == other.name_load
            && self.name_gen == other.name_gen
            && self.name_line == other.name_line
            && self.name_sub == other.name_sub
            && self.name_storage == other.name_storage
            && self.load == other.load
            && self.generator == other.generator
            && self.line_or == other.line_or
            && self.line_ex == other.line_ex
            && self.storage == other.storage
            && self.description.generators == other.description.generators
            && self.description.storage == other.description.storage
    }
}

fn default_names(prefix: &str, subs: &[usize]) -> Vec<String> {
    subs.iter()
        .enumerate()
        .map(|(id, sub)| format!("{prefix}_{sub}_{id}"))
        .collect()
}

fn check_names(
    what: &'static str,
    given: &Option<Vec<String>>,
    expected: usize,
    fallback: impl FnOnce() -> Vec<String>,
) -> Result<Vec<String>, GridError> {
    match given {
        Some(names) if names.len() != expected => Err(GridError::WrongLength {
            what,
            expected,
            got: names.len(),
        }),
        Some(names) => Ok(names.clone()),
        None => Ok(fallback()),
    }
}

impl GridObjects {
    /// Validates a description and derives the topology bookkeeping.
    pub fn new(description: GridDescription) -> Result<Self, GridError> {
        let d = &description;
        if d.n_sub == 0 {
            return Err(GridError::Empty("substation"));
        }
        if d.load_to_subid.is_empty() {
            return Err(GridError::Empty("load"));
        }
        if d.gen_to_subid.is_empty() {
            return Err(GridError::Empty("generator"));
        }
        if d.line_or_to_subid.is_empty() {
            return Err(GridError::Empty("powerline"));
        }
        if d.line_ex_to_subid.len() != d.line_or_to_subid.len() {
            return Err(GridError::WrongLength {
                what: "line_ex_to_subid",
                expected: d.line_or_to_subid.len(),
                got: d.line_ex_to_subid.len(),
            });
        }
        if d.generators.len() != d.gen_to_subid.len() {
            return Err(GridError::WrongLength {
                what: "generators",
                expected: d.gen_to_subid.len(),
                got: d.generators.len(),
            });
        }
        if d.storage.len() != d.storage_to_subid.len() {
            return Err(GridError::WrongLength {
                what: "storage",
                expected: d.storage_to_subid.len(),
                got: d.storage.len(),
            });
        }

        let kinds: [(ObjectType, &Vec<usize>); 5] = [
            (ObjectType::Load, &d.load_to_subid),
            (ObjectType::Generator, &d.gen_to_subid),
            (ObjectType::LineOr, &d.line_or_to_subid),
            (ObjectType::LineEx, &d.line_ex_to_subid),
            (ObjectType::Storage, &d.storage_to_subid),
        ];
        for (kind, subs) in kinds {
            if let Some((id, &sub)) = subs.iter().enumerate().find(|(_, s)| **s >= d.n_sub) {
                return Err(GridError::SubstationOutOfRange {
                    kind,
                    id,
                    sub,
                    n_sub: d.n_sub,
                });
            }
        }

        let mut sub_info = vec![0_usize; d.n_sub];
        for (_, subs) in kinds {
            for &sub in subs {
                sub_info[sub] += 1;
            }
        }

        let positions = Self::sub_positions(d, &sub_info)?;

        let mut sub_start = Vec::with_capacity(d.n_sub);
        let mut acc = 0;
        for &n in &sub_info {
            sub_start.push(acc);
            acc += n;
        }
        let dim_topo = acc;
        let expected_dim = d.load_to_subid.len()
            + d.gen_to_subid.len()
            + 2 * d.line_or_to_subid.len()
            + d.storage_to_subid.len();
        if dim_topo != expected_dim {
            return Err(GridError::WrongLength {
                what: "topology vector",
                expected: expected_dim,
                got: dim_topo,
            });
        }

        let mut objects: Vec<Option<TopoObject>> = vec![None; dim_topo];
        let mut placements = Vec::with_capacity(5);
        for ((kind, subs), sub_pos) in kinds.into_iter().zip(positions) {
            let mut pos_topo_vect = Vec::with_capacity(subs.len());
            for (id, (&sub, &pos)) in subs.iter().zip(&sub_pos).enumerate() {
                if pos >= sub_info[sub] {
                    return Err(GridError::PositionOutOfRange {
                        kind,
                        id,
                        sub,
                        pos,
                        size: sub_info[sub],
                    });
                }
                let global = sub_start[sub] + pos;
                if objects[global].is_some() {
                    return Err(GridError::DuplicatePosition(global));
                }
                objects[global] = Some(TopoObject { kind, id, sub });
                pos_topo_vect.push(global);
            }
            placements.push(Placement {
                to_subid: subs.clone(),
                to_sub_pos: sub_pos,
                pos_topo_vect,
            });
        }
        // every slot is filled: dim_topo elements were placed without collision
        let objects: Vec<TopoObject> = objects.into_iter().flatten().collect();

        for (id, g) in d.generators.iter().enumerate() {
            g.validate(id)?;
        }
        for (id, s) in d.storage.iter().enumerate() {
            s.validate(id)?;
        }

        let line_names = || {
            d.line_or_to_subid
                .iter()
                .zip(&d.line_ex_to_subid)
                .enumerate()
                .map(|(id, (or, ex))| format!("{or}_{ex}_{id}"))
                .collect()
        };
        let name_load = check_names("name_load", &d.name_load, d.load_to_subid.len(), || {
            default_names("load", &d.load_to_subid)
        })?;
        let name_gen = check_names("name_gen", &d.name_gen, d.gen_to_subid.len(), || {
            default_names("gen", &d.gen_to_subid)
        })?;
        let name_line = check_names("name_line", &d.name_line, d.line_or_to_subid.len(), line_names)?;
        let name_sub = check_names("name_sub", &d.name_sub, d.n_sub, || {
            (0..d.n_sub).map(|i| format!("sub_{i}")).collect()
        })?;
        let name_storage = check_names(
            "name_storage",
            &d.name_storage,
            d.storage_to_subid.len(),
            || default_names("storage", &d.storage_to_subid),
        )?;

        let nominal = match &d.nominal {
            Some(n) => {
                Self::check_nominal(n, d)?;
                n.clone()
            }
            None => Self::default_nominal(d),
        };

        let topo_vect_to_sub = objects.iter().map(|o| o.sub).collect();
        let [load, generator, line_or, line_ex, storage]: [Placement; 5] = placements
            .try_into()
            .map_err(|_| GridError::Empty("element kind"))?;

        Ok(Self {
            description,
            name_load,
            name_gen,
            name_line,
            name_sub,
            name_storage,
            load,
            generator,
            line_or,
            line_ex,
            storage,
            sub_info,
            sub_start,
            topo_vect_to_sub,
            objects,
            nominal,
        })
    }

    /// Positions in substation, given for all kinds or computed for all kinds.
    ///
    /// Computed order on each substation: loads, generators, line origins,
    /// line extremities, storage units.
    fn sub_positions(d: &GridDescription, sub_info: &[usize]) -> Result<Vec<Vec<usize>>, GridError> {
        let given = [
            (&d.load_to_sub_pos, d.load_to_subid.len(), "load_to_sub_pos"),
            (&d.gen_to_sub_pos, d.gen_to_subid.len(), "gen_to_sub_pos"),
            (&d.line_or_to_sub_pos, d.line_or_to_subid.len(), "line_or_to_sub_pos"),
            (&d.line_ex_to_sub_pos, d.line_ex_to_subid.len(), "line_ex_to_sub_pos"),
            (&d.storage_to_sub_pos, d.storage_to_subid.len(), "storage_to_sub_pos"),
        ];
        let none_given = given.iter().all(|(pos, _, _)| pos.is_none());
        if !none_given {
            let all_given = given.iter().all(|(pos, n, _)| pos.is_some() || *n == 0);
            if !all_given {
                return Err(GridError::PartialPositions);
            }
            let mut out = Vec::with_capacity(given.len());
            for (pos, n, what) in given {
                let pos = pos.clone().unwrap_or_default();
                if pos.len() != n {
                    return Err(GridError::WrongLength {
                        what,
                        expected: n,
                        got: pos.len(),
                    });
                }
                out.push(pos);
            }
            return Ok(out);
        }

        let mut counter = vec![0_usize; sub_info.len()];
        let subs = [
            &d.load_to_subid,
            &d.gen_to_subid,
            &d.line_or_to_subid,
            &d.line_ex_to_subid,
            &d.storage_to_subid,
        ];
        Ok(subs
            .into_iter()
            .map(|ids| {
                ids.iter()
                    .map(|&sub| {
                        let pos = counter[sub];
                        counter[sub] += 1;
                        pos
                    })
                    .collect()
            })
            .collect())
    }

    fn check_nominal(n: &NominalInjections, d: &GridDescription) -> Result<(), GridError> {
        let checks = [
            ("load_p", &n.load_p, d.load_to_subid.len()),
            ("load_q", &n.load_q, d.load_to_subid.len()),
            ("prod_p", &n.prod_p, d.gen_to_subid.len()),
            ("prod_v", &n.prod_v, d.gen_to_subid.len()),
        ];
        for (what, values, expected) in checks {
            if values.len() != expected {
                return Err(GridError::WrongLength {
                    what,
                    expected,
                    got: values.len(),
                });
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(GridError::InvalidNominal(format!("{what} is not finite")));
            }
        }
        Ok(())
    }

    /// Loads share 60% of the installed capacity; generators produce in
    /// proportion to their pmax.
    fn default_nominal(d: &GridDescription) -> NominalInjections {
        let capacity: f32 = d.generators.iter().map(|g| g.pmax).sum();
        let n_load = d.load_to_subid.len() as f32;
        let per_load = 0.6 * capacity / n_load;
        let prod_p = d.generators.iter().map(|g| 0.6 * g.pmax).collect();
        NominalInjections {
            load_p: vec![per_load; d.load_to_subid.len()],
            load_q: vec![0.7 * per_load; d.load_to_subid.len()],
            prod_p,
            prod_v: vec![142.1; d.gen_to_subid.len()],
        }
    }

    /// Parses a grid from its JSON description.
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        let desc: GridDescription =
            serde_json::from_str(json).map_err(|e| GridError::Json(e.to_string()))?;
        Self::new(desc)
    }

    /// Serializes the grid with every derived field made explicit.
    pub fn to_json(&self) -> Result<String, GridError> {
        serde_json::to_string_pretty(&self.explicit_description())
            .map_err(|e| GridError::Json(e.to_string()))
    }

    /// Description with names, positions and nominal values filled in.
    pub fn explicit_description(&self) -> GridDescription {
        GridDescription {
            name_load: Some(self.name_load.clone()),
            name_gen: Some(self.name_gen.clone()),
            name_line: Some(self.name_line.clone()),
            name_sub: Some(self.name_sub.clone()),
            name_storage: Some(self.name_storage.clone()),
            load_to_sub_pos: Some(self.load.to_sub_pos.clone()),
            gen_to_sub_pos: Some(self.generator.to_sub_pos.clone()),
            line_or_to_sub_pos: Some(self.line_or.to_sub_pos.clone()),
            line_ex_to_sub_pos: Some(self.line_ex.to_sub_pos.clone()),
            storage_to_sub_pos: Some(self.storage.to_sub_pos.clone()),
            nominal: Some(self.nominal.clone()),
            ..self.description.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.description.name
    }

    pub fn n_sub(&self) -> usize {
        self.sub_info.len()
    }

    pub fn n_load(&self) -> usize {
        self.load.to_subid.len()
    }

    pub fn n_gen(&self) -> usize {
        self.generator.to_subid.len()
    }

    pub fn n_line(&self) -> usize {
        self.line_or.to_subid.len()
    }

    pub fn n_storage(&self) -> usize {
        self.storage.to_subid.len()
    }

    /// Number of slots in the topology vector.
    pub fn dim_topo(&self) -> usize {
        self.objects.len()
    }

    /// Number of elements connected to each substation.
    pub fn sub_info(&self) -> &[usize] {
        &self.sub_info
    }

    /// Slice of the topology vector owned by `sub`.
    pub fn sub_range(&self, sub: usize) -> std::ops::Range<usize> {
        let start = self.sub_start[sub];
        start..start + self.sub_info[sub]
    }

    pub fn topo_vect_to_sub(&self) -> &[usize] {
        &self.topo_vect_to_sub
    }

    pub fn load_to_subid(&self) -> &[usize] {
        &self.load.to_subid
    }

    pub fn gen_to_subid(&self) -> &[usize] {
        &self.generator.to_subid
    }

    pub fn line_or_to_subid(&self) -> &[usize] {
        &self.line_or.to_subid
    }

    pub fn line_ex_to_subid(&self) -> &[usize] {
        &self.line_ex.to_subid
    }

    pub fn storage_to_subid(&self) -> &[usize] {
        &self.storage.to_subid
    }

    pub fn load_to_sub_pos(&self) -> &[usize] {
        &self.load.to_sub_pos
    }

    pub fn gen_to_sub_pos(&self) -> &[usize] {
        &self.generator.to_sub_pos
    }

    pub fn line_or_to_sub_pos(&self) -> &[usize] {
        &self.line_or.to_sub_pos
    }

    pub fn line_ex_to_sub_pos(&self) -> &[usize] {
        &self.line_ex.to_sub_pos
    }

    pub fn storage_to_sub_pos(&self) -> &[usize] {
        &self.storage.to_sub_pos
    }

    pub fn load_pos_topo_vect(&self) -> &[usize] {
        &self.load.pos_topo_vect
    }

    pub fn gen_pos_topo_vect(&self) -> &[usize] {
        &self.generator.pos_topo_vect
    }

    pub fn line_or_pos_topo_vect(&self) -> &[usize] {
        &self.line_or.pos_topo_vect
    }

    pub fn line_ex_pos_topo_vect(&self) -> &[usize] {
        &self.line_ex.pos_topo_vect
    }

    pub fn storage_pos_topo_vect(&self) -> &[usize] {
        &self.storage.pos_topo_vect
    }

    /// Topology positions of the elements of one kind.
    pub fn pos_topo_vect(&self, kind: ObjectType) -> &[usize] {
        match kind {
            ObjectType::Load => &self.load.pos_topo_vect,
            ObjectType::Generator => &self.generator.pos_topo_vect,
            ObjectType::LineOr => &self.line_or.pos_topo_vect,
            ObjectType::LineEx => &self.line_ex.pos_topo_vect,
            ObjectType::Storage => &self.storage.pos_topo_vect,
        }
    }

    /// Number of elements of one kind (lines count once per end kind).
    pub fn count(&self, kind: ObjectType) -> usize {
        self.pos_topo_vect(kind).len()
    }

    pub fn name_load(&self) -> &[String] {
        &self.name_load
    }

    pub fn name_gen(&self) -> &[String] {
        &self.name_gen
    }

    pub fn name_line(&self) -> &[String] {
        &self.name_line
    }

    pub fn name_sub(&self) -> &[String] {
        &self.name_sub
    }

    pub fn name_storage(&self) -> &[String] {
        &self.name_storage
    }

    /// Element names of one kind, lines for both line ends.
    pub fn names(&self, kind: ObjectType) -> &[String] {
        match kind {
            ObjectType::Load => &self.name_load,
            ObjectType::Generator => &self.name_gen,
            ObjectType::LineOr | ObjectType::LineEx => &self.name_line,
            ObjectType::Storage => &self.name_storage,
        }
    }

    pub fn generators(&self) -> &[GeneratorData] {
        &self.description.generators
    }

    pub fn storage(&self) -> &[StorageData] {
        &self.description.storage
    }

    pub fn nominal(&self) -> &NominalInjections {
        &self.nominal
    }

    /// Plotting coordinates keyed by substation name, if the grid has any.
    pub fn layout(&self) -> Option<&BTreeMap<String, (f32, f32)>> {
        self.description.layout.as_ref()
    }

    /// Whether at least one generator accepts redispatching.
    pub fn redispatching_available(&self) -> bool {
        self.description.generators.iter().any(|g| g.redispatchable)
    }

    /// Element stored at a topology position.
    pub fn object_at(&self, pos: usize) -> Option<TopoObject> {
        self.objects.get(pos).copied()
    }

    /// Everything attached to a substation.
    pub fn connected_to(&self, sub: usize) -> Result<ConnectedObjects, GridError> {
        if sub >= self.n_sub() {
            return Err(GridError::UnknownSubstation(sub));
        }
        let on_sub = |subs: &[usize]| -> Vec<usize> {
            subs.iter()
                .enumerate()
                .filter(|(_, s)| **s == sub)
                .map(|(id, _)| id)
                .collect()
        };
        Ok(ConnectedObjects {
            loads: on_sub(&self.load.to_subid),
            generators: on_sub(&self.generator.to_subid),
            lines_or: on_sub(&self.line_or.to_subid),
            lines_ex: on_sub(&self.line_ex.to_subid),
            storage: on_sub(&self.storage.to_subid),
            nb_elements: self.sub_info[sub],
        })
    }

    /// Lines whose origin is on `from_sub` and extremity on `to_sub`.
    pub fn line_ids(&self, from_sub: usize, to_sub: usize) -> Result<Vec<usize>, GridError> {
        let ids: Vec<usize> = (0..self.n_line())
            .filter(|&l| self.line_or.to_subid[l] == from_sub && self.line_ex.to_subid[l] == to_sub)
            .collect();
        if ids.is_empty() {
            return Err(GridError::NotFound {
                kind: "powerline",
                detail: format!("from substation {from_sub} to substation {to_sub}"),
            });
        }
        Ok(ids)
    }

    pub fn generator_ids(&self, sub: usize) -> Result<Vec<usize>, GridError> {
        self.ids_on("generator", &self.generator.to_subid, sub)
    }

    pub fn load_ids(&self, sub: usize) -> Result<Vec<usize>, GridError> {
        self.ids_on("load", &self.load.to_subid, sub)
    }

    pub fn storage_ids(&self, sub: usize) -> Result<Vec<usize>, GridError> {
        self.ids_on("storage unit", &self.storage.to_subid, sub)
    }

    fn ids_on(&self, kind: &'static str, subs: &[usize], sub: usize) -> Result<Vec<usize>, GridError> {
        if sub >= self.n_sub() {
            return Err(GridError::UnknownSubstation(sub));
        }
        let ids: Vec<usize> = subs
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == sub)
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Err(GridError::NotFound {
                kind,
                detail: format!("on substation {sub}"),
            });
        }
        Ok(ids)
    }

    /// Identifier of a named element of the given kind.
    pub fn id_of(&self, kind: ObjectType, name: &str) -> Result<usize, GridError> {
        self.names(kind)
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| GridError::UnknownName {
                kind: match kind {
                    ObjectType::Load => "load",
                    ObjectType::Generator => "generator",
                    ObjectType::LineOr | ObjectType::LineEx => "powerline",
                    ObjectType::Storage => "storage unit",
                },
                name: name.to_string(),
            })
    }

    /// Identifier of a named substation.
    pub fn sub_id(&self, name: &str) -> Result<usize, GridError> {
        self.name_sub
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| GridError::UnknownName {
                kind: "substation",
                name: name.to_string(),
            })
    }
}
