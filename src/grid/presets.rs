//! Built-in grids.

use std::collections::BTreeMap;

use super::objects::{GridDescription, GridObjects};
use super::types::{GenType, GeneratorData, GridError, NominalInjections, StorageData};

/// Names accepted by [`by_name`].
pub const GRIDS: &[&str] = &["case5", "case14", "case14_storage"];

/// Looks up a built-in grid by name.
pub fn by_name(name: &str) -> Result<GridObjects, GridError> {
    match name {
        "case5" => case5(),
        "case14" => case14(),
        "case14_storage" => case14_storage(),
        other => Err(GridError::UnknownName {
            kind: "grid",
            name: other.to_string(),
        }),
    }
}

fn layout(points: &[(f32, f32)]) -> BTreeMap<String, (f32, f32)> {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| (format!("sub_{i}"), *p))
        .collect()
}

fn bare(name: &str, n_sub: usize, lines: &[(usize, usize)]) -> GridDescription {
    GridDescription {
        name: name.to_string(),
        n_sub,
        load_to_subid: Vec::new(),
        gen_to_subid: Vec::new(),
        line_or_to_subid: lines.iter().map(|l| l.0).collect(),
        line_ex_to_subid: lines.iter().map(|l| l.1).collect(),
        storage_to_subid: Vec::new(),
        name_load: None,
        name_gen: None,
        name_line: None,
        name_sub: None,
        name_storage: None,
        load_to_sub_pos: None,
        gen_to_sub_pos: None,
        line_or_to_sub_pos: None,
        line_ex_to_sub_pos: None,
        storage_to_sub_pos: None,
        generators: Vec::new(),
        storage: Vec::new(),
        layout: None,
        nominal: None,
    }
}

/// Five substations, eight lines (one doubled), two controllable units.
pub fn case5_description() -> GridDescription {
    let lines = [(0, 1), (0, 2), (0, 3), (0, 4), (1, 2), (2, 3), (2, 3), (3, 4)];
    GridDescription {
        load_to_subid: vec![2, 3, 4],
        gen_to_subid: vec![0, 1],
        generators: vec![
            GeneratorData::dispatchable(GenType::Thermal, 0.0, 60.0, 10.0, 30.0),
            GeneratorData::dispatchable(GenType::Hydro, 0.0, 50.0, 8.0, 20.0),
        ],
        layout: Some(layout(&[
            (0.0, 0.0),
            (0.0, 400.0),
            (200.0, 400.0),
            (400.0, 400.0),
            (400.0, 0.0),
        ])),
        nominal: Some(NominalInjections {
            load_p: vec![20.0, 15.0, 10.0],
            load_q: vec![14.0, 10.5, 7.0],
            prod_p: vec![25.0, 20.0],
            prod_v: vec![102.0, 102.0],
        }),
        ..bare("case5", 5, &lines)
    }
}

/// IEEE 14 bus topology with three redispatchable units, a wind farm, a
/// solar plant and a nuclear unit on the slack substation.
pub fn case14_description() -> GridDescription {
    let lines = [
        (0, 1),
        (0, 4),
        (1, 2),
        (1, 3),
        (1, 4),
        (2, 3),
        (3, 4),
        (3, 6),
        (3, 8),
        (4, 5),
        (5, 10),
        (5, 11),
        (5, 12),
        (6, 7),
        (6, 8),
        (8, 9),
        (8, 13),
        (9, 10),
        (11, 12),
        (12, 13),
    ];
    let mut nuclear = GeneratorData::fixed(GenType::Nuclear, 200.0);
    nuclear.cost_per_mw = 10.0;
    GridDescription {
        load_to_subid: vec![1, 2, 3, 4, 5, 8, 9, 10, 11, 12, 13],
        gen_to_subid: vec![1, 2, 5, 5, 7, 0],
        generators: vec![
            GeneratorData::dispatchable(GenType::Thermal, 0.0, 140.0, 10.0, 40.0),
            GeneratorData::dispatchable(GenType::Thermal, 0.0, 120.0, 10.0, 35.0),
            GeneratorData::fixed(GenType::Wind, 70.0),
            GeneratorData::fixed(GenType::Solar, 70.0),
            GeneratorData::dispatchable(GenType::Hydro, 0.0, 100.0, 15.0, 50.0),
            nuclear,
        ],
        layout: Some(layout(&[
            (-280.0, -81.0),
            (-100.0, -270.0),
            (366.0, -270.0),
            (366.0, -54.0),
            (-64.0, -54.0),
            (-64.0, 54.0),
            (450.0, 0.0),
            (550.0, 0.0),
            (326.0, 54.0),
            (222.0, 108.0),
            (79.0, 162.0),
            (-170.0, 270.0),
            (-64.0, 270.0),
            (222.0, 216.0),
        ])),
        nominal: Some(NominalInjections {
            load_p: vec![21.7, 94.2, 47.8, 7.6, 11.2, 29.5, 9.0, 3.5, 6.1, 13.5, 14.9],
            load_q: vec![12.7, 19.0, -3.9, 1.6, 7.5, 16.6, 5.8, 1.8, 1.6, 5.8, 5.0],
            prod_p: vec![60.0, 50.0, 25.0, 20.0, 30.0, 74.0],
            prod_v: vec![142.1, 142.1, 22.0, 22.0, 13.08, 142.1],
        }),
        ..bare("case14", 14, &lines)
    }
}

/// [`case14_description`] with two batteries on substations 5 and 7.
pub fn case14_storage_description() -> GridDescription {
    let battery = StorageData {
        emax: 15.0,
        emin: 0.0,
        max_p_prod: 5.0,
        max_p_absorb: 5.0,
        charging_efficiency: 0.95,
        discharging_efficiency: 1.0,
        loss: 0.0,
    };
    GridDescription {
        name: "case14_storage".to_string(),
        storage_to_subid: vec![5, 7],
        storage: vec![battery.clone(), battery],
        ..case14_description()
    }
}

pub fn case5() -> Result<GridObjects, GridError> {
    GridObjects::new(case5_description())
}

pub fn case14() -> Result<GridObjects, GridError> {
    GridObjects::new(case14_description())
}

pub fn case14_storage() -> Result<GridObjects, GridError> {
    GridObjects::new(case14_storage_description())
}
