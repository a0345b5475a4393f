// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use xlsynth_sizer::design::test_utils::{chain_description, net, port};
use xlsynth_sizer::design::{DesignDescription, InstanceDescription};
use xlsynth_sizer::liberty::PortDirection;
use xlsynth_sizer::netlist::{Orientation, Point};
use xlsynth_sizer::timing::MinMax;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A chain whose clock period leaves exactly `margin` seconds of setup
/// slack (negative for a failing design).
pub fn chain_with_slack(cells: &[&str], margin: f64) -> DesignDescription {
    let relaxed = chain_description(cells, 1e-9).build().unwrap();
    let arrival = 1e-9 - relaxed.worst_slack(MinMax::Max);
    chain_description(cells, arrival + margin)
}

const ONE_INPUT: &[&str] = &["INV_X1", "INV_X2", "BUF_X1", "BUF_X2", "BUF_X4"];
const TWO_INPUT: &[&str] = &[
    "NAND2_X1",
    "NAND2_X1_LVT",
    "NAND2_X2",
    "AND2_X1",
    "NOR2_X1",
    "XOR2_X1",
];

/// Random combinational DAG with `inputs` primary inputs and `gates` gates.
/// Every net without a load gets an output port, so every gate is
/// constrained.
pub fn random_description<R: Rng>(rng: &mut R, inputs: usize, gates: usize) -> DesignDescription {
    let mut desc = chain_description(&[], 1e-9);
    desc.ports.clear();
    desc.nets.clear();
    let mut nets: Vec<String> = Vec::new();
    let mut loaded: BTreeMap<String, bool> = BTreeMap::new();
    for i in 0..inputs {
        let name = format!("i{}", i);
        desc.nets.push(net(&name));
        desc.ports
            .push(port(&name, PortDirection::Input, 0, &name));
        loaded.insert(name.clone(), false);
        nets.push(name);
    }
    for g in 0..gates {
        let two = rng.gen_bool(0.5);
        let cell = if two {
            TWO_INPUT.choose(rng).unwrap()
        } else {
            ONE_INPUT.choose(rng).unwrap()
        };
        let y = format!("w{}", g);
        let mut connections = BTreeMap::new();
        let pins: &[&str] = if two { &["A", "B"] } else { &["A"] };
        for p in pins {
            let src = nets.choose(rng).unwrap().clone();
            loaded.insert(src.clone(), true);
            connections.insert(p.to_string(), src);
        }
        connections.insert("Y".to_string(), y.clone());
        desc.instances.push(InstanceDescription {
            name: format!("g{}", g),
            cell: cell.to_string(),
            location: Point::new(rng.gen_range(0..200), rng.gen_range(0..200)),
            orientation: Orientation::R0,
            dont_touch: false,
            connections,
        });
        desc.nets.push(net(&y));
        loaded.insert(y.clone(), false);
        nets.push(y);
    }
    for (name, has_load) in &loaded {
        if !has_load && name.starts_with('w') {
            desc.ports.push(port(
                &format!("o_{}", name),
                PortDirection::Output,
                rng.gen_range(0..200),
                name,
            ));
        }
    }
    desc
}
