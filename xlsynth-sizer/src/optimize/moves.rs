// SPDX-License-Identifier: Apache-2.0

//! The closed set of netlist edits the optimizers propose, and the
//! library/timing queries that propose them.

use crate::liberty::{CellId, IndexedLibrary, RiseFall};
use crate::netlist::{EditError, InstId, NetId, Netlist, PinId, PinOwner};
use crate::timing::{MinMax, TimingOracle};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoveKind {
    Downsize,
    Upsize,
    VtSwap,
    RemoveBuffer,
    PinSwap,
    Rebuffer,
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveKind::Downsize => write!(f, "Down"),
            MoveKind::Upsize => write!(f, "Up"),
            MoveKind::VtSwap => write!(f, "VtSwap"),
            MoveKind::RemoveBuffer => write!(f, "RmBuf"),
            MoveKind::PinSwap => write!(f, "PinSwap"),
            MoveKind::Rebuffer => write!(f, "Rebuf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Move {
    Downsize { inst: InstId, to: CellId },
    Upsize { inst: InstId, to: CellId },
    VtSwap { inst: InstId, to: CellId },
    RemoveBuffer { inst: InstId },
    /// Exchange the nets on two commutative inputs of one instance.
    PinSwap { inst: InstId, a: PinId, b: PinId },
    /// Move `loads` of `net` behind a new `buffer`.
    Rebuffer {
        net: NetId,
        buffer: CellId,
        loads: Vec<PinId>,
    },
}

impl Move {
    pub fn kind(&self) -> MoveKind {
        match self {
            Move::Downsize { .. } => MoveKind::Downsize,
            Move::Upsize { .. } => MoveKind::Upsize,
            Move::VtSwap { .. } => MoveKind::VtSwap,
            Move::RemoveBuffer { .. } => MoveKind::RemoveBuffer,
            Move::PinSwap { .. } => MoveKind::PinSwap,
            Move::Rebuffer { .. } => MoveKind::Rebuffer,
        }
    }

    /// The instance whose surroundings the move changes; for a rebuffer, the
    /// net's driver.
    pub fn anchor(&self, netlist: &Netlist) -> Option<InstId> {
        match self {
            Move::Downsize { inst, .. }
            | Move::Upsize { inst, .. }
            | Move::VtSwap { inst, .. }
            | Move::RemoveBuffer { inst }
            | Move::PinSwap { inst, .. } => Some(*inst),
            Move::Rebuffer { net, .. } => netlist
                .driver_pins(*net)
                .into_iter()
                .find_map(|p| netlist.pin(p).instance()),
        }
    }

    pub fn apply(&self, netlist: &mut Netlist, lib: &IndexedLibrary) -> Result<(), EditError> {
        match self {
            Move::Downsize { inst, to } | Move::Upsize { inst, to } | Move::VtSwap { inst, to } => {
                netlist.replace_cell(*inst, *to, lib)
            }
            Move::RemoveBuffer { inst } => netlist.remove_buffer(*inst, lib).map(|_| ()),
            Move::PinSwap { inst, a, b } => {
                let cell = netlist.instance(*inst).cell;
                let (Some(pa), Some(pb)) = (port_name(netlist, lib, *a), port_name(netlist, lib, *b))
                else {
                    return Err(EditError::PinsOnDifferentInstances);
                };
                if !lib.is_commutative(cell, pa, pb) {
                    return Err(EditError::NotCommutative {
                        inst: netlist.instance_name(*inst).to_string(),
                        a: pa.to_string(),
                        b: pb.to_string(),
                    });
                }
                netlist.swap_pins(*a, *b)
            }
            Move::Rebuffer { net, buffer, loads } => {
                netlist.insert_buffer(*net, loads, *buffer, lib).map(|_| ())
            }
        }
    }

    /// Human-readable summary. Call before `apply`, since applying may
    /// destroy the objects named here.
    pub fn describe(&self, netlist: &Netlist, lib: &IndexedLibrary) -> String {
        let cell_of = |inst: InstId| lib.cell(netlist.instance(inst).cell).name.as_str();
        match self {
            Move::Downsize { inst, to } | Move::Upsize { inst, to } | Move::VtSwap { inst, to } => {
                format!(
                    "{} {} {} -> {}",
                    self.kind(),
                    netlist.instance_name(*inst),
                    cell_of(*inst),
                    lib.cell(*to).name
                )
            }
            Move::RemoveBuffer { inst } => {
                format!("{} {} ({})", self.kind(), netlist.instance_name(*inst), cell_of(*inst))
            }
            Move::PinSwap { a, b, .. } => format!(
                "{} {} <-> {}",
                self.kind(),
                netlist.pin_name(*a, lib),
                netlist.pin_name(*b, lib)
            ),
            Move::Rebuffer { net, buffer, loads } => format!(
                "{} {} ({} loads behind {})",
                self.kind(),
                netlist.net_name(*net),
                loads.len(),
                lib.cell(*buffer).name
            ),
        }
    }
}

fn port_name<'a>(netlist: &Netlist, lib: &'a IndexedLibrary, pin: PinId) -> Option<&'a str> {
    match netlist.pin(pin).owner {
        PinOwner::Instance { inst, port } => {
            Some(lib.cell(netlist.instance(inst).cell).ports[port].name.as_str())
        }
        PinOwner::Port { .. } => None,
    }
}

/// Swappable cells at the closest smaller footprint area, weakest and
/// lowest-leakage first.
pub fn next_smaller_cells(lib: &IndexedLibrary, cell: CellId) -> Vec<CellId> {
    let area = lib.cell(cell).footprint_area();
    let swappable = lib.swappable_cells(cell);
    let Some(target) = swappable
        .iter()
        .map(|c| lib.cell(*c).footprint_area())
        .filter(|a| *a < area)
        .max()
    else {
        return Vec::new();
    };
    let mut cells: Vec<CellId> = swappable
        .into_iter()
        .filter(|c| lib.cell(*c).footprint_area() == target)
        .collect();
    cells.sort_by(|a, b| {
        let ra = lib.drive_resistance(*a).unwrap_or(0.0).max(0.0);
        let rb = lib.drive_resistance(*b).unwrap_or(0.0).max(0.0);
        let la = lib.leakage(*a).unwrap_or(f64::INFINITY);
        let lb = lib.leakage(*b).unwrap_or(f64::INFINITY);
        rb.total_cmp(&ra)
            .then_with(|| la.total_cmp(&lb))
            .then_with(|| lib.cell(*a).name.cmp(&lib.cell(*b).name))
    });
    cells
}

/// Threshold-voltage variants leaking less than `cell`, nearest first.
pub fn lower_leakage_vt_cells(lib: &IndexedLibrary, cell: CellId) -> Vec<CellId> {
    let variants = lib.vt_equiv_cells(cell);
    let Some(idx) = variants.iter().position(|c| *c == cell) else {
        return Vec::new();
    };
    variants[..idx].iter().rev().copied().collect()
}

/// Usable same-function cells with the same height and a larger footprint,
/// nearest area first and strongest first within an area.
pub fn next_larger_cells(lib: &IndexedLibrary, cell: CellId) -> Vec<CellId> {
    let c = lib.cell(cell);
    let area = c.footprint_area();
    let mut cells: Vec<CellId> = lib
        .equivalent_cells(cell)
        .into_iter()
        .filter(|o| {
            let oc = lib.cell(*o);
            *o != cell && !oc.dont_use && oc.height == c.height && oc.footprint_area() > area
        })
        .collect();
    cells.sort_by(|a, b| {
        let (ca, cb) = (lib.cell(*a), lib.cell(*b));
        let ra = lib.drive_resistance(*a).unwrap_or(f64::INFINITY);
        let rb = lib.drive_resistance(*b).unwrap_or(f64::INFINITY);
        ca.footprint_area()
            .cmp(&cb.footprint_area())
            .then_with(|| ra.total_cmp(&rb))
            .then_with(|| ca.name.cmp(&cb.name))
    });
    cells
}

/// Worst delay from input `from` to any output of `cell` at the library
/// target slew and the cell's target load.
fn input_delay(lib: &IndexedLibrary, cell: CellId, from: &str) -> f64 {
    let load = lib.target_load_or_inf(cell);
    lib.cell(cell)
        .timing_arcs
        .iter()
        .filter(|a| a.from == from && !a.timing_type.is_check())
        .flat_map(|arc| {
            RiseFall::ALL.into_iter().map(move |rf| {
                let slew = lib.target_slew(rf).unwrap_or(0.0);
                lib.arc_delay(arc, rf, slew, load).unwrap_or(f64::INFINITY)
            })
        })
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Moves the latest-arriving input of `inst` onto the fastest commutative
/// input, if that is strictly faster than where it is now.
pub fn pin_swap_for<O: TimingOracle + ?Sized>(
    netlist: &Netlist,
    lib: &IndexedLibrary,
    oracle: &O,
    inst: InstId,
) -> Option<Move> {
    let cell = netlist.instance(inst).cell;
    let inputs: Vec<(PinId, &str)> = netlist
        .inst_pins(inst)
        .iter()
        .copied()
        .filter(|p| {
            let pin = netlist.pin(*p);
            pin.is_load() && pin.net.is_some() && !oracle.is_clock(*p)
        })
        .filter_map(|p| port_name(netlist, lib, p).map(|n| (p, n)))
        .collect();
    let (late_pin, late_port) = inputs
        .iter()
        .copied()
        .max_by(|a, b| oracle.arrival(a.0).total_cmp(&oracle.arrival(b.0)))?;
    let late_delay = input_delay(lib, cell, late_port);
    let (fast_pin, fast_delay) = inputs
        .iter()
        .filter(|(p, port)| *p != late_pin && lib.is_commutative(cell, late_port, port))
        .map(|(p, port)| (*p, input_delay(lib, cell, port)))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    if fast_delay < late_delay {
        Some(Move::PinSwap {
            inst,
            a: late_pin,
            b: fast_pin,
        })
    } else {
        None
    }
}

/// Splits the less critical half of the loads of `net` behind the smallest
/// usable buffer, leaving the critical loads on the original driver.
pub fn rebuffer_for<O: TimingOracle + ?Sized>(
    netlist: &Netlist,
    lib: &IndexedLibrary,
    oracle: &O,
    net: NetId,
) -> Option<Move> {
    let n = netlist.net(net);
    if n.dont_touch || n.signal_type.is_supply() || oracle.is_clock_net(net) {
        return None;
    }
    let neighbors = netlist.net_neighbors(net);
    if neighbors.drivers.len() != 1 || neighbors.loads.len() < 2 {
        return None;
    }
    let buffer = *lib.buffer_cells().first()?;
    let mut loads: Vec<(PinId, f64)> = neighbors
        .loads
        .iter()
        .filter(|p| {
            netlist
                .pin(**p)
                .instance()
                .map_or(true, |i| !netlist.dont_touch_instance(i))
        })
        .map(|p| (*p, oracle.vertex_slack(*p, MinMax::Max)))
        .collect();
    loads.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    loads.truncate(neighbors.loads.len() / 2);
    if loads.is_empty() {
        return None;
    }
    Some(Move::Rebuffer {
        net,
        buffer,
        loads: loads.into_iter().map(|(p, _)| p).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::test_utils::{chain_description, gate, net, port};
    use crate::design::InstanceDescription;
    use crate::liberty::test_utils::{linear_arc, make_test_library};
    use crate::liberty::{PortDirection, TimingSense};
    use crate::netlist::Point;
    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    fn names(lib: &IndexedLibrary, cells: &[CellId]) -> Vec<String> {
        cells.iter().map(|c| lib.cell(*c).name.clone()).collect()
    }

    fn lib() -> IndexedLibrary {
        IndexedLibrary::new(make_test_library()).unwrap()
    }

    #[test]
    fn smaller_cells_prefer_weak_then_low_leakage() {
        let lib = lib();
        let x2 = lib.cell_by_name("NAND2_X2").unwrap();
        assert_eq!(
            names(&lib, &next_smaller_cells(&lib, x2)),
            vec!["NAND2_X1_HVT", "NAND2_X1", "NAND2_X1_LVT"]
        );
        let x1 = lib.cell_by_name("NAND2_X1").unwrap();
        assert!(next_smaller_cells(&lib, x1).is_empty());
        let buf4 = lib.cell_by_name("BUF_X4").unwrap();
        assert_eq!(names(&lib, &next_smaller_cells(&lib, buf4)), vec!["BUF_X2"]);
    }

    #[test]
    fn vt_variants_below_the_current_cell_nearest_first() {
        let lib = lib();
        let lvt = lib.cell_by_name("NAND2_X1_LVT").unwrap();
        assert_eq!(
            names(&lib, &lower_leakage_vt_cells(&lib, lvt)),
            vec!["NAND2_X1", "NAND2_X1_HVT"]
        );
        let hvt = lib.cell_by_name("NAND2_X1_HVT").unwrap();
        assert!(lower_leakage_vt_cells(&lib, hvt).is_empty());
        let x2 = lib.cell_by_name("NAND2_X2").unwrap();
        assert!(lower_leakage_vt_cells(&lib, x2).is_empty());
    }

    #[test]
    fn larger_cells_nearest_area_first() {
        let lib = lib();
        let buf1 = lib.cell_by_name("BUF_X1").unwrap();
        assert_eq!(
            names(&lib, &next_larger_cells(&lib, buf1)),
            vec!["BUF_X2", "BUF_X4"]
        );
        let buf4 = lib.cell_by_name("BUF_X4").unwrap();
        assert!(next_larger_cells(&lib, buf4).is_empty());
    }

    #[test]
    fn apply_and_describe_a_downsize() {
        let mut design = chain_description(&["BUF_X4"], 1e-9).build().unwrap();
        let u0 = design.netlist.find_instance("u0").unwrap();
        let to = design.library.cell_by_name("BUF_X2").unwrap();
        let mv = Move::Downsize { inst: u0, to };
        assert_eq!(mv.kind(), MoveKind::Downsize);
        assert_eq!(
            mv.describe(&design.netlist, &design.library),
            "Down u0 BUF_X4 -> BUF_X2"
        );
        mv.apply(&mut design.netlist, &design.library).unwrap();
        assert_eq!(design.cell_name(u0), "BUF_X2");
        assert_eq!(mv.anchor(&design.netlist), Some(u0));
    }

    fn aoi_description() -> crate::design::DesignDescription {
        let mut desc = chain_description(&[], 1e-9);
        desc.ports = vec![
            port("a1", PortDirection::Input, 0, "na1"),
            port("a2", PortDirection::Input, 0, "na2"),
            port("b", PortDirection::Input, 0, "nb"),
            port("y", PortDirection::Output, 20, "ny"),
        ];
        desc.nets = ["na1", "na2", "nb", "ny"].iter().map(|n| net(n)).collect();
        desc.instances = vec![InstanceDescription {
            name: "g".to_string(),
            cell: "AOI21_X1".to_string(),
            location: Point::new(10, 0),
            orientation: Default::default(),
            dont_touch: false,
            connections: btreemap! {
                "A1".to_string() => "na1".to_string(),
                "A2".to_string() => "na2".to_string(),
                "B".to_string() => "nb".to_string(),
                "Y".to_string() => "ny".to_string(),
            },
        }];
        desc
    }

    #[test]
    fn pin_swap_refuses_non_commutative_inputs() {
        let mut design = aoi_description().build().unwrap();
        let lib = &design.library;
        let g = design.netlist.find_instance("g").unwrap();
        let a1 = design.netlist.inst_pin(g, "A1", lib).unwrap();
        let a2 = design.netlist.inst_pin(g, "A2", lib).unwrap();
        let b = design.netlist.inst_pin(g, "B", lib).unwrap();
        let bad = Move::PinSwap { inst: g, a: a1, b };
        assert!(matches!(
            bad.apply(&mut design.netlist, &design.library),
            Err(EditError::NotCommutative { .. })
        ));
        let good = Move::PinSwap { inst: g, a: a1, b: a2 };
        good.apply(&mut design.netlist, &design.library).unwrap();
        let na2 = design.netlist.find_net("na2").unwrap();
        assert_eq!(design.netlist.pin_net(a1), Some(na2));
    }

    #[test]
    fn pin_swap_moves_the_late_signal_to_the_fast_input() {
        let mut desc = chain_description(&[], 1e-9);
        let mut skew = desc
            .library
            .cells
            .iter()
            .find(|c| c.name == "AND2_X1")
            .unwrap()
            .clone();
        skew.name = "AND2_SKEW".to_string();
        skew.timing_arcs[0] = linear_arc("A", "Y", TimingSense::PositiveUnate, 60e-12, 2e3);
        desc.library.cells.push(skew);
        desc.ports = vec![
            port("e", PortDirection::Input, 0, "ne"),
            port("l", PortDirection::Input, 0, "nl0"),
            port("y", PortDirection::Output, 30, "ny"),
        ];
        desc.nets = ["ne", "nl0", "nl", "ny"].iter().map(|n| net(n)).collect();
        desc.instances = vec![
            gate("b0", "BUF_X1", 10, "nl0", "nl"),
            InstanceDescription {
                name: "g".to_string(),
                cell: "AND2_SKEW".to_string(),
                location: Point::new(20, 0),
                orientation: Default::default(),
                dont_touch: false,
                connections: btreemap! {
                    "A".to_string() => "nl".to_string(),
                    "B".to_string() => "ne".to_string(),
                    "Y".to_string() => "ny".to_string(),
                },
            },
        ];
        let design = desc.build().unwrap();
        let g = design.netlist.find_instance("g").unwrap();
        let a = design.netlist.inst_pin(g, "A", &design.library).unwrap();
        let b = design.netlist.inst_pin(g, "B", &design.library).unwrap();
        assert_eq!(
            pin_swap_for(&design.netlist, &design.library, &design.oracle, g),
            Some(Move::PinSwap { inst: g, a, b })
        );
    }

    #[test]
    fn pin_swap_is_not_proposed_when_inputs_are_symmetric() {
        let design = aoi_description().build().unwrap();
        let g = design.netlist.find_instance("g").unwrap();
        assert_eq!(
            pin_swap_for(&design.netlist, &design.library, &design.oracle, g),
            None
        );
    }

    #[test]
    fn rebuffer_takes_the_less_critical_half() {
        // n1 feeds u1 (one stage to out1) and u2 (three stages to out2).
        let mut desc = chain_description(&["INV_X1"], 1e-9);
        desc.ports.push(port("out2", PortDirection::Output, 100, "m3"));
        desc.ports[1].net = Some("o1".to_string());
        for n in ["o1", "m1", "m2", "m3"] {
            desc.nets.push(net(n));
        }
        desc.instances.push(gate("u1", "INV_X1", 20, "n1", "o1"));
        desc.instances.push(gate("u2", "INV_X1", 20, "n1", "m1"));
        desc.instances.push(gate("u3", "INV_X1", 30, "m1", "m2"));
        desc.instances.push(gate("u4", "INV_X1", 40, "m2", "m3"));
        let design = desc.build().unwrap();
        let n1 = design.netlist.find_net("n1").unwrap();
        let u1 = design.netlist.find_instance("u1").unwrap();
        let u1_a = design.netlist.inst_pin(u1, "A", &design.library).unwrap();
        let buf = design.library.cell_by_name("BUF_X1").unwrap();
        let mv = rebuffer_for(&design.netlist, &design.library, &design.oracle, n1).unwrap();
        assert_eq!(
            mv,
            Move::Rebuffer {
                net: n1,
                buffer: buf,
                loads: vec![u1_a],
            }
        );
        let u0 = design.netlist.find_instance("u0").unwrap();
        assert_eq!(mv.anchor(&design.netlist), Some(u0));
        let m1 = design.netlist.find_net("m1").unwrap();
        assert_eq!(
            rebuffer_for(&design.netlist, &design.library, &design.oracle, m1),
            None
        );
    }

    #[test]
    fn kind_names() {
        let kinds = [
            MoveKind::Downsize,
            MoveKind::Upsize,
            MoveKind::VtSwap,
            MoveKind::RemoveBuffer,
            MoveKind::PinSwap,
            MoveKind::Rebuffer,
        ];
        let shown: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        assert_eq!(shown, vec!["Down", "Up", "VtSwap", "RmBuf", "PinSwap", "Rebuf"]);
    }
}
