// SPDX-License-Identifier: Apache-2.0

//! The optimization context: library, netlist and timing oracle, owned
//! together and handed to the optimizers by `&mut`.
//!
//! `DesignDescription` is the serialized form read and written by the
//! driver. Building a `Design` from it creates the nets first, then ports and
//! instances, connects every pin, and applies don't-touch flags last so the
//! flags never block construction.

use crate::liberty::{IndexedLibrary, Library, PortDirection};
use crate::netlist::{InstId, Netlist, Orientation, PinOwner, Point, SignalType};
use crate::timing::{Constraints, MinMax, ParasiticModel, Sta, TimingOracle};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub struct Design<O: TimingOracle> {
    pub library: IndexedLibrary,
    pub netlist: Netlist,
    pub oracle: O,
}

impl<O: TimingOracle> Design<O> {
    pub fn new(library: IndexedLibrary, netlist: Netlist, oracle: O) -> Self {
        Design {
            library,
            netlist,
            oracle,
        }
    }

    /// Re-estimates parasitics and re-times the whole design.
    pub fn update_timing(&mut self, incremental: bool) {
        self.oracle
            .update_parasitics(&self.netlist, &self.library, incremental);
        self.oracle.update_timing(&self.netlist, &self.library);
    }

    pub fn worst_slack(&self, min_max: MinMax) -> f64 {
        self.oracle.worst_slack(min_max).0
    }

    /// Sum of the physical footprint area of every instance.
    pub fn area(&self) -> f64 {
        self.netlist
            .instance_ids()
            .map(|i| self.library.cell(self.netlist.instance(i).cell).footprint_area() as f64)
            .sum()
    }

    pub fn cell_name(&self, inst: InstId) -> &str {
        &self.library.cell(self.netlist.instance(inst).cell).name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDescription {
    pub name: String,
    pub direction: PortDirection,
    #[serde(default)]
    pub location: Point,
    #[serde(default)]
    pub net: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetDescription {
    pub name: String,
    #[serde(default)]
    pub signal_type: SignalType,
    #[serde(default)]
    pub dont_touch: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub name: String,
    pub cell: String,
    #[serde(default)]
    pub location: Point,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub dont_touch: bool,
    /// Cell port name to net name.
    #[serde(default)]
    pub connections: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignDescription {
    pub library: Library,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub parasitics: ParasiticModel,
    #[serde(default)]
    pub ports: Vec<PortDescription>,
    #[serde(default)]
    pub nets: Vec<NetDescription>,
    #[serde(default)]
    pub instances: Vec<InstanceDescription>,
}

impl DesignDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parsing design description")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing design description")
    }

    /// Builds the netlist described here against `lib`.
    pub fn to_netlist(&self, lib: &IndexedLibrary) -> Result<Netlist> {
        let mut netlist = Netlist::new();
        for net in &self.nets {
            netlist
                .create_net(&net.name, net.signal_type)
                .with_context(|| format!("creating net {}", net.name))?;
        }
        let find_net = |netlist: &Netlist, name: &str| {
            netlist
                .find_net(name)
                .ok_or_else(|| anyhow!("unknown net {}", name))
        };
        for port in &self.ports {
            let pin = netlist
                .add_port(&port.name, port.direction, port.location)
                .with_context(|| format!("adding port {}", port.name))?;
            if let Some(net_name) = &port.net {
                let net = find_net(&netlist, net_name)?;
                netlist
                    .connect(pin, net)
                    .with_context(|| format!("connecting port {}", port.name))?;
            }
        }
        for inst in &self.instances {
            let cell = lib
                .cell_by_name(&inst.cell)
                .ok_or_else(|| anyhow!("instance {} uses unknown cell {}", inst.name, inst.cell))?;
            let id = netlist
                .create_instance(&inst.name, cell, lib, inst.location)
                .with_context(|| format!("creating instance {}", inst.name))?;
            if inst.orientation != Orientation::R0 {
                netlist.set_orientation(id, inst.orientation)?;
            }
            for (port, net_name) in &inst.connections {
                let pin = netlist.inst_pin(id, port, lib).ok_or_else(|| {
                    anyhow!("cell {} has no port {} (instance {})", inst.cell, port, inst.name)
                })?;
                let net = find_net(&netlist, net_name)?;
                netlist
                    .connect(pin, net)
                    .with_context(|| format!("connecting {}/{}", inst.name, port))?;
            }
        }
        for net in self.nets.iter().filter(|n| n.dont_touch) {
            let id = find_net(&netlist, &net.name)?;
            netlist.set_dont_touch_net(id, true);
        }
        for inst in self.instances.iter().filter(|i| i.dont_touch) {
            let id = netlist
                .find_instance(&inst.name)
                .ok_or_else(|| anyhow!("unknown instance {}", inst.name))?;
            netlist.set_dont_touch_instance(id, true);
        }
        Ok(netlist)
    }

    /// Builds a timed design using the reference engine.
    pub fn build(&self) -> Result<Design<Sta>> {
        self.constraints
            .validate()
            .map_err(|e| anyhow!("invalid constraints: {}", e))?;
        let lib = IndexedLibrary::new(self.library.clone())
            .map_err(|e| anyhow!("invalid library {}: {}", self.library.name, e))?;
        let netlist = self.to_netlist(&lib)?;
        let sta = Sta::new(self.constraints.clone(), self.parasitics);
        let mut design = Design::new(lib, netlist, sta);
        design.update_timing(false);
        log::info!(
            "built design: {} instances, {} nets, {} ports",
            design.netlist.num_instances(),
            design.netlist.net_ids().count(),
            design.netlist.ports().len()
        );
        Ok(design)
    }
}

impl Design<Sta> {
    /// Serialized form of the current netlist, library and constraints.
    pub fn describe(&self) -> DesignDescription {
        let n = &self.netlist;
        let ports = n
            .ports()
            .iter()
            .map(|pin| {
                let p = n.pin(*pin);
                PortDescription {
                    name: n.pin_name(*pin, &self.library),
                    direction: p.direction,
                    location: match p.owner {
                        PinOwner::Port { location, .. } => location,
                        PinOwner::Instance { .. } => Point::default(),
                    },
                    net: p.net.map(|net| n.net_name(net).to_string()),
                }
            })
            .collect();
        let nets = n
            .net_ids()
            .map(|net| NetDescription {
                name: n.net_name(net).to_string(),
                signal_type: n.net(net).signal_type,
                dont_touch: n.dont_touch_net(net),
            })
            .collect();
        let instances = n
            .instance_ids()
            .map(|inst| {
                let i = n.instance(inst);
                let cell = self.library.cell(i.cell);
                let connections = i
                    .pins
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, pin)| {
                        n.pin(*pin)
                            .net
                            .map(|net| (cell.ports[idx].name.clone(), n.net_name(net).to_string()))
                    })
                    .collect();
                InstanceDescription {
                    name: n.instance_name(inst).to_string(),
                    cell: cell.name.clone(),
                    location: i.location,
                    orientation: i.orientation,
                    dont_touch: i.dont_touch,
                    connections,
                }
            })
            .collect();
        DesignDescription {
            library: self.library.library().clone(),
            constraints: self.oracle.constraints().clone(),
            parasitics: *self.oracle.parasitic_model(),
            ports,
            nets,
            instances,
        }
    }
}

/// Builders for small designs over the sample library, shared by unit and
/// integration tests.
pub mod test_utils {
    use super::*;
    use crate::liberty::test_utils::make_test_library;

    pub fn port(name: &str, direction: PortDirection, x: i64, net: &str) -> PortDescription {
        PortDescription {
            name: name.to_string(),
            direction,
            location: Point::new(x, 0),
            net: Some(net.to_string()),
        }
    }

    pub fn net(name: &str) -> NetDescription {
        NetDescription {
            name: name.to_string(),
            signal_type: SignalType::Signal,
            dont_touch: false,
        }
    }

    pub fn gate(name: &str, cell: &str, x: i64, a: &str, y: &str) -> InstanceDescription {
        InstanceDescription {
            name: name.to_string(),
            cell: cell.to_string(),
            location: Point::new(x, 0),
            orientation: Orientation::R0,
            dont_touch: false,
            connections: BTreeMap::from([
                ("A".to_string(), a.to_string()),
                ("Y".to_string(), y.to_string()),
            ]),
        }
    }

    /// `in -> u0 -> u1 -> ... -> out` through single-input cells, no wire
    /// parasitics.
    pub fn chain_description(cells: &[&str], period: f64) -> DesignDescription {
        let net_names: Vec<String> = (0..=cells.len()).map(|i| format!("n{}", i)).collect();
        let instances = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                gate(
                    &format!("u{}", i),
                    cell,
                    10 * (i as i64 + 1),
                    &net_names[i],
                    &net_names[i + 1],
                )
            })
            .collect();
        DesignDescription {
            library: make_test_library(),
            constraints: Constraints {
                period,
                ..Constraints::default()
            },
            parasitics: ParasiticModel::default(),
            ports: vec![
                port("in", PortDirection::Input, 0, &net_names[0]),
                port("out", PortDirection::Output, 100, &net_names[cells.len()]),
            ],
            nets: net_names.iter().map(|n| net(n)).collect(),
            instances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn describe_round_trips_the_description() {
        let desc = chain_description(&["BUF_X2", "INV_X1"], 1e-9);
        let design = desc.build().unwrap();
        assert_eq!(design.describe(), desc);
        let parsed = DesignDescription::from_json(&desc.to_json().unwrap()).unwrap();
        assert_eq!(parsed.ports, desc.ports);
        assert_eq!(parsed.nets, desc.nets);
        assert_eq!(parsed.instances, desc.instances);
    }

    #[test]
    fn unknown_cell_is_an_error() {
        let mut desc = chain_description(&["BUF_X2"], 1e-9);
        desc.instances[0].cell = "NOPE".to_string();
        let err = desc.build().err().unwrap();
        assert!(err.to_string().contains("unknown cell NOPE"), "{}", err);
    }

    #[test_case(0.0; "zero")]
    #[test_case(-1e-9; "negative")]
    #[test_case(f64::NAN; "nan")]
    #[test_case(f64::INFINITY; "infinite")]
    fn unusable_clock_period_is_an_error(period: f64) {
        let desc = chain_description(&["BUF_X2"], period);
        let err = desc.build().err().unwrap();
        assert!(err.to_string().contains("clock period"), "{}", err);
    }

    #[test]
    fn dont_touch_flags_survive_construction() {
        let mut desc = chain_description(&["BUF_X2", "INV_X1"], 1e-9);
        desc.instances[1].dont_touch = true;
        desc.nets[1].dont_touch = true;
        let design = desc.build().unwrap();
        let u1 = design.netlist.find_instance("u1").unwrap();
        let n1 = design.netlist.find_net("n1").unwrap();
        assert!(design.netlist.dont_touch_instance(u1));
        assert!(design.netlist.dont_touch_net(n1));
        assert_eq!(design.cell_name(u1), "INV_X1");
    }

    #[test]
    fn area_sums_footprints() {
        // BUF_X2 is 4 wide, INV_X1 is 2 wide; both 10 tall.
        let design = chain_description(&["BUF_X2", "INV_X1"], 1e-9).build().unwrap();
        assert_eq!(design.area(), 60.0);
    }
}
