// SPDX-License-Identifier: Apache-2.0

//! Connectivity helpers for the netlist store.
//!
//! Pin directions are already resolved on every `Pin`, so these helpers only
//! classify a net's pins as drivers or loads and walk the fanout cone used for
//! local design-rule checks.

use super::{InstId, NetId, Netlist, PinId};
use std::collections::HashSet;

/// Pins that drive or load a net.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetNeighbors {
    pub drivers: Vec<PinId>,
    pub loads: Vec<PinId>,
}

impl Netlist {
    pub fn net_neighbors(&self, net: NetId) -> NetNeighbors {
        let mut neighbors = NetNeighbors::default();
        for pin in self.net_pins(net) {
            let p = self.pin(*pin);
            if p.is_driver() {
                neighbors.drivers.push(*pin);
            } else if p.is_load() {
                neighbors.loads.push(*pin);
            }
        }
        neighbors
    }

    pub fn driver_pins(&self, net: NetId) -> Vec<PinId> {
        self.net_neighbors(net).drivers
    }

    pub fn load_pins(&self, net: NetId) -> Vec<PinId> {
        self.net_neighbors(net).loads
    }

    pub fn inst_pins(&self, inst: InstId) -> &[PinId] {
        &self.instance(inst).pins
    }

    /// Nets driven by outputs of `inst`.
    pub fn output_nets(&self, inst: InstId) -> Vec<NetId> {
        self.inst_pins(inst)
            .iter()
            .filter(|p| self.pin(**p).is_driver())
            .filter_map(|p| self.pin(*p).net)
            .collect()
    }

    /// Distinct non-supply nets touching `inst`, in pin order.
    pub fn instance_signal_nets(&self, inst: InstId) -> Vec<NetId> {
        let mut seen = HashSet::new();
        let mut nets = Vec::new();
        for pin in self.inst_pins(inst) {
            let Some(net) = self.pin(*pin).net else {
                continue;
            };
            if self.net(net).signal_type.is_supply() {
                continue;
            }
            if seen.insert(net) {
                nets.push(net);
            }
        }
        nets
    }

    /// Instances with at least one load pin on `net`.
    pub fn fanout_instances(&self, net: NetId) -> Vec<InstId> {
        let mut seen = HashSet::new();
        self.load_pins(net)
            .into_iter()
            .filter_map(|p| self.pin(p).instance())
            .filter(|i| seen.insert(*i))
            .collect()
    }

    /// Breadth-first cone of nets reachable from `seeds` through up to
    /// `depth` levels of load instances. Supply nets are skipped and nets for
    /// which `is_clock` holds are included but not expanded.
    pub fn slew_check_net_cone(
        &self,
        seeds: &[NetId],
        depth: usize,
        is_clock: impl Fn(NetId) -> bool,
    ) -> Vec<NetId> {
        let mut cone = Vec::new();
        let mut visited = HashSet::new();
        let mut frontier: Vec<NetId> = seeds.to_vec();
        for level in 0..=depth {
            let mut next = Vec::new();
            for net in frontier {
                if self.try_net(net).is_none() || self.net(net).signal_type.is_supply() {
                    continue;
                }
                if !visited.insert(net) {
                    continue;
                }
                cone.push(net);
                if is_clock(net) || level == depth {
                    continue;
                }
                for inst in self.fanout_instances(net) {
                    for out in self.output_nets(inst) {
                        if !self.net(out).signal_type.is_supply() && !visited.contains(&out) {
                            next.push(out);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        cone
    }
}
