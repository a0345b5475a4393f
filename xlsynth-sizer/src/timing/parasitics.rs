// SPDX-License-Identifier: Apache-2.0

//! Placement-based wire estimates.

use crate::netlist::{NetId, Netlist};
use serde::{Deserialize, Serialize};

/// Per-unit wire resistance and capacitance applied to a net's half
/// perimeter wire length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParasiticModel {
    /// Farads per placement unit.
    pub cap_per_unit: f64,
    /// Ohms per placement unit.
    pub res_per_unit: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WireEstimate {
    pub cap: f64,
    pub res: f64,
}

impl WireEstimate {
    /// Elmore delay of a lumped wire (`R * (C_wire / 2 + C_pins)`).
    pub fn elmore_delay(&self, pin_cap: f64) -> f64 {
        self.res * (self.cap / 2.0 + pin_cap)
    }
}

/// Half perimeter of the bounding box of the net's pins.
pub fn hpwl(netlist: &Netlist, net: NetId) -> i64 {
    let mut pins = netlist.net_pins(net).iter().map(|p| netlist.pin_location(*p));
    let Some(first) = pins.next() else {
        return 0;
    };
    let (mut lo, mut hi) = (first, first);
    for p in pins {
        lo.x = lo.x.min(p.x);
        lo.y = lo.y.min(p.y);
        hi.x = hi.x.max(p.x);
        hi.y = hi.y.max(p.y);
    }
    (hi.x - lo.x) + (hi.y - lo.y)
}

impl ParasiticModel {
    pub fn estimate(&self, netlist: &Netlist, net: NetId) -> WireEstimate {
        let length = hpwl(netlist, net) as f64;
        WireEstimate {
            cap: self.cap_per_unit * length,
            res: self.res_per_unit * length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liberty::PortDirection;
    use crate::netlist::{Point, SignalType};

    #[test]
    fn hpwl_of_port_pins() {
        let mut n = Netlist::new();
        let a = n.add_port("a", PortDirection::Input, Point::new(0, 0)).unwrap();
        let b = n.add_port("b", PortDirection::Output, Point::new(30, 40)).unwrap();
        let c = n.add_port("c", PortDirection::Output, Point::new(10, -5)).unwrap();
        let net = n.create_net("w", SignalType::Signal).unwrap();
        assert_eq!(hpwl(&n, net), 0);
        for p in [a, b, c] {
            n.connect(p, net).unwrap();
        }
        assert_eq!(hpwl(&n, net), 30 + 45);
        let model = ParasiticModel {
            cap_per_unit: 1e-16,
            res_per_unit: 2.0,
        };
        let w = model.estimate(&n, net);
        assert!((w.cap - 75e-16).abs() < 1e-24);
        assert!((w.res - 150.0).abs() < 1e-12);
        assert!((w.elmore_delay(1e-15) - 150.0 * (37.5e-16 + 1e-15)).abs() < 1e-24);
    }
}
