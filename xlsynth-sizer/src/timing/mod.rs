// SPDX-License-Identifier: Apache-2.0

//! Narrow timing/power interface used by the optimizers.
//!
//! The optimizers only ever talk to a `TimingOracle`. `Sta` is the in-crate
//! reference engine (single corner, ideal clock, HPWL wires); an adapter over
//! a production timer implements the same trait.

pub mod parasitics;
pub mod sta;

use crate::liberty::IndexedLibrary;
use crate::netlist::{InstId, NetId, Netlist, PinId};
use serde::{Deserialize, Serialize};

pub use parasitics::ParasiticModel;
pub use sta::{Constraints, Sta};

/// Setup analysis uses `Max`, hold analysis `Min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MinMax {
    Min,
    Max,
}

impl MinMax {
    pub fn index(self) -> usize {
        match self {
            MinMax::Min => 0,
            MinMax::Max => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PowerResult {
    pub leakage: f64,
    pub internal: f64,
    pub switching: f64,
    pub total: f64,
}

impl PowerResult {
    pub fn new(leakage: f64, internal: f64, switching: f64) -> Self {
        PowerResult {
            leakage,
            internal,
            switching,
            total: leakage + internal + switching,
        }
    }

    pub fn accumulate(&mut self, other: &PowerResult) {
        self.leakage += other.leakage;
        self.internal += other.internal;
        self.switching += other.switching;
        self.total += other.total;
    }
}

/// A timing endpoint with its worst slack.
#[derive(Debug, Clone, PartialEq)]
pub struct PathEnd {
    pub pin: PinId,
    pub min_max: MinMax,
    pub arrival: f64,
    pub required: f64,
    pub slack: f64,
}

pub trait TimingOracle {
    /// Re-estimates wire parasitics. With `incremental` the oracle may skip
    /// work when the netlist has not changed since the last estimate.
    fn update_parasitics(&mut self, netlist: &Netlist, lib: &IndexedLibrary, incremental: bool);

    /// Recomputes arrivals, requireds, design-rule state and power.
    fn update_timing(&mut self, netlist: &Netlist, lib: &IndexedLibrary);

    /// Slack at `pin`; `f64::INFINITY` when unconstrained.
    fn vertex_slack(&self, pin: PinId, min_max: MinMax) -> f64;

    /// Worst endpoint slack and the endpoint achieving it.
    fn worst_slack(&self, min_max: MinMax) -> (f64, Option<PinId>);

    /// Pins violating their transition limit; all pins when `net` is `None`.
    fn check_slew_limits(&self, net: Option<NetId>) -> Vec<PinId>;
    fn check_capacitance_limits(&self, net: Option<NetId>) -> Vec<PinId>;
    fn check_fanout_limits(&self, net: Option<NetId>) -> Vec<PinId>;

    fn instance_power(&self, inst: InstId) -> PowerResult;
    fn design_power(&self) -> PowerResult;

    fn is_clock(&self, pin: PinId) -> bool;
    fn is_clock_net(&self, net: NetId) -> bool;
    /// Period of the constraining clock in seconds.
    fn clock_period(&self) -> f64;

    /// Worst (latest) arrival over both transitions.
    fn arrival(&self, pin: PinId) -> f64;
    /// Tightest setup required time over both transitions.
    fn required(&self, pin: PinId) -> f64;
    fn slew(&self, pin: PinId) -> f64;
    fn level(&self, pin: PinId) -> usize;

    /// Up to `limit` setup endpoints, worst slack first.
    fn find_path_ends(&self, limit: usize) -> Vec<PathEnd>;

    /// Non-clock driver pins in level order, ties broken by pin name.
    fn driver_vertices(&self) -> Vec<PinId>;
    /// Driver pins feeding the inputs of the cell that drives `pin`.
    fn fanin_drivers(&self, pin: PinId) -> Vec<PinId>;
    /// Driver pins where data paths start.
    fn is_launching(&self, pin: PinId) -> bool;
    /// Setup-checked data pins and primary outputs.
    fn endpoints(&self) -> Vec<PinId>;
    /// Driver of the net `pin` sits on.
    fn net_driver(&self, pin: PinId) -> Option<PinId>;

    fn total_negative_slack(&self, min_max: MinMax) -> f64 {
        self.endpoints()
            .into_iter()
            .map(|p| self.vertex_slack(p, min_max))
            .filter(|s| s.is_finite() && *s < 0.0)
            .sum()
    }
}
