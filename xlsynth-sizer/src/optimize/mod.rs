// SPDX-License-Identifier: Apache-2.0

//! Greedy netlist optimizers.
//!
//! Both optimizers follow the same attempt discipline: count design-rule
//! violations over the local cone of the edited instance, open a journal
//! transaction, apply one `Move`, re-time, and either keep the transaction on
//! the saved stack or roll it back and re-time again.

pub mod candidates;
pub mod moves;
pub mod recover_power;
pub mod repair_timing;

use crate::design::Design;
use crate::netlist::{InstId, NetId, Netlist};
use crate::timing::{MinMax, TimingOracle};
use serde::Serialize;
use std::fmt;

pub use candidates::{batch_size, collect_candidates, rank, Candidate, CandidateFilter};
pub use moves::{Move, MoveKind};
pub use recover_power::{
    recover_power, recover_power_with_progress, LogProgress, ProgressRecord, ProgressSink,
    RecoverPowerOptions, RecoverPowerStats, TimingFloors,
};
pub use repair_timing::{repair_timing, RepairTimingOptions, RepairTimingStats};

/// Slew, capacitance and fanout violation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrvCounts {
    pub slew: usize,
    pub cap: usize,
    pub fanout: usize,
}

impl DrvCounts {
    pub fn global<O: TimingOracle + ?Sized>(oracle: &O) -> Self {
        DrvCounts {
            slew: oracle.check_slew_limits(None).len(),
            cap: oracle.check_capacitance_limits(None).len(),
            fanout: oracle.check_fanout_limits(None).len(),
        }
    }

    /// Counts over a local cone: slew over `cone.slew_nets`, capacitance and
    /// fanout over `cone.seeds`.
    pub fn local<O: TimingOracle + ?Sized>(oracle: &O, cone: &LocalCone) -> Self {
        let mut counts = DrvCounts::default();
        for net in &cone.slew_nets {
            counts.slew += oracle.check_slew_limits(Some(*net)).len();
        }
        for net in &cone.seeds {
            counts.cap += oracle.check_capacitance_limits(Some(*net)).len();
            counts.fanout += oracle.check_fanout_limits(Some(*net)).len();
        }
        counts
    }

    /// Running totals after replacing the local `pre` counts with `post`.
    /// `None` if that would make any total negative, which means the local
    /// counts and the running totals disagree.
    pub fn rebase(&self, pre: &DrvCounts, post: &DrvCounts) -> Option<DrvCounts> {
        let shift = |running: usize, pre: usize, post: usize| -> Option<usize> {
            let v = running as i64 + post as i64 - pre as i64;
            usize::try_from(v).ok()
        };
        Some(DrvCounts {
            slew: shift(self.slew, pre.slew, post.slew)?,
            cap: shift(self.cap, pre.cap, post.cap)?,
            fanout: shift(self.fanout, pre.fanout, post.fanout)?,
        })
    }

    /// True if any count is above the corresponding count of `budget`.
    pub fn exceeds(&self, budget: &DrvCounts) -> bool {
        self.slew > budget.slew || self.cap > budget.cap || self.fanout > budget.fanout
    }
}

impl fmt::Display for DrvCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.slew, self.cap, self.fanout)
    }
}

/// Snapshot of the figures an optimizer run is judged by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DesignMetrics {
    pub wns: f64,
    pub hold_wns: f64,
    pub tns: f64,
    pub power: f64,
    pub area: f64,
    pub drv: DrvCounts,
}

impl DesignMetrics {
    pub fn measure<O: TimingOracle>(design: &Design<O>) -> Self {
        DesignMetrics {
            wns: design.worst_slack(MinMax::Max),
            hold_wns: design.worst_slack(MinMax::Min),
            tns: design.oracle.total_negative_slack(MinMax::Max),
            power: design.oracle.design_power().total,
            area: design.area(),
            drv: DrvCounts::global(&design.oracle),
        }
    }

    /// Area change relative to `baseline` in percent; zero for an empty
    /// baseline.
    pub fn area_growth_pct(&self, baseline: &DesignMetrics) -> f64 {
        if baseline.area > 0.0 {
            (self.area - baseline.area) / baseline.area * 100.0
        } else {
            0.0
        }
    }
}

/// Nets whose design-rule state an edit of one instance can change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCone {
    /// Signal nets touching the instance.
    pub seeds: Vec<NetId>,
    /// Seeds plus the nets reachable through `depth` levels of fanout.
    pub slew_nets: Vec<NetId>,
}

impl LocalCone {
    pub fn around<O: TimingOracle + ?Sized>(
        netlist: &Netlist,
        oracle: &O,
        inst: InstId,
        depth: usize,
    ) -> Self {
        let seeds = netlist.instance_signal_nets(inst);
        let slew_nets = netlist.slew_check_net_cone(&seeds, depth, |n| oracle.is_clock_net(n));
        LocalCone { seeds, slew_nets }
    }

    /// The same cone with `net` dropped, for counting after `net` has been
    /// destroyed.
    pub fn without(&self, net: NetId) -> Self {
        LocalCone {
            seeds: self.seeds.iter().copied().filter(|n| *n != net).collect(),
            slew_nets: self.slew_nets.iter().copied().filter(|n| *n != net).collect(),
        }
    }
}
