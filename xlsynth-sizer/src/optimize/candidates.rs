// SPDX-License-Identifier: Apache-2.0

//! Candidate selection and ranking for power recovery.

use crate::design::Design;
use crate::netlist::{InstId, Netlist};
use crate::timing::{MinMax, TimingOracle};

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub inst: InstId,
    /// Worst setup slack over the instance's non-clock outputs.
    pub slack: f64,
    /// `slack - floor`: how much the instance may slow down.
    pub headroom: f64,
    pub power: f64,
    pub area: f64,
    pub drives_clock: bool,
    pub is_buffer: bool,
}

impl Candidate {
    pub fn score(&self) -> f64 {
        self.power * self.headroom.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateFilter {
    pub floor: f64,
    /// Headroom must be strictly greater than this.
    pub min_margin: f64,
    /// Slack must be strictly less than this; excludes effectively
    /// unconstrained logic.
    pub max_margin: f64,
}

/// Worst setup slack over the driver pins of `inst` that are not on the clock
/// network; infinite when none is constrained.
pub fn instance_worst_slack<O: TimingOracle + ?Sized>(
    netlist: &Netlist,
    oracle: &O,
    inst: InstId,
) -> f64 {
    netlist
        .inst_pins(inst)
        .iter()
        .filter(|p| netlist.pin(**p).is_driver() && !oracle.is_clock(**p))
        .map(|p| oracle.vertex_slack(*p, MinMax::Max))
        .fold(f64::INFINITY, f64::min)
}

pub fn drives_clock<O: TimingOracle + ?Sized>(netlist: &Netlist, oracle: &O, inst: InstId) -> bool {
    netlist
        .inst_pins(inst)
        .iter()
        .any(|p| netlist.pin(*p).is_driver() && oracle.is_clock(*p))
}

/// Every resizable instance worth considering at the current timing state.
///
/// Clock drivers and non-clock buffers often have no data slack of their
/// own; they take `current_wns` instead and are only screened against
/// `max_margin`. Full timing checks after each edit keep them honest.
pub fn collect_candidates<O: TimingOracle>(
    design: &Design<O>,
    current_wns: f64,
    filter: &CandidateFilter,
) -> Vec<Candidate> {
    let netlist = &design.netlist;
    let lib = &design.library;
    let oracle = &design.oracle;
    let mut candidates = Vec::new();
    for inst in netlist.instance_ids() {
        let cell = netlist.instance(inst).cell;
        if netlist.dont_touch_instance(inst) || !lib.cell(cell).is_logic() {
            continue;
        }
        let drives_clock = drives_clock(netlist, oracle, inst);
        let is_buffer = lib.is_buffer(cell);
        let relaxed = drives_clock || is_buffer;
        let mut slack = instance_worst_slack(netlist, oracle, inst);
        if !slack.is_finite() {
            if !relaxed {
                continue;
            }
            slack = current_wns;
        }
        let headroom = slack - filter.floor;
        let keep = if relaxed {
            slack < filter.max_margin
        } else {
            headroom > filter.min_margin && slack < filter.max_margin
        };
        if !keep {
            continue;
        }
        candidates.push(Candidate {
            inst,
            slack,
            headroom,
            power: oracle.instance_power(inst).total,
            area: lib.cell(cell).footprint_area() as f64,
            drives_clock,
            is_buffer,
        });
    }
    log::trace!(
        "collected {} candidates (wns {:.3e}, floor {:.3e})",
        candidates.len(),
        current_wns,
        filter.floor
    );
    candidates
}

/// Sorts by `power * max(0, headroom)`, then power, headroom and area, all
/// descending. Instance id breaks any remaining tie.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score()
            .total_cmp(&a.score())
            .then_with(|| b.power.total_cmp(&a.power))
            .then_with(|| b.headroom.total_cmp(&a.headroom))
            .then_with(|| b.area.total_cmp(&a.area))
            .then_with(|| a.inst.cmp(&b.inst))
    });
}

/// Number of ranked candidates to process: `ceil(percent * n)` clamped to
/// `[1, n]`, or zero when there are none.
pub fn batch_size(n: usize, percent: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let count = (n as f64 * percent).ceil();
    if count.is_nan() || count < 1.0 {
        1
    } else {
        (count as usize).min(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::test_utils::{chain_description, gate};
    use crate::design::DesignDescription;
    use crate::netlist::SignalType;
    use test_case::test_case;

    fn loose(floor: f64) -> CandidateFilter {
        CandidateFilter {
            floor,
            min_margin: 0.0,
            max_margin: 1e-6,
        }
    }

    fn cand(inst: usize, power: f64, headroom: f64, area: f64) -> Candidate {
        Candidate {
            inst: InstId(inst),
            slack: headroom,
            headroom,
            power,
            area,
            drives_clock: false,
            is_buffer: false,
        }
    }

    #[test]
    fn rank_orders_by_score_then_power_headroom_area() {
        let mut cs = vec![
            cand(0, 1.0, 1.0, 1.0),
            cand(1, 2.0, 2.0, 1.0),
            cand(2, 4.0, -1.0, 1.0),
            cand(3, 1.0, 1.0, 5.0),
            cand(4, 3.0, -2.0, 1.0),
        ];
        rank(&mut cs);
        let order: Vec<usize> = cs.iter().map(|c| c.inst.0).collect();
        // Scores: 1, 4, 0, 1, 0. Ties on score fall back to power, then area.
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test_case(0, 0.5 => 0)]
    #[test_case(10, 0.25 => 3)]
    #[test_case(10, 0.0 => 1)]
    #[test_case(10, 2.0 => 10)]
    #[test_case(3, 0.01 => 1)]
    fn batch_size_cases(n: usize, percent: f64) -> usize {
        batch_size(n, percent)
    }

    #[test]
    fn chain_instances_are_candidates_and_ranked_by_power() {
        let design = chain_description(&["INV_X1", "INV_X2", "INV_X1"], 1e-9)
            .build()
            .unwrap();
        let wns = design.worst_slack(MinMax::Max);
        assert!(wns > 0.0);
        let mut cs = collect_candidates(&design, wns, &loose(0.0));
        assert_eq!(cs.len(), 3);
        for c in &cs {
            assert!((c.slack - wns).abs() < 1e-15);
            assert!((c.headroom - c.slack).abs() < 1e-18);
            assert!(!c.is_buffer && !c.drives_clock);
        }
        rank(&mut cs);
        let u1 = design.netlist.find_instance("u1").unwrap();
        assert_eq!(cs[0].inst, u1);
        assert_eq!(cs[0].area, 40.0);
    }

    #[test]
    fn dont_touch_instances_are_skipped() {
        let mut desc = chain_description(&["INV_X1", "INV_X1"], 1e-9);
        desc.instances[0].dont_touch = true;
        let design = desc.build().unwrap();
        let wns = design.worst_slack(MinMax::Max);
        let cs = collect_candidates(&design, wns, &loose(0.0));
        let names: Vec<&str> = cs
            .iter()
            .map(|c| design.netlist.instance_name(c.inst))
            .collect();
        assert_eq!(names, vec!["u1"]);
    }

    #[test]
    fn margins_bound_the_candidates() {
        let design = chain_description(&["INV_X1", "INV_X1"], 1e-9)
            .build()
            .unwrap();
        let wns = design.worst_slack(MinMax::Max);
        let critical = CandidateFilter {
            floor: wns,
            min_margin: 1e-15,
            max_margin: 1e-6,
        };
        assert!(collect_candidates(&design, wns, &critical).is_empty());
        let capped = CandidateFilter {
            max_margin: wns / 2.0,
            ..loose(0.0)
        };
        assert!(collect_candidates(&design, wns, &capped).is_empty());
    }

    fn with_dangling(desc: &mut DesignDescription, name: &str, cell: &str) {
        let net = format!("{}_out", name);
        desc.nets.push(crate::design::NetDescription {
            name: net.clone(),
            signal_type: SignalType::Signal,
            dont_touch: false,
        });
        desc.instances.push(gate(name, cell, 50, "n0", &net));
    }

    #[test]
    fn unconstrained_buffers_take_the_current_wns() {
        let mut desc = chain_description(&["INV_X1"], 1e-9);
        with_dangling(&mut desc, "dbuf", "BUF_X1");
        with_dangling(&mut desc, "dinv", "INV_X1");
        let design = desc.build().unwrap();
        let wns = design.worst_slack(MinMax::Max);
        let cs = collect_candidates(&design, wns, &loose(0.0));
        let dbuf = design.netlist.find_instance("dbuf").unwrap();
        let dinv = design.netlist.find_instance("dinv").unwrap();
        let buf = cs.iter().find(|c| c.inst == dbuf).unwrap();
        assert!(buf.is_buffer);
        assert_eq!(buf.slack, wns);
        assert!(cs.iter().all(|c| c.inst != dinv));
    }
}
