// SPDX-License-Identifier: Apache-2.0

//! Greedy timing repair driven by the bottleneck metric.
//!
//! Each pass ranks the negative-slack driver pins by how many near-critical
//! paths run through them and offers each of the top pins an upsize, an
//! input pin swap and a rebuffer of its net, keeping the first edit that
//! improves the worst slack.

use crate::bottleneck::{Bottleneck, BottleneckOptions};
use crate::design::Design;
use crate::netlist::PinId;
use crate::optimize::candidates::batch_size;
use crate::optimize::moves::{next_larger_cells, pin_swap_for, rebuffer_for, Move, MoveKind};
use crate::optimize::{DesignMetrics, DrvCounts};
use crate::timing::{MinMax, TimingOracle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairTimingOptions {
    /// Fraction of the negative-slack driver pins visited per pass.
    pub percent: f64,
    pub max_passes: usize,
    /// An edit must raise the worst slack by more than this, seconds.
    pub min_improvement: f64,
    /// Area may grow at most this much over the baseline, percent.
    pub max_area_growth_pct: f64,
    /// Bottleneck temperature, seconds.
    pub alpha: f64,
    pub upsize: bool,
    pub pin_swap: bool,
    pub rebuffer: bool,
}

impl Default for RepairTimingOptions {
    fn default() -> Self {
        RepairTimingOptions {
            percent: 1.0,
            max_passes: 5,
            min_improvement: 0.1e-12,
            max_area_growth_pct: 10.0,
            alpha: BottleneckOptions::default().alpha,
            upsize: true,
            pin_swap: true,
            rebuffer: true,
        }
    }
}

impl RepairTimingOptions {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.percent.is_finite() && (0.0..=1.0).contains(&self.percent)) {
            return Err(format!("percent must be in [0, 1]; got {}", self.percent));
        }
        if !(self.min_improvement.is_finite() && self.min_improvement >= 0.0) {
            return Err(format!(
                "min_improvement must be finite and non-negative; got {}",
                self.min_improvement
            ));
        }
        if self.max_area_growth_pct.is_nan() || self.max_area_growth_pct < 0.0 {
            return Err(format!(
                "max_area_growth_pct must be non-negative; got {}",
                self.max_area_growth_pct
            ));
        }
        self.bottleneck_options().validate()
    }

    fn bottleneck_options(&self) -> BottleneckOptions {
        BottleneckOptions { alpha: self.alpha }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    ApplyFailure,
    NoImprovement,
    HoldFloor,
    DesignRules,
    AreaBudget,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ApplyFailure => write!(f, "edit failed"),
            Rejection::NoImprovement => write!(f, "no improvement"),
            Rejection::HoldFloor => write!(f, "hold floor"),
            Rejection::DesignRules => write!(f, "design rules"),
            Rejection::AreaBudget => write!(f, "area budget"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepairTimingStats {
    pub accepted: usize,
    pub attempts: usize,
    pub rejected_apply_fail: usize,
    pub rejected_no_improvement: usize,
    pub rejected_hold: usize,
    pub rejected_drv: usize,
    pub rejected_area: usize,
    pub accepted_edits_by_kind: HashMap<MoveKind, usize>,
    pub baseline: DesignMetrics,
    pub final_metrics: DesignMetrics,
}

impl RepairTimingStats {
    fn record_reject(&mut self, reason: Rejection) {
        match reason {
            Rejection::ApplyFailure => self.rejected_apply_fail += 1,
            Rejection::NoImprovement => self.rejected_no_improvement += 1,
            Rejection::HoldFloor => self.rejected_hold += 1,
            Rejection::DesignRules => self.rejected_drv += 1,
            Rejection::AreaBudget => self.rejected_area += 1,
        }
    }
}

struct Repair<'a, O: TimingOracle> {
    design: &'a mut Design<O>,
    options: &'a RepairTimingOptions,
    baseline: DesignMetrics,
    hold_floor: f64,
    running_drv: DrvCounts,
    stats: RepairTimingStats,
}

impl<'a, O: TimingOracle> Repair<'a, O> {
    /// Negative-slack driver pins, highest bottleneck score first and worst
    /// slack first among equal scores.
    fn targets(&self) -> Result<Vec<PinId>, String> {
        let oracle = &self.design.oracle;
        let bottleneck = Bottleneck::analyze(oracle, &self.options.bottleneck_options())?;
        let mut scored: Vec<(PinId, f64, f64)> = bottleneck
            .ranked()
            .into_iter()
            .map(|(pin, score)| (pin, score, oracle.vertex_slack(pin, MinMax::Max)))
            .filter(|(_, _, slack)| *slack < 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.2.total_cmp(&b.2))
                .then(a.0.cmp(&b.0))
        });
        let batch = batch_size(scored.len(), self.options.percent);
        Ok(scored.into_iter().take(batch).map(|(pin, _, _)| pin).collect())
    }

    fn proposals(&self, pin: PinId) -> Vec<Move> {
        let netlist = &self.design.netlist;
        let lib = &self.design.library;
        let oracle = &self.design.oracle;
        let mut moves = Vec::new();
        if let Some(inst) = netlist.pin(pin).instance() {
            if !netlist.dont_touch_instance(inst) {
                if self.options.upsize {
                    if let Some(to) = next_larger_cells(lib, netlist.instance(inst).cell).first() {
                        moves.push(Move::Upsize { inst, to: *to });
                    }
                }
                if self.options.pin_swap {
                    moves.extend(pin_swap_for(netlist, lib, oracle, inst));
                }
            }
        }
        if self.options.rebuffer {
            if let Some(net) = netlist.pin_net(pin) {
                moves.extend(rebuffer_for(netlist, lib, oracle, net));
            }
        }
        moves
    }

    fn judge(&self, wns_before: f64) -> Result<DrvCounts, Rejection> {
        let wns = self.design.worst_slack(MinMax::Max);
        if !(wns > wns_before + self.options.min_improvement) {
            return Err(Rejection::NoImprovement);
        }
        if self.design.worst_slack(MinMax::Min) < self.hold_floor {
            return Err(Rejection::HoldFloor);
        }
        let drv = DrvCounts::global(&self.design.oracle);
        if drv.exceeds(&self.running_drv) {
            return Err(Rejection::DesignRules);
        }
        let growth = DesignMetrics {
            area: self.design.area(),
            ..self.baseline
        }
        .area_growth_pct(&self.baseline);
        if growth > self.options.max_area_growth_pct {
            return Err(Rejection::AreaBudget);
        }
        Ok(drv)
    }

    fn attempt(&mut self, mv: Move) -> Result<bool, String> {
        self.stats.attempts += 1;
        let kind = mv.kind();
        let description = mv.describe(&self.design.netlist, &self.design.library);
        let wns_before = self.design.worst_slack(MinMax::Max);
        self.design.netlist.begin().map_err(|e| e.to_string())?;
        let verdict = match mv.apply(&mut self.design.netlist, &self.design.library) {
            Err(e) => {
                log::trace!("{}: {}", description, e);
                Err(Rejection::ApplyFailure)
            }
            Ok(()) => {
                self.design.update_timing(true);
                self.judge(wns_before)
            }
        };
        match verdict {
            Ok(drv) => {
                self.design.netlist.commit().map_err(|e| e.to_string())?;
                self.running_drv = drv;
                self.stats.accepted += 1;
                *self.stats.accepted_edits_by_kind.entry(kind).or_insert(0) += 1;
                log::debug!("accepted {}", description);
                Ok(true)
            }
            Err(reason) => {
                self.design.netlist.rollback().map_err(|e| e.to_string())?;
                self.design.update_timing(true);
                self.stats.record_reject(reason);
                log::trace!("rejected {} ({})", description, reason);
                Ok(false)
            }
        }
    }

    fn run(&mut self) -> Result<(), String> {
        for pass in 0..self.options.max_passes {
            let wns = self.design.worst_slack(MinMax::Max);
            if !(wns < 0.0) {
                break;
            }
            let targets = self.targets()?;
            let mut accepted = 0;
            for pin in &targets {
                for mv in self.proposals(*pin) {
                    if self.attempt(mv)? {
                        accepted += 1;
                        break;
                    }
                }
            }
            log::info!(
                "repair pass {}: {} of {} pins improved, wns {:.3}ps",
                pass,
                accepted,
                targets.len(),
                self.design.worst_slack(MinMax::Max) * 1e12
            );
            if accepted == 0 {
                break;
            }
        }
        Ok(())
    }
}

/// Repairs setup timing with upsizing, pin swaps and rebuffering.
pub fn repair_timing<O: TimingOracle>(
    design: &mut Design<O>,
    options: &RepairTimingOptions,
) -> Result<RepairTimingStats, String> {
    options.validate()?;
    if design.netlist.in_transaction() {
        return Err("timing repair cannot start inside an open transaction".to_string());
    }
    design.update_timing(true);
    let baseline = DesignMetrics::measure(design);
    let hold_floor = if baseline.hold_wns.is_finite() && baseline.hold_wns < 0.0 {
        baseline.hold_wns
    } else {
        0.0
    };
    let mut repair = Repair {
        design,
        options,
        baseline,
        hold_floor,
        running_drv: baseline.drv,
        stats: RepairTimingStats::default(),
    };
    repair.run()?;
    let final_metrics = DesignMetrics::measure(repair.design);
    log::info!(
        "Applied {} timing repairs (wns {:.3}ps -> {:.3}ps, area {:+.2}%).",
        repair.stats.accepted,
        baseline.wns * 1e12,
        final_metrics.wns * 1e12,
        final_metrics.area_growth_pct(&baseline)
    );
    let mut stats = repair.stats;
    stats.baseline = baseline;
    stats.final_metrics = final_metrics;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::test_utils::{chain_description, gate, net, port};
    use crate::design::DesignDescription;
    use crate::liberty::PortDirection;
    use pretty_assertions::assert_eq;

    /// `in -> u0 -> n1`, n1 fanning out to twelve inverters; `k0` drives the
    /// output.
    fn fanout_description(period: f64) -> DesignDescription {
        let mut desc = chain_description(&["INV_X1"], period);
        desc.ports = vec![
            port("in", PortDirection::Input, 0, "n0"),
            port("out", PortDirection::Output, 100, "k0_y"),
        ];
        for i in 0..12 {
            let y = format!("k{}_y", i);
            desc.nets.push(net(&y));
            desc.instances.push(gate(&format!("k{}", i), "INV_X1", 40, "n1", &y));
        }
        desc
    }

    /// The same design with a period 5ps shorter than its critical path.
    fn violating_description() -> DesignDescription {
        let relaxed = fanout_description(1e-9).build().unwrap();
        let arrival = 1e-9 - relaxed.worst_slack(MinMax::Max);
        let mut desc = fanout_description(1e-9);
        desc.constraints.period = arrival - 5e-12;
        desc
    }

    #[test]
    fn upsizing_the_overloaded_driver_fixes_the_violation() {
        let mut design = violating_description().build().unwrap();
        let before = design.worst_slack(MinMax::Max);
        assert!(before < 0.0);
        let stats = repair_timing(&mut design, &RepairTimingOptions::default()).unwrap();
        let u0 = design.netlist.find_instance("u0").unwrap();
        assert_eq!(design.cell_name(u0), "INV_X2");
        assert_eq!(stats.accepted_edits_by_kind.get(&MoveKind::Upsize), Some(&1));
        assert!(stats.final_metrics.wns > before);
        assert!(stats.final_metrics.wns >= 0.0);
        assert!(stats.final_metrics.area > stats.baseline.area);
    }

    #[test]
    fn area_budget_blocks_growth() {
        let mut design = violating_description().build().unwrap();
        let instances = design.netlist.num_instances();
        let options = RepairTimingOptions {
            max_area_growth_pct: 0.0,
            ..Default::default()
        };
        let stats = repair_timing(&mut design, &options).unwrap();
        assert_eq!(stats.accepted, 0);
        assert!(stats.rejected_area >= 1);
        let u0 = design.netlist.find_instance("u0").unwrap();
        assert_eq!(design.cell_name(u0), "INV_X1");
        assert_eq!(design.netlist.num_instances(), instances);
        assert_eq!(stats.final_metrics.wns, stats.baseline.wns);
    }

    #[test]
    fn passing_design_is_left_alone() {
        let mut design = fanout_description(1e-9).build().unwrap();
        let before = design.describe();
        let stats = repair_timing(&mut design, &RepairTimingOptions::default()).unwrap();
        assert_eq!(stats.attempts, 0);
        assert_eq!(design.describe(), before);
    }

    #[test]
    fn validate_checks_alpha_and_percent() {
        assert!(RepairTimingOptions::default().validate().is_ok());
        let bad_alpha = RepairTimingOptions {
            alpha: 0.0,
            ..Default::default()
        };
        assert!(bad_alpha.validate().is_err());
        let bad_percent = RepairTimingOptions {
            percent: -0.1,
            ..Default::default()
        };
        assert!(bad_percent.validate().is_err());
    }
}
