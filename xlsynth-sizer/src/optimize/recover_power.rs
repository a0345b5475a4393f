// SPDX-License-Identifier: Apache-2.0

//! Greedy power recovery.
//!
//! A run snapshots the baseline timing, design-rule and power figures, then
//! makes three phases of passes over the ranked candidates: cell swaps
//! against a tightened floor, buffer removal, and cell swaps against the full
//! floor. Every accepted edit stays on the journal's saved stack so a final
//! back-off can undo the newest edits if the floors no longer hold.

use crate::design::Design;
use crate::netlist::InstId;
use crate::optimize::candidates::{batch_size, collect_candidates, rank, Candidate, CandidateFilter};
use crate::optimize::moves::{lower_leakage_vt_cells, next_smaller_cells, Move, MoveKind};
use crate::optimize::{DesignMetrics, DrvCounts, LocalCone};
use crate::timing::{MinMax, TimingOracle};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverPowerOptions {
    /// Fraction of the ranked candidates to visit per pass, in `[0, 1]`.
    pub percent: f64,
    /// Passes of the buffer-removal and final swap phases.
    pub max_passes: usize,
    /// Passes of the initial swap phase, which runs against the tighter
    /// floor.
    pub swap_passes: usize,
    /// Fanout hops, past the edited instance's own nets, checked for slew.
    pub slew_check_depth: usize,
    /// Fraction of `period - wns` a failing design may lose.
    pub degrade_frac: f64,
    /// Hard cap on the degradation budget, seconds.
    pub max_degrade: f64,
    /// Part of the budget held back from the floor.
    pub guard_frac: f64,
    pub guard_cap: f64,
    pub min_margin: f64,
    pub max_margin: f64,
    pub max_attempts_per_candidate: usize,
    pub min_print_interval: usize,
    pub max_print_interval: usize,
}

impl Default for RecoverPowerOptions {
    fn default() -> Self {
        RecoverPowerOptions {
            percent: 1.0,
            max_passes: 3,
            swap_passes: 3,
            slew_check_depth: 2,
            degrade_frac: 0.05,
            max_degrade: 100e-12,
            guard_frac: 0.2,
            guard_cap: 5e-12,
            min_margin: 1e-12,
            max_margin: 1e-6,
            max_attempts_per_candidate: 10,
            min_print_interval: 10,
            max_print_interval: 1000,
        }
    }
}

impl RecoverPowerOptions {
    pub fn validate(&self) -> Result<(), String> {
        let non_negative = |name: &str, v: f64| {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                Err(format!("{} must be finite and non-negative; got {}", name, v))
            }
        };
        if !(self.percent.is_finite() && (0.0..=1.0).contains(&self.percent)) {
            return Err(format!("percent must be in [0, 1]; got {}", self.percent));
        }
        if !(self.guard_frac.is_finite() && (0.0..=1.0).contains(&self.guard_frac)) {
            return Err(format!("guard_frac must be in [0, 1]; got {}", self.guard_frac));
        }
        non_negative("degrade_frac", self.degrade_frac)?;
        non_negative("max_degrade", self.max_degrade)?;
        non_negative("guard_cap", self.guard_cap)?;
        non_negative("min_margin", self.min_margin)?;
        if self.max_margin.is_nan() || self.max_margin <= self.min_margin {
            return Err(format!(
                "max_margin ({}) must exceed min_margin ({})",
                self.max_margin, self.min_margin
            ));
        }
        if self.max_attempts_per_candidate == 0 {
            return Err("max_attempts_per_candidate must be at least 1".to_string());
        }
        if self.min_print_interval == 0 || self.min_print_interval > self.max_print_interval {
            return Err(format!(
                "print interval bounds must satisfy 1 <= min ({}) <= max ({})",
                self.min_print_interval, self.max_print_interval
            ));
        }
        Ok(())
    }
}

/// Slack levels an accepted edit must not cross.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimingFloors {
    pub setup: f64,
    /// Floor for the first swap phase; never below `setup`.
    pub swap: f64,
    pub hold: f64,
}

impl TimingFloors {
    /// A passing design keeps a zero setup floor. A failing one may degrade
    /// by `degrade_frac * (period - wns)`, capped at `max_degrade`, less a
    /// guard band; the floor never rises above the baseline.
    pub fn new(
        baseline_wns: f64,
        baseline_hold: f64,
        period: f64,
        options: &RecoverPowerOptions,
    ) -> Self {
        let failing = baseline_wns.is_finite() && baseline_wns < 0.0;
        let floor_for = |budget: f64| {
            let guard = options.guard_cap.min(options.guard_frac * budget);
            (baseline_wns - budget + guard).min(baseline_wns)
        };
        let (setup, swap) = if !failing {
            (0.0, 0.0)
        } else if period > 0.0 {
            let budget = (options.degrade_frac * (period - baseline_wns)).min(options.max_degrade);
            let setup = floor_for(budget);
            (setup, floor_for(0.5 * budget).max(setup))
        } else {
            (baseline_wns, baseline_wns)
        };
        let hold = if baseline_hold.is_finite() && baseline_hold < 0.0 {
            baseline_hold
        } else {
            0.0
        };
        TimingFloors { setup, swap, hold }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ApplyFailure,
    SetupFloor,
    HoldFloor,
    DesignRules,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ApplyFailure => write!(f, "edit failed"),
            RejectReason::SetupFloor => write!(f, "setup floor"),
            RejectReason::HoldFloor => write!(f, "hold floor"),
            RejectReason::DesignRules => write!(f, "design rules"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecoverPowerStats {
    /// Accepted downsizes and threshold-voltage swaps.
    pub swaps: usize,
    pub removed_buffers: usize,
    pub attempts: usize,
    pub rejected_apply_fail: usize,
    pub rejected_setup: usize,
    pub rejected_hold: usize,
    pub rejected_drv: usize,
    /// Accepted edits undone by the final back-off.
    pub backed_off: usize,
    pub accepted_edits_by_kind: HashMap<MoveKind, usize>,
    pub baseline: DesignMetrics,
    pub final_metrics: DesignMetrics,
}

impl RecoverPowerStats {
    fn record_accept(&mut self, kind: MoveKind) {
        match kind {
            MoveKind::RemoveBuffer => self.removed_buffers += 1,
            _ => self.swaps += 1,
        }
        *self.accepted_edits_by_kind.entry(kind).or_insert(0) += 1;
    }

    fn record_undo(&mut self, kind: MoveKind) {
        match kind {
            MoveKind::RemoveBuffer => self.removed_buffers -= 1,
            _ => self.swaps -= 1,
        }
        if let Some(n) = self.accepted_edits_by_kind.get_mut(&kind) {
            *n -= 1;
            if *n == 0 {
                self.accepted_edits_by_kind.remove(&kind);
            }
        }
        self.backed_off += 1;
    }

    fn record_reject(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::ApplyFailure => self.rejected_apply_fail += 1,
            RejectReason::SetupFloor => self.rejected_setup += 1,
            RejectReason::HoldFloor => self.rejected_hold += 1,
            RejectReason::DesignRules => self.rejected_drv += 1,
        }
    }
}

/// One row of the progress table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub iteration: usize,
    pub is_final: bool,
    pub area_growth_pct: f64,
    pub swaps: usize,
    pub removed_buffers: usize,
    pub wns: f64,
    pub power: f64,
    pub slew_violations: usize,
    pub cap_violations: usize,
    pub fanout_violations: usize,
}

pub trait ProgressSink {
    fn record(&mut self, record: &ProgressRecord);
}

/// Writes the progress table through `log::info!`.
#[derive(Debug, Default)]
pub struct LogProgress {
    header_printed: bool,
}

fn format_slack(seconds: f64) -> String {
    if seconds.is_finite() {
        format!("{:.3}ps", seconds * 1e12)
    } else {
        "inf".to_string()
    }
}

impl ProgressSink for LogProgress {
    fn record(&mut self, r: &ProgressRecord) {
        if !self.header_printed {
            log::info!("Iteration |    Area   | Swaps/Rm |        WNS |      Power | Slew/Cap/Fo");
            log::info!("----------+-----------+----------+------------+------------+------------");
            self.header_printed = true;
        }
        let label = if r.is_final {
            "final".to_string()
        } else {
            r.iteration.to_string()
        };
        log::info!(
            "{:>9} | {:>+8.2}% | {:>8} | {:>10} | {:>10.3e} | {}/{}/{}",
            label,
            r.area_growth_pct,
            format!("{}/{}", r.swaps, r.removed_buffers),
            format_slack(r.wns),
            r.power,
            r.slew_violations,
            r.cap_violations,
            r.fanout_violations
        );
    }
}

impl ProgressSink for Vec<ProgressRecord> {
    fn record(&mut self, record: &ProgressRecord) {
        self.push(record.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Swap,
    BufferRemoval,
}

impl Phase {
    fn admits(self, c: &Candidate) -> bool {
        match self {
            Phase::Swap => !c.is_buffer,
            Phase::BufferRemoval => c.is_buffer && !c.drives_clock,
        }
    }
}

struct Recovery<'a, O: TimingOracle> {
    design: &'a mut Design<O>,
    options: &'a RecoverPowerOptions,
    sink: &'a mut dyn ProgressSink,
    floors: TimingFloors,
    baseline: DesignMetrics,
    running_drv: DrvCounts,
    stats: RecoverPowerStats,
    iteration: usize,
    /// Kinds of the edits on the saved stack, oldest first.
    accepted: Vec<MoveKind>,
}

impl<'a, O: TimingOracle> Recovery<'a, O> {
    fn cone(&self, inst: InstId) -> LocalCone {
        LocalCone::around(
            &self.design.netlist,
            &self.design.oracle,
            inst,
            self.options.slew_check_depth,
        )
    }

    fn judge(&self, floor: f64, pre: &DrvCounts, post_cone: &LocalCone) -> Result<DrvCounts, RejectReason> {
        if self.design.worst_slack(MinMax::Max) < floor {
            return Err(RejectReason::SetupFloor);
        }
        if self.design.worst_slack(MinMax::Min) < self.floors.hold {
            return Err(RejectReason::HoldFloor);
        }
        let post = DrvCounts::local(&self.design.oracle, post_cone);
        match self.running_drv.rebase(pre, &post) {
            Some(next) if !next.exceeds(&self.baseline.drv) => Ok(next),
            _ => Err(RejectReason::DesignRules),
        }
    }

    /// Applies `mv` in a transaction and keeps it only if every check
    /// passes. Timing is current on return either way.
    fn attempt(
        &mut self,
        mv: Move,
        floor: f64,
        pre_cone: &LocalCone,
        post_cone: &LocalCone,
    ) -> Result<bool, String> {
        self.stats.attempts += 1;
        let kind = mv.kind();
        let description = mv.describe(&self.design.netlist, &self.design.library);
        let pre = DrvCounts::local(&self.design.oracle, pre_cone);
        self.design.netlist.begin().map_err(|e| e.to_string())?;
        let verdict = match mv.apply(&mut self.design.netlist, &self.design.library) {
            Err(e) => {
                log::trace!("{}: {}", description, e);
                Err(RejectReason::ApplyFailure)
            }
            Ok(()) => {
                self.design.update_timing(true);
                self.judge(floor, &pre, post_cone)
            }
        };
        match verdict {
            Ok(next) => {
                self.design.netlist.commit_saved().map_err(|e| e.to_string())?;
                self.running_drv = next;
                self.stats.record_accept(kind);
                self.accepted.push(kind);
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

    /// Downsizes `inst` as far as it goes, then walks it down the
    /// threshold-voltage variants. Within one size step every option is
    /// tried; a step with no accepted option ends the direction.
    fn optimize_swaps(&mut self, inst: InstId, floor: f64) -> Result<bool, String> {
        let max_attempts = self.options.max_attempts_per_candidate;
        let mut attempts = 0;
        let mut changed = false;
        for vt in [false, true] {
            'steps: while attempts < max_attempts {
                let cell = self.design.netlist.instance(inst).cell;
                let options = if vt {
                    lower_leakage_vt_cells(&self.design.library, cell)
                } else {
                    next_smaller_cells(&self.design.library, cell)
                };
                if options.is_empty() {
                    break;
                }
                let cone = self.cone(inst);
                for to in options {
                    if attempts >= max_attempts {
                        break 'steps;
                    }
                    attempts += 1;
                    let mv = if vt {
                        Move::VtSwap { inst, to }
                    } else {
                        Move::Downsize { inst, to }
                    };
                    if self.attempt(mv, floor, &cone, &cone)? {
                        changed = true;
                        continue 'steps;
                    }
                }
                break;
            }
        }
        Ok(changed)
    }

    fn try_remove_buffer(&mut self, inst: InstId, floor: f64) -> Result<bool, String> {
        let plan = match self
            .design
            .netlist
            .plan_buffer_removal(inst, &self.design.library)
        {
            Ok(plan) => plan,
            Err(e) => {
                log::trace!("not removing {}: {}", self.design.netlist.instance_name(inst), e);
                return Ok(false);
            }
        };
        let cone = self.cone(inst);
        let post_cone = cone.without(plan.removed);
        self.attempt(Move::RemoveBuffer { inst }, floor, &cone, &post_cone)
    }

    fn run_passes(&mut self, phase: Phase, floor: f64, passes: usize) -> Result<(), String> {
        for pass in 0..passes {
            let wns = self.design.worst_slack(MinMax::Max);
            let filter = CandidateFilter {
                floor,
                min_margin: self.options.min_margin,
                max_margin: self.options.max_margin,
            };
            let mut candidates: Vec<Candidate> = collect_candidates(self.design, wns, &filter)
                .into_iter()
                .filter(|c| phase.admits(c))
                .collect();
            if candidates.is_empty() {
                break;
            }
            rank(&mut candidates);
            let batch = batch_size(candidates.len(), self.options.percent);
            let print_interval = (batch / 100).clamp(
                self.options.min_print_interval,
                self.options.max_print_interval,
            );
            let max_consecutive_rejects = (batch / 20).clamp(200, 5000);
            let mut consecutive_rejects = 0;
            let mut accepted = 0;
            for candidate in candidates.iter().take(batch) {
                if self.design.netlist.try_instance(candidate.inst).is_none() {
                    continue;
                }
                self.iteration += 1;
                let ok = match phase {
                    Phase::Swap => self.optimize_swaps(candidate.inst, floor)?,
                    Phase::BufferRemoval => self.try_remove_buffer(candidate.inst, floor)?,
                };
                if ok {
                    accepted += 1;
                    consecutive_rejects = 0;
                } else {
                    consecutive_rejects += 1;
                }
                if self.iteration % print_interval == 0 {
                    self.report(false);
                }
                if consecutive_rejects >= max_consecutive_rejects {
                    log::debug!(
                        "{:?} pass {}: stopping after {} consecutive rejections",
                        phase,
                        pass,
                        consecutive_rejects
                    );
                    break;
                }
            }
            log::debug!(
                "{:?} pass {}: {} of {} candidates improved",
                phase,
                pass,
                accepted,
                batch
            );
            if accepted == 0 {
                break;
            }
        }
        Ok(())
    }

    fn floors_violated(&self) -> bool {
        self.design.worst_slack(MinMax::Max) < self.floors.setup
            || self.design.worst_slack(MinMax::Min) < self.floors.hold
    }

    /// Undoes accepted edits newest first while a floor is violated.
    fn back_off(&mut self) -> Result<(), String> {
        if !self.floors_violated() {
            return Ok(());
        }
        let (mut swaps, mut removals) = (0usize, 0usize);
        while self.floors_violated() {
            let Some(kind) = self.accepted.pop() else {
                break;
            };
            self.design.netlist.restore_saved().map_err(|e| e.to_string())?;
            self.design.update_timing(true);
            self.stats.record_undo(kind);
            match kind {
                MoveKind::RemoveBuffer => removals += 1,
                _ => swaps += 1,
            }
        }
        let wns = self.design.worst_slack(MinMax::Max);
        let hold = self.design.worst_slack(MinMax::Min);
        log::warn!(
            "Power recovery exceeded timing budget; backed off {} actions ({} swaps, {} buffer removals) (wns {} floor {}, hold {} floor {}).",
            swaps + removals,
            swaps,
            removals,
            format_slack(wns),
            format_slack(self.floors.setup),
            format_slack(hold),
            format_slack(self.floors.hold)
        );
        if self.floors_violated() {
            log::warn!(
                "Power recovery timing budget still violated after backoff (wns {} floor {}, hold {} floor {}).",
                format_slack(wns),
                format_slack(self.floors.setup),
                format_slack(hold),
                format_slack(self.floors.hold)
            );
        }
        Ok(())
    }

    fn report(&mut self, is_final: bool) {
        let power = self.design.oracle.design_power().total;
        let area = self.design.area();
        let area_growth_pct = if self.baseline.area > 0.0 {
            (area - self.baseline.area) / self.baseline.area * 100.0
        } else {
            0.0
        };
        let record = ProgressRecord {
            iteration: self.iteration,
            is_final,
            area_growth_pct,
            swaps: self.stats.swaps,
            removed_buffers: self.stats.removed_buffers,
            wns: self.design.worst_slack(MinMax::Max),
            power,
            slew_violations: self.running_drv.slew,
            cap_violations: self.running_drv.cap,
            fanout_violations: self.running_drv.fanout,
        };
        self.sink.record(&record);
    }

    fn finish(mut self) -> RecoverPowerStats {
        let final_metrics = DesignMetrics::measure(self.design);
        self.running_drv = final_metrics.drv;
        if final_metrics.drv.exceeds(&self.baseline.drv) {
            let (b, f) = (self.baseline.drv, final_metrics.drv);
            log::warn!(
                "Power recovery increased DRV violations (slew {}/{} cap {}/{} fanout {}/{}).",
                b.slew,
                f.slew,
                b.cap,
                f.cap,
                b.fanout,
                f.fanout
            );
        }
        self.report(true);
        log::info!(
            "Applied {} cell swaps and removed {} buffers for power recovery.",
            self.stats.swaps,
            self.stats.removed_buffers
        );
        self.stats.baseline = self.baseline;
        self.stats.final_metrics = final_metrics;
        self.stats
    }
}

/// Recovers power with progress rows logged at `info`.
pub fn recover_power<O: TimingOracle>(
    design: &mut Design<O>,
    options: &RecoverPowerOptions,
) -> Result<RecoverPowerStats, String> {
    recover_power_with_progress(design, options, &mut LogProgress::default())
}

pub fn recover_power_with_progress<O: TimingOracle>(
    design: &mut Design<O>,
    options: &RecoverPowerOptions,
    sink: &mut dyn ProgressSink,
) -> Result<RecoverPowerStats, String> {
    options.validate()?;
    if design.netlist.in_transaction() {
        return Err("power recovery cannot start inside an open transaction".to_string());
    }
    design.update_timing(true);
    let baseline = DesignMetrics::measure(design);
    let floors = TimingFloors::new(
        baseline.wns,
        baseline.hold_wns,
        design.oracle.clock_period(),
        options,
    );
    log::info!(
        "power recovery: wns {} (floor {}, swap floor {}), hold {} (floor {}), power {:.3e}, drv {}",
        format_slack(baseline.wns),
        format_slack(floors.setup),
        format_slack(floors.swap),
        format_slack(baseline.hold_wns),
        format_slack(floors.hold),
        baseline.power,
        baseline.drv
    );
    let mut run = Recovery {
        design,
        options,
        sink,
        floors,
        baseline,
        running_drv: baseline.drv,
        stats: RecoverPowerStats::default(),
        iteration: 0,
        accepted: Vec::new(),
    };
    if options.percent > 0.0 {
        run.report(false);
        run.run_passes(Phase::Swap, floors.swap, options.swap_passes)?;
        run.run_passes(Phase::BufferRemoval, floors.setup, options.max_passes)?;
        run.run_passes(Phase::Swap, floors.setup, options.max_passes)?;
        run.back_off()?;
    }
    run.design.netlist.discard_saved();
    Ok(run.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::test_utils::{chain_description, gate, net, port};
    use crate::design::DesignDescription;
    use crate::liberty::PortDirection;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    const PS: f64 = 1e-12;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6 * PS
    }

    #[test]
    fn passing_design_keeps_zero_floors() {
        let floors = TimingFloors::new(25.0 * PS, 3.0 * PS, 1e-9, &RecoverPowerOptions::default());
        assert_eq!(
            floors,
            TimingFloors {
                setup: 0.0,
                swap: 0.0,
                hold: 0.0
            }
        );
        let unconstrained = TimingFloors::new(
            f64::INFINITY,
            f64::INFINITY,
            1e-9,
            &RecoverPowerOptions::default(),
        );
        assert_eq!(unconstrained.setup, 0.0);
        assert_eq!(unconstrained.hold, 0.0);
    }

    #[test]
    fn failing_design_gets_a_bounded_budget() {
        // budget = min(0.05 * 1010ps, 100ps) = 50.5ps, guard = 5ps.
        let floors = TimingFloors::new(-10.0 * PS, -2.0 * PS, 1e-9, &RecoverPowerOptions::default());
        assert!(close(floors.setup, -55.5 * PS), "{}", floors.setup);
        // Half budget 25.25ps, guard 5ps.
        assert!(close(floors.swap, -30.25 * PS), "{}", floors.swap);
        assert_eq!(floors.hold, -2.0 * PS);

        // A long period hits the hard cap: budget 100ps, guard 5ps.
        let capped = TimingFloors::new(-10.0 * PS, 0.0, 10e-9, &RecoverPowerOptions::default());
        assert!(close(capped.setup, -105.0 * PS), "{}", capped.setup);
    }

    #[test_case(-1.0 * PS, 1e-9)]
    #[test_case(-50.0 * PS, 2e-9)]
    #[test_case(-400.0 * PS, 1e-10)]
    #[test_case(-5.0 * PS, 0.0)]
    fn floors_never_exceed_the_baseline(wns: f64, period: f64) {
        let options = RecoverPowerOptions::default();
        let floors = TimingFloors::new(wns, wns, period, &options);
        assert!(floors.setup <= wns);
        assert!(floors.swap <= wns);
        assert!(floors.swap >= floors.setup);
        assert!(floors.setup >= wns - options.max_degrade);
    }

    #[test]
    fn validate_rejects_out_of_range_options() {
        assert!(RecoverPowerOptions::default().validate().is_ok());
        let bad = [
            RecoverPowerOptions {
                percent: f64::NAN,
                ..Default::default()
            },
            RecoverPowerOptions {
                percent: 1.5,
                ..Default::default()
            },
            RecoverPowerOptions {
                guard_frac: 1.5,
                ..Default::default()
            },
            RecoverPowerOptions {
                min_print_interval: 2000,
                ..Default::default()
            },
            RecoverPowerOptions {
                max_attempts_per_candidate: 0,
                ..Default::default()
            },
        ];
        for options in bad {
            assert!(options.validate().is_err(), "{:?}", options);
        }
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: RecoverPowerOptions =
            serde_json::from_str(r#"{"percent": 0.5, "max_passes": 1}"#).unwrap();
        assert_eq!(options.percent, 0.5);
        assert_eq!(options.max_passes, 1);
        assert_eq!(options.guard_cap, RecoverPowerOptions::default().guard_cap);
    }

    #[test]
    fn downsizes_a_slack_rich_chain() {
        let mut design = chain_description(&["INV_X2", "INV_X2"], 1e-9)
            .build()
            .unwrap();
        let before = design.oracle.design_power().total;
        let mut rows: Vec<ProgressRecord> = Vec::new();
        let stats =
            recover_power_with_progress(&mut design, &RecoverPowerOptions::default(), &mut rows)
                .unwrap();
        assert_eq!(stats.swaps, 2);
        assert_eq!(stats.removed_buffers, 0);
        assert_eq!(stats.accepted_edits_by_kind.get(&MoveKind::Downsize), Some(&2));
        for name in ["u0", "u1"] {
            let inst = design.netlist.find_instance(name).unwrap();
            assert_eq!(design.cell_name(inst), "INV_X1");
        }
        assert!(design.oracle.design_power().total < before);
        assert!(stats.final_metrics.wns >= 0.0);
        assert_eq!(design.netlist.saved_count(), 0);
        let last = rows.last().unwrap();
        assert!(last.is_final);
        assert_eq!(last.swaps, 2);
        assert!(last.area_growth_pct < 0.0);
    }

    #[test]
    fn nand_walks_down_size_then_threshold() {
        let mut design = chain_description(&["NAND2_X2", "NAND2_X1_LVT"], 1e-9)
            .build()
            .unwrap();
        let stats = recover_power(&mut design, &RecoverPowerOptions::default()).unwrap();
        let u0 = design.netlist.find_instance("u0").unwrap();
        let u1 = design.netlist.find_instance("u1").unwrap();
        // The weakest, lowest-leakage X1 flavor is tried first.
        assert_eq!(design.cell_name(u0), "NAND2_X1_HVT");
        assert_eq!(design.cell_name(u1), "NAND2_X1_HVT");
        assert_eq!(stats.accepted_edits_by_kind.get(&MoveKind::Downsize), Some(&1));
        assert_eq!(stats.accepted_edits_by_kind.get(&MoveKind::VtSwap), Some(&2));
        assert_eq!(stats.swaps, 3);
    }

    #[test]
    fn removes_a_redundant_buffer() {
        let mut design = chain_description(&["INV_X1", "BUF_X1", "INV_X1"], 1e-9)
            .build()
            .unwrap();
        let stats = recover_power(&mut design, &RecoverPowerOptions::default()).unwrap();
        assert_eq!(stats.removed_buffers, 1);
        assert!(design.netlist.find_instance("u1").is_none());
        let u0 = design.netlist.find_instance("u0").unwrap();
        let u2 = design.netlist.find_instance("u2").unwrap();
        let out = design.netlist.inst_pin(u0, "Y", &design.library).unwrap();
        let input = design.netlist.inst_pin(u2, "A", &design.library).unwrap();
        assert_eq!(design.netlist.pin_net(out), design.netlist.pin_net(input));
        assert!(design.netlist.find_net("n1").is_some());
        assert!(design.netlist.find_net("n2").is_none());
    }

    /// `in -> u0 -> n1`, where n1 feeds seven dangling inverters and a buffer
    /// that fans out to ten more. Merging the nets would put 17 loads on u0.
    fn fanout_description() -> DesignDescription {
        let mut desc = chain_description(&["INV_X1"], 1e-9);
        desc.ports = vec![
            port("in", PortDirection::Input, 0, "n0"),
            port("out", PortDirection::Output, 100, "k0_y"),
        ];
        desc.nets.push(net("n2"));
        desc.instances.push(gate("b0", "BUF_X1", 20, "n1", "n2"));
        for i in 0..7 {
            let y = format!("l{}_y", i);
            desc.nets.push(net(&y));
            desc.instances.push(gate(&format!("l{}", i), "INV_X1", 30, "n1", &y));
        }
        for i in 0..10 {
            let y = format!("k{}_y", i);
            desc.nets.push(net(&y));
            desc.instances.push(gate(&format!("k{}", i), "INV_X1", 40, "n2", &y));
        }
        desc
    }

    #[test]
    fn buffer_removal_that_breaks_fanout_is_rejected() {
        let mut design = fanout_description().build().unwrap();
        assert_eq!(DrvCounts::global(&design.oracle), DrvCounts::default());
        let stats = recover_power(&mut design, &RecoverPowerOptions::default()).unwrap();
        assert_eq!(stats.removed_buffers, 0);
        assert_eq!(stats.rejected_drv, 1);
        assert!(design.netlist.find_instance("b0").is_some());
        assert_eq!(stats.final_metrics.drv, DrvCounts::default());
    }

    #[test]
    fn zero_percent_changes_nothing() {
        let mut design = chain_description(&["INV_X2", "BUF_X1"], 1e-9)
            .build()
            .unwrap();
        let before = design.describe();
        let mut rows: Vec<ProgressRecord> = Vec::new();
        let options = RecoverPowerOptions {
            percent: 0.0,
            ..Default::default()
        };
        let stats = recover_power_with_progress(&mut design, &options, &mut rows).unwrap();
        assert_eq!(stats.attempts, 0);
        assert_eq!(design.describe(), before);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_final);
    }

    #[test]
    fn back_off_undoes_newest_edits_first() {
        let mut design = chain_description(&["INV_X2", "INV_X2"], 1e-9)
            .build()
            .unwrap();
        let options = RecoverPowerOptions::default();
        let baseline = DesignMetrics::measure(&design);
        let mut rows: Vec<ProgressRecord> = Vec::new();
        let mut run = Recovery {
            design: &mut design,
            options: &options,
            sink: &mut rows,
            floors: TimingFloors::new(baseline.wns, baseline.hold_wns, 1e-9, &options),
            baseline,
            running_drv: baseline.drv,
            stats: RecoverPowerStats::default(),
            iteration: 0,
            accepted: Vec::new(),
        };
        run.run_passes(Phase::Swap, 0.0, 1).unwrap();
        assert_eq!(run.stats.swaps, 2);
        // Demand more slack than the design ever had: everything is undone.
        run.floors.setup = baseline.wns + 10.0 * PS;
        run.back_off().unwrap();
        assert_eq!(run.stats.swaps, 0);
        assert_eq!(run.stats.backed_off, 2);
        assert!(run.stats.accepted_edits_by_kind.is_empty());
        assert_eq!(run.design.netlist.saved_count(), 0);
        for name in ["u0", "u1"] {
            let inst = run.design.netlist.find_instance(name).unwrap();
            assert_eq!(run.design.cell_name(inst), "INV_X2");
        }
    }
}
