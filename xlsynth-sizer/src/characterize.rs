// SPDX-License-Identifier: Apache-2.0

//! Electrical characterization of library cells from their NLDM tables.
//!
//! The library-wide target slew is the average output transition of the
//! usable buffers when each drives ten times its own input capacitance. A
//! cell's target load is the load at which its arcs produce that target slew
//! given the target slew at their inputs, found by bisection per arc and
//! averaged. Both are cached until the library epoch moves.
//!
//! Lookups that find no arc or table report a `LookupError`; the `*_or_inf`
//! forms map that to `f64::INFINITY` so callers treat the cell as "cannot be
//! evaluated" instead of doing arithmetic on a made-up number.

use crate::liberty::{CellId, IndexedLibrary, RiseFall, TimingArc, TimingTable};
use std::fmt;

/// Buffer load used when deriving the target slew, as a multiple of the
/// buffer's own input capacitance (an approximate constant).
pub const TARGET_SLEW_LOAD_FACTOR: f64 = 10.0;

/// Starting load and step for the target-load bisection, in farads.
const CAP_INIT: f64 = 1e-12;
const CAP_TOLERANCE: f64 = CAP_INIT * 0.001;
const MAX_BISECTION_STEPS: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    NoTimingArc { cell: String },
    NoTable { cell: String, from: String, to: String },
    NoBufferCells,
    NoConvergence { cell: String },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::NoTimingArc { cell } => write!(f, "cell {} has no delay arcs", cell),
            LookupError::NoTable { cell, from, to } => {
                write!(f, "cell {} arc {} -> {} has no table", cell, from, to)
            }
            LookupError::NoBufferCells => f.write_str("library has no usable buffer cells"),
            LookupError::NoConvergence { cell } => {
                write!(f, "target load search for cell {} did not converge", cell)
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Bisection for the load at which `table` yields `out_slew` when driven with
/// `in_slew`.
fn find_target_load(table: &TimingTable, in_slew: f64, out_slew: f64) -> Option<f64> {
    let mut load = CAP_INIT;
    let mut step = CAP_INIT;
    let mut steps = 0;
    while step > CAP_TOLERANCE {
        let slew = table.lookup(in_slew, load);
        if slew > out_slew {
            load -= step;
            step /= 2.0;
        }
        load += step;
        steps += 1;
        if steps > MAX_BISECTION_STEPS {
            return None;
        }
    }
    Some(load.max(0.0))
}

impl IndexedLibrary {
    /// Delay of `arc` producing `out_rf`, worst over the input transitions
    /// that can cause it.
    pub fn arc_delay(&self, arc: &TimingArc, out_rf: RiseFall, in_slew: f64, load: f64) -> Option<f64> {
        arc.delay_table(out_rf).map(|t| t.lookup(in_slew, load))
    }

    pub fn arc_slew(&self, arc: &TimingArc, out_rf: RiseFall, in_slew: f64, load: f64) -> Option<f64> {
        arc.transition_table(out_rf).map(|t| t.lookup(in_slew, load))
    }

    fn worst_over_arcs(
        &self,
        cell: CellId,
        in_slew: f64,
        load: f64,
        pick: impl Fn(&TimingArc, RiseFall) -> Option<&TimingTable>,
    ) -> Result<f64, LookupError> {
        let c = self.cell(cell);
        let mut worst: Option<f64> = None;
        for arc in c.timing_arcs.iter().filter(|a| !a.timing_type.is_check()) {
            for rf in RiseFall::ALL {
                if let Some(table) = pick(arc, rf) {
                    let v = table.lookup(in_slew, load);
                    worst = Some(worst.map_or(v, |w| w.max(v)));
                }
            }
        }
        worst.ok_or_else(|| LookupError::NoTimingArc {
            cell: c.name.clone(),
        })
    }

    /// Worst delay over the cell's delay arcs at the given load and input slew.
    pub fn gate_delay(&self, cell: CellId, load: f64, in_slew: f64) -> Result<f64, LookupError> {
        self.worst_over_arcs(cell, in_slew, load, |arc, rf| arc.delay_table(rf))
    }

    pub fn gate_delay_or_inf(&self, cell: CellId, load: f64, in_slew: f64) -> f64 {
        self.gate_delay(cell, load, in_slew).unwrap_or(f64::INFINITY)
    }

    /// Worst output transition over the cell's delay arcs.
    pub fn gate_slew(&self, cell: CellId, load: f64, in_slew: f64) -> Result<f64, LookupError> {
        self.worst_over_arcs(cell, in_slew, load, |arc, rf| arc.transition_table(rf))
    }

    /// Target slew for each output transition, indexed by `RiseFall::index`.
    pub fn target_slews(&self) -> Result<[f64; 2], LookupError> {
        self.target_slews
            .get_or_compute(self.epoch(), || self.compute_target_slews())
    }

    pub fn target_slew(&self, rf: RiseFall) -> Result<f64, LookupError> {
        self.target_slews().map(|s| s[rf.index()])
    }

    fn compute_target_slews(&self) -> Result<[f64; 2], LookupError> {
        let mut sums = [0.0f64; 2];
        let mut counts = [0usize; 2];
        for buffer in self.buffer_cells() {
            let cell = self.cell(buffer);
            for arc in cell.timing_arcs.iter().filter(|a| !a.timing_type.is_check()) {
                let Some(input) = cell.port(&arc.from) else {
                    continue;
                };
                let load = input.capacitance * TARGET_SLEW_LOAD_FACTOR;
                for rf in RiseFall::ALL {
                    let Some(table) = arc.transition_table(rf) else {
                        continue;
                    };
                    // Once from an ideal edge, then again from the slew it
                    // produced.
                    let first = table.lookup(0.0, load);
                    let slew = table.lookup(first, load);
                    sums[rf.index()] += slew;
                    counts[rf.index()] += 1;
                }
            }
        }
        if counts.iter().any(|c| *c == 0) {
            log::warn!("no usable buffer arcs; target slew unavailable");
            return Err(LookupError::NoBufferCells);
        }
        let slews = [sums[0] / counts[0] as f64, sums[1] / counts[1] as f64];
        log::debug!(
            "target slews rise {:.3e} fall {:.3e} over {} buffer arcs",
            slews[0],
            slews[1],
            counts[0]
        );
        Ok(slews)
    }

    /// Load at which `cell` reproduces the target slew, averaged over its
    /// delay arcs.
    pub fn target_load(&self, cell: CellId) -> Result<f64, LookupError> {
        self.target_loads
            .get_or_insert_with(self.epoch(), cell, || self.compute_target_load(cell))
    }

    pub fn target_load_or_inf(&self, cell: CellId) -> f64 {
        self.target_load(cell).unwrap_or(f64::INFINITY)
    }

    fn compute_target_load(&self, cell: CellId) -> Result<f64, LookupError> {
        let target = self.target_slews()?;
        let c = self.cell(cell);
        let mut sum = 0.0;
        let mut count = 0usize;
        for arc in c.timing_arcs.iter().filter(|a| !a.timing_type.is_check()) {
            for out_rf in RiseFall::ALL {
                let Some(table) = arc.transition_table(out_rf) else {
                    continue;
                };
                for in_rf in arc.input_transitions(out_rf) {
                    let load = find_target_load(
                        table,
                        target[in_rf.index()],
                        target[out_rf.index()],
                    )
                    .ok_or_else(|| LookupError::NoConvergence {
                        cell: c.name.clone(),
                    })?;
                    sum += load;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return Err(LookupError::NoTimingArc {
                cell: c.name.clone(),
            });
        }
        Ok(sum / count as f64)
    }

    /// Largest incremental delay per farad over the cell's delay arcs, i.e.
    /// the effective output resistance. Weaker cells have larger values.
    pub fn drive_resistance(&self, cell: CellId) -> Result<f64, LookupError> {
        let in_slew = self.target_slew(RiseFall::Rise).unwrap_or(0.0);
        let c = self.cell(cell);
        let mut worst: Option<f64> = None;
        for arc in c.timing_arcs.iter().filter(|a| !a.timing_type.is_check()) {
            for rf in RiseFall::ALL {
                if let Some(table) = arc.delay_table(rf) {
                    let r = (table.lookup(in_slew, CAP_INIT) - table.lookup(in_slew, 0.0)) / CAP_INIT;
                    worst = Some(worst.map_or(r, |w| w.max(r)));
                }
            }
        }
        worst.ok_or_else(|| LookupError::NoTimingArc {
            cell: c.name.clone(),
        })
    }

    /// Largest input pin capacitance of the cell.
    pub fn input_capacitance(&self, cell: CellId) -> f64 {
        self.cell(cell)
            .input_ports()
            .map(|p| p.capacitance)
            .fold(0.0, f64::max)
    }

    pub fn cell_leakage(&self, cell: CellId) -> Option<f64> {
        self.leakage(cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liberty::test_utils::make_test_library;

    fn lib() -> IndexedLibrary {
        IndexedLibrary::new(make_test_library()).unwrap()
    }

    #[test]
    fn bisection_finds_load_on_linear_table() {
        // transition = 10ps + 4000 ohm * load
        let table = TimingTable::from_linear_model(10e-12, 0.0, 4e3);
        let out_slew = 50e-12;
        let expected = (out_slew - 10e-12) / 4e3;
        let load = find_target_load(&table, 0.0, out_slew).unwrap();
        assert!((load - expected).abs() < 2.0 * CAP_TOLERANCE, "{} vs {}", load, expected);
    }

    #[test]
    fn bisection_gives_up_on_flat_table() {
        let table = TimingTable::scalar(1e-12);
        assert_eq!(find_target_load(&table, 0.0, 5e-12), None);
    }

    #[test]
    fn target_slew_averages_buffers() {
        let lib = lib();
        // Each buffer: transition = 15ps + 2 * (2k / strength) * load with
        // load = 10 * (1fF * strength), so every buffer gives 15ps + 40ps.
        let rise = lib.target_slew(RiseFall::Rise).unwrap();
        let fall = lib.target_slew(RiseFall::Fall).unwrap();
        assert!((rise - 55e-12).abs() < 1e-15, "{}", rise);
        assert!((fall - 55e-12).abs() < 1e-15, "{}", fall);
    }

    #[test]
    fn target_load_scales_with_drive_strength() {
        let lib = lib();
        let x1 = lib.target_load(lib.cell_by_name("INV_X1").unwrap()).unwrap();
        let x2 = lib.target_load(lib.cell_by_name("INV_X2").unwrap()).unwrap();
        // 55ps = 15ps + 4k * load for X1; half the resistance for X2.
        assert!((x1 - 1e-14).abs() < 2.0 * CAP_TOLERANCE, "{}", x1);
        assert!(x2 > x1);
    }

    #[test]
    fn missing_arcs_are_infinite_not_fatal() {
        let lib = lib();
        let tie = lib.cell_by_name("TIEHI").unwrap();
        assert!(matches!(lib.target_load(tie), Err(LookupError::NoTimingArc { .. })));
        assert_eq!(lib.target_load_or_inf(tie), f64::INFINITY);
        assert_eq!(lib.gate_delay_or_inf(tie, 1e-15, 0.0), f64::INFINITY);
    }

    #[test]
    fn no_buffers_means_no_target_slew() {
        let mut lib = lib();
        for name in ["BUF_X1", "BUF_X2", "BUF_X4"] {
            let id = lib.cell_by_name(name).unwrap();
            lib.set_dont_use(id, true);
        }
        assert_eq!(lib.target_slews(), Err(LookupError::NoBufferCells));
        let inv = lib.cell_by_name("INV_X1").unwrap();
        assert_eq!(lib.target_load_or_inf(inv), f64::INFINITY);
    }

    #[test]
    fn drive_resistance_orders_strengths() {
        let lib = lib();
        let r1 = lib.drive_resistance(lib.cell_by_name("NAND2_X1").unwrap()).unwrap();
        let r2 = lib.drive_resistance(lib.cell_by_name("NAND2_X2").unwrap()).unwrap();
        assert!((r1 - 2e3).abs() < 1e-6, "{}", r1);
        assert!(r2 < r1);
        assert_eq!(lib.input_capacitance(lib.cell_by_name("NAND2_X2").unwrap()), 2e-15);
    }
}
