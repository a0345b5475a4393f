// SPDX-License-Identifier: Apache-2.0

//! NLDM timing tables indexed by input transition and output load.
//!
//! `TimingTable` stores values in a flattened row-major vector. `index_1` is
//! the input-transition axis and `index_2` the load-capacitance axis; either
//! may be empty, giving 1-D or scalar tables. Lookups interpolate bilinearly
//! and extrapolate linearly past the table edges, which is how Liberty
//! consumers treat out-of-range points.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum TimingTableError {
    InvalidValueCount {
        index_1_len: usize,
        index_2_len: usize,
        expected_values: usize,
        actual_values: usize,
    },
    NonIncreasingIndex {
        axis: usize,
    },
}

impl fmt::Display for TimingTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingTableError::InvalidValueCount {
                index_1_len,
                index_2_len,
                expected_values,
                actual_values,
            } => write!(
                f,
                "timing table shape [{}, {}] expects {} values, found {}",
                index_1_len, index_2_len, expected_values, actual_values
            ),
            TimingTableError::NonIncreasingIndex { axis } => {
                write!(f, "timing table index_{} is not strictly increasing", axis)
            }
        }
    }
}

impl std::error::Error for TimingTableError {}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingTable {
    /// Input transition breakpoints.
    #[serde(default)]
    pub index_1: Vec<f64>,
    /// Output load capacitance breakpoints.
    #[serde(default)]
    pub index_2: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimingTable {
    pub fn scalar(value: f64) -> Self {
        TimingTable {
            index_1: vec![],
            index_2: vec![],
            values: vec![value],
        }
    }

    /// Two-point table that reproduces `base + per_slew * slew + per_load *
    /// load` exactly under bilinear interpolation and extrapolation.
    pub fn from_linear_model(base: f64, per_slew: f64, per_load: f64) -> Self {
        const SLEW_SPAN: f64 = 1e-9;
        const LOAD_SPAN: f64 = 1e-12;
        TimingTable {
            index_1: vec![0.0, SLEW_SPAN],
            index_2: vec![0.0, LOAD_SPAN],
            values: vec![
                base,
                base + per_load * LOAD_SPAN,
                base + per_slew * SLEW_SPAN,
                base + per_slew * SLEW_SPAN + per_load * LOAD_SPAN,
            ],
        }
    }

    pub fn new(
        index_1: Vec<f64>,
        index_2: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, TimingTableError> {
        let table = TimingTable {
            index_1,
            index_2,
            values,
        };
        table.validate()?;
        Ok(table)
    }

    fn rows(&self) -> usize {
        self.index_1.len().max(1)
    }

    fn cols(&self) -> usize {
        self.index_2.len().max(1)
    }

    pub fn validate(&self) -> Result<(), TimingTableError> {
        let expected_values = self.rows() * self.cols();
        if expected_values != self.values.len() {
            return Err(TimingTableError::InvalidValueCount {
                index_1_len: self.index_1.len(),
                index_2_len: self.index_2.len(),
                expected_values,
                actual_values: self.values.len(),
            });
        }
        for (axis, index) in [(1, &self.index_1), (2, &self.index_2)] {
            if index.windows(2).any(|w| w[1] <= w[0]) {
                return Err(TimingTableError::NonIncreasingIndex { axis });
            }
        }
        Ok(())
    }

    fn at(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols() + col]
    }

    /// Looks up the table at `(input_slew, load)`.
    ///
    /// Callers are expected to have validated the table; a malformed table
    /// yields `f64::INFINITY` rather than panicking.
    pub fn lookup(&self, input_slew: f64, load: f64) -> f64 {
        if self.values.len() != self.rows() * self.cols() {
            return f64::INFINITY;
        }
        let (r0, r1, fr) = bracket(&self.index_1, input_slew);
        let (c0, c1, fc) = bracket(&self.index_2, load);
        let v00 = self.at(r0, c0);
        let v01 = self.at(r0, c1);
        let v10 = self.at(r1, c0);
        let v11 = self.at(r1, c1);
        let top = v00 + (v01 - v00) * fc;
        let bottom = v10 + (v11 - v10) * fc;
        top + (bottom - top) * fr
    }
}

/// Returns the segment `(lo, hi)` of `axis` used for `x`, plus the fractional
/// position of `x` within it. Points outside the axis use the end segments,
/// so the fraction can fall outside `[0, 1]`.
fn bracket(axis: &[f64], x: f64) -> (usize, usize, f64) {
    if axis.len() < 2 {
        return (0, 0, 0.0);
    }
    let mut lo = 0;
    while lo + 2 < axis.len() && x > axis[lo + 1] {
        lo += 1;
    }
    let (x0, x1) = (axis[lo], axis[lo + 1]);
    (lo, lo + 1, (x - x0) / (x1 - x0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_two() -> TimingTable {
        // delay = 1 + slew + 10 * load over the grid.
        TimingTable::new(
            vec![0.0, 1.0],
            vec![0.0, 1.0],
            vec![1.0, 11.0, 2.0, 12.0],
        )
        .unwrap()
    }

    #[test]
    fn table_hits_grid_points() {
        let t = two_by_two();
        assert_eq!(t.lookup(0.0, 0.0), 1.0);
        assert_eq!(t.lookup(0.0, 1.0), 11.0);
        assert_eq!(t.lookup(1.0, 0.0), 2.0);
        assert_eq!(t.lookup(1.0, 1.0), 12.0);
    }

    #[test]
    fn table_interpolates_and_extrapolates_bilinearly() {
        let t = two_by_two();
        assert!((t.lookup(0.5, 0.5) - 6.5).abs() < 1e-12);
        assert!((t.lookup(0.0, 2.0) - 21.0).abs() < 1e-12);
        assert!((t.lookup(-1.0, 0.0) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn table_supports_one_dimensional_load_axis() {
        let t = TimingTable::new(vec![], vec![1.0, 3.0, 5.0], vec![10.0, 30.0, 40.0]).unwrap();
        assert_eq!(t.lookup(123.0, 2.0), 20.0);
        assert_eq!(t.lookup(0.0, 4.0), 35.0);
        assert_eq!(t.lookup(0.0, 7.0), 50.0);
    }

    #[test]
    fn table_handles_scalars() {
        let t = TimingTable::scalar(42.0);
        assert!(t.validate().is_ok());
        assert_eq!(t.lookup(5.0, 5.0), 42.0);
    }

    #[test]
    fn table_rejects_shape_mismatch() {
        let err = TimingTable::new(vec![0.0, 1.0], vec![0.0, 1.0], vec![0.1, 0.2, 0.3]).unwrap_err();
        assert_eq!(
            err,
            TimingTableError::InvalidValueCount {
                index_1_len: 2,
                index_2_len: 2,
                expected_values: 4,
                actual_values: 3
            }
        );
    }

    #[test]
    fn table_rejects_unsorted_index() {
        let err = TimingTable::new(vec![1.0, 0.5], vec![], vec![0.1, 0.2]).unwrap_err();
        assert_eq!(err, TimingTableError::NonIncreasingIndex { axis: 1 });
    }
}
