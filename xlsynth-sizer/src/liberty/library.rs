// SPDX-License-Identifier: Apache-2.0

//! Serializable cell library model.
//!
//! This is the subset of Liberty (plus the physical master's footprint) that
//! sizing decisions need: ports with capacitance and design-rule limits, a
//! boolean function per output, NLDM timing arcs, leakage, and the
//! don't-use flag.

use crate::liberty::timing_table::{TimingTable, TimingTableError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    Inout,
    Power,
    Ground,
}

impl PortDirection {
    pub fn is_input(self) -> bool {
        matches!(self, PortDirection::Input | PortDirection::Inout)
    }

    pub fn is_output(self) -> bool {
        matches!(self, PortDirection::Output | PortDirection::Inout)
    }

    pub fn is_supply(self) -> bool {
        matches!(self, PortDirection::Power | PortDirection::Ground)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    #[default]
    Logic,
    Sequential,
    Macro,
    Pad,
    ClockGate,
    /// Fillers, taps, end caps and the like.
    Physical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingSense {
    #[default]
    PositiveUnate,
    NegativeUnate,
    NonUnate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingType {
    #[default]
    Combinational,
    RisingEdge,
    FallingEdge,
    Setup,
    Hold,
}

impl TimingType {
    pub fn is_check(self) -> bool {
        matches!(self, TimingType::Setup | TimingType::Hold)
    }

    pub fn is_clock_to_output(self) -> bool {
        matches!(self, TimingType::RisingEdge | TimingType::FallingEdge)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiseFall {
    Rise,
    Fall,
}

impl RiseFall {
    pub const ALL: [RiseFall; 2] = [RiseFall::Rise, RiseFall::Fall];

    pub fn index(self) -> usize {
        match self {
            RiseFall::Rise => 0,
            RiseFall::Fall => 1,
        }
    }

    pub fn opposite(self) -> RiseFall {
        match self {
            RiseFall::Rise => RiseFall::Fall,
            RiseFall::Fall => RiseFall::Rise,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellPort {
    pub name: String,
    pub direction: PortDirection,
    #[serde(default)]
    pub capacitance: f64,
    /// Liberty function string; only meaningful on outputs.
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub max_capacitance: Option<f64>,
    #[serde(default)]
    pub max_transition: Option<f64>,
    #[serde(default)]
    pub max_fanout: Option<f64>,
    #[serde(default)]
    pub is_clock: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingArc {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub sense: TimingSense,
    #[serde(default)]
    pub timing_type: TimingType,
    #[serde(default)]
    pub cell_rise: Option<TimingTable>,
    #[serde(default)]
    pub cell_fall: Option<TimingTable>,
    #[serde(default)]
    pub rise_transition: Option<TimingTable>,
    #[serde(default)]
    pub fall_transition: Option<TimingTable>,
    /// Check arcs: constraint for a rising / falling data transition.
    #[serde(default)]
    pub rise_constraint: Option<TimingTable>,
    #[serde(default)]
    pub fall_constraint: Option<TimingTable>,
}

impl TimingArc {
    pub fn delay_table(&self, out_rf: RiseFall) -> Option<&TimingTable> {
        match out_rf {
            RiseFall::Rise => self.cell_rise.as_ref(),
            RiseFall::Fall => self.cell_fall.as_ref(),
        }
    }

    pub fn transition_table(&self, out_rf: RiseFall) -> Option<&TimingTable> {
        match out_rf {
            RiseFall::Rise => self.rise_transition.as_ref(),
            RiseFall::Fall => self.fall_transition.as_ref(),
        }
    }

    pub fn constraint_table(&self, data_rf: RiseFall) -> Option<&TimingTable> {
        match data_rf {
            RiseFall::Rise => self.rise_constraint.as_ref(),
            RiseFall::Fall => self.fall_constraint.as_ref(),
        }
    }

    /// Input transitions that can cause `out_rf` at the arc's output.
    pub fn input_transitions(&self, out_rf: RiseFall) -> &'static [RiseFall] {
        match (self.sense, out_rf) {
            (TimingSense::PositiveUnate, RiseFall::Rise) => &[RiseFall::Rise],
            (TimingSense::PositiveUnate, RiseFall::Fall) => &[RiseFall::Fall],
            (TimingSense::NegativeUnate, RiseFall::Rise) => &[RiseFall::Fall],
            (TimingSense::NegativeUnate, RiseFall::Fall) => &[RiseFall::Rise],
            (TimingSense::NonUnate, _) => &RiseFall::ALL,
        }
    }

    fn tables(&self) -> impl Iterator<Item = &TimingTable> {
        [
            &self.cell_rise,
            &self.cell_fall,
            &self.rise_transition,
            &self.fall_transition,
            &self.rise_constraint,
            &self.fall_constraint,
        ]
        .into_iter()
        .flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub name: String,
    #[serde(default)]
    pub area: f64,
    /// Physical master footprint, in database units.
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    pub ports: Vec<CellPort>,
    #[serde(default)]
    pub timing_arcs: Vec<TimingArc>,
    #[serde(default)]
    pub leakage_power: Option<f64>,
    /// Energy per output transition, used for internal power.
    #[serde(default)]
    pub internal_energy: Option<f64>,
    #[serde(default)]
    pub dont_use: bool,
    #[serde(default)]
    pub kind: CellKind,
    #[serde(default)]
    pub vt_class: Option<String>,
}

impl Cell {
    pub fn port(&self, name: &str) -> Option<&CellPort> {
        self.ports.iter().find(|p| p.name == name)
    }

    pub fn port_index(&self, name: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.name == name)
    }

    pub fn input_ports(&self) -> impl Iterator<Item = &CellPort> {
        self.ports.iter().filter(|p| p.direction.is_input())
    }

    pub fn output_ports(&self) -> impl Iterator<Item = &CellPort> {
        self.ports.iter().filter(|p| p.direction.is_output())
    }

    pub fn is_sequential(&self) -> bool {
        self.kind == CellKind::Sequential
    }

    /// Logic cells are the only ones the optimizers may resize.
    pub fn is_logic(&self) -> bool {
        self.kind == CellKind::Logic
    }

    /// Geometric area of the physical master.
    pub fn footprint_area(&self) -> i64 {
        self.width * self.height
    }

    /// Arcs ending at `to` that carry delay (not setup/hold checks).
    pub fn delay_arcs_to<'a>(&'a self, to: &'a str) -> impl Iterator<Item = &'a TimingArc> + 'a {
        self.timing_arcs
            .iter()
            .filter(move |a| a.to == to && !a.timing_type.is_check())
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Library {
    pub name: String,
    pub cells: Vec<Cell>,
    #[serde(default)]
    pub default_max_transition: Option<f64>,
    #[serde(default)]
    pub default_max_capacitance: Option<f64>,
    #[serde(default)]
    pub default_max_fanout: Option<f64>,
}

impl Library {
    pub fn validate(&self) -> Result<(), String> {
        for cell in &self.cells {
            for arc in &cell.timing_arcs {
                if cell.port(&arc.from).is_none() || cell.port(&arc.to).is_none() {
                    return Err(format!(
                        "cell {} has arc {} -> {} referencing an unknown port",
                        cell.name, arc.from, arc.to
                    ));
                }
                arc.tables()
                    .try_for_each(TimingTable::validate)
                    .map_err(|e: TimingTableError| {
                        format!("cell {} arc {} -> {}: {}", cell.name, arc.from, arc.to, e)
                    })?;
            }
        }
        Ok(())
    }
}
