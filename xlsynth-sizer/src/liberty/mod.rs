// SPDX-License-Identifier: Apache-2.0

pub mod cell_formula;
pub mod indexed;
pub mod library;
pub mod timing_table;
pub use indexed::IndexedLibrary;
pub use library::{
    Cell, CellId, CellKind, CellPort, Library, PortDirection, RiseFall, TimingArc, TimingSense,
    TimingType,
};
pub use timing_table::TimingTable;

/// Sample library with linear delay models, shared by unit and integration
/// tests.
pub mod test_utils {
    use super::*;

    pub const HEIGHT: i64 = 10;

    fn input(name: &str, cap: f64) -> CellPort {
        CellPort {
            name: name.to_string(),
            direction: PortDirection::Input,
            capacitance: cap,
            function: None,
            max_capacitance: None,
            max_transition: None,
            max_fanout: None,
            is_clock: false,
        }
    }

    fn output(name: &str, function: Option<&str>) -> CellPort {
        CellPort {
            name: name.to_string(),
            direction: PortDirection::Output,
            capacitance: 0.0,
            function: function.map(|f| f.to_string()),
            max_capacitance: Some(1e-13),
            max_transition: None,
            max_fanout: None,
            is_clock: false,
        }
    }

    /// Arc with `delay = d0 + 0.1 * slew + r * load` and
    /// `transition = 0.75 * d0 + 2 * r * load`.
    pub fn linear_arc(from: &str, to: &str, sense: TimingSense, d0: f64, r: f64) -> TimingArc {
        let delay = TimingTable::from_linear_model(d0, 0.1, r);
        let transition = TimingTable::from_linear_model(d0 * 0.75, 0.0, 2.0 * r);
        TimingArc {
            from: from.to_string(),
            to: to.to_string(),
            sense,
            timing_type: TimingType::Combinational,
            cell_rise: Some(delay.clone()),
            cell_fall: Some(delay),
            rise_transition: Some(transition.clone()),
            fall_transition: Some(transition),
            rise_constraint: None,
            fall_constraint: None,
        }
    }

    pub struct CombSpec<'a> {
        pub name: &'a str,
        pub inputs: &'a [&'a str],
        pub function: &'a str,
        pub sense: TimingSense,
        pub strength: f64,
        pub leakage: f64,
        pub vt: Option<&'a str>,
    }

    /// Combinational cell whose area, width, input capacitance and drive scale
    /// with `strength`.
    pub fn comb_cell(spec: CombSpec<'_>) -> Cell {
        let mut ports: Vec<CellPort> = spec
            .inputs
            .iter()
            .map(|n| input(n, 1e-15 * spec.strength))
            .collect();
        ports.push(output("Y", Some(spec.function)));
        let timing_arcs = spec
            .inputs
            .iter()
            .map(|n| linear_arc(n, "Y", spec.sense, 20e-12, 2e3 / spec.strength))
            .collect();
        Cell {
            name: spec.name.to_string(),
            area: spec.strength * spec.inputs.len().max(1) as f64,
            width: (2.0 * spec.strength) as i64 * spec.inputs.len().max(1) as i64,
            height: HEIGHT,
            ports,
            timing_arcs,
            leakage_power: Some(spec.leakage),
            internal_energy: Some(1e-15 * spec.strength),
            dont_use: false,
            kind: CellKind::Logic,
            vt_class: spec.vt.map(|v| v.to_string()),
        }
    }

    fn tie_cell(name: &str, value: &str) -> Cell {
        Cell {
            name: name.to_string(),
            area: 1.0,
            width: 2,
            height: HEIGHT,
            ports: vec![output("Y", Some(value))],
            timing_arcs: vec![],
            leakage_power: Some(1e-9),
            internal_energy: None,
            dont_use: false,
            kind: CellKind::Logic,
            vt_class: None,
        }
    }

    fn dff() -> Cell {
        let mut ck = input("CK", 1e-15);
        ck.is_clock = true;
        let mut setup = linear_arc("CK", "D", TimingSense::NonUnate, 0.0, 0.0);
        setup.timing_type = TimingType::Setup;
        setup.cell_rise = None;
        setup.cell_fall = None;
        setup.rise_transition = None;
        setup.fall_transition = None;
        setup.rise_constraint = Some(TimingTable::scalar(30e-12));
        setup.fall_constraint = Some(TimingTable::scalar(30e-12));
        let mut hold = setup.clone();
        hold.timing_type = TimingType::Hold;
        hold.rise_constraint = Some(TimingTable::scalar(10e-12));
        hold.fall_constraint = Some(TimingTable::scalar(10e-12));
        let mut clk_to_q = linear_arc("CK", "Q", TimingSense::NonUnate, 50e-12, 2e3);
        clk_to_q.timing_type = TimingType::RisingEdge;
        Cell {
            name: "DFF_X1".to_string(),
            area: 6.0,
            width: 12,
            height: HEIGHT,
            ports: vec![input("D", 1e-15), ck, output("Q", Some("IQ"))],
            timing_arcs: vec![setup, hold, clk_to_q],
            leakage_power: Some(5e-9),
            internal_energy: Some(3e-15),
            dont_use: false,
            kind: CellKind::Sequential,
            vt_class: None,
        }
    }

    fn spec(
        name: &'static str,
        inputs: &'static [&'static str],
        function: &'static str,
        sense: TimingSense,
        strength: f64,
        leakage: f64,
        vt: Option<&'static str>,
    ) -> CombSpec<'static> {
        CombSpec {
            name,
            inputs,
            function,
            sense,
            strength,
            leakage,
            vt,
        }
    }

    /// Small library used across unit tests. Contains inverters, buffers,
    /// NAND2 in three threshold-voltage flavors, the basic 2-input gates,
    /// tie cells and a flop.
    pub fn make_test_library() -> Library {
        use TimingSense::*;
        let cells = vec![
            comb_cell(spec("INV_X1", &["A"], "!A", NegativeUnate, 1.0, 1e-9, None)),
            comb_cell(spec("INV_X2", &["A"], "!A", NegativeUnate, 2.0, 2e-9, None)),
            comb_cell(spec("BUF_X1", &["A"], "A", PositiveUnate, 1.0, 1e-9, None)),
            comb_cell(spec("BUF_X2", &["A"], "A", PositiveUnate, 2.0, 2e-9, None)),
            comb_cell(spec("BUF_X4", &["A"], "A", PositiveUnate, 4.0, 4e-9, None)),
            comb_cell(spec("NAND2_X1", &["A", "B"], "!(A * B)", NegativeUnate, 1.0, 2e-9, Some("svt"))),
            comb_cell(spec("NAND2_X1_HVT", &["A", "B"], "!(A * B)", NegativeUnate, 1.0, 1e-9, Some("hvt"))),
            comb_cell(spec("NAND2_X1_LVT", &["A", "B"], "!(A * B)", NegativeUnate, 1.0, 4e-9, Some("lvt"))),
            comb_cell(spec("NAND2_X2", &["A", "B"], "!(A * B)", NegativeUnate, 2.0, 4e-9, Some("svt"))),
            comb_cell(spec("AND2_X1", &["A", "B"], "A & B", PositiveUnate, 1.0, 2e-9, None)),
            comb_cell(spec("OR2_X1", &["A", "B"], "A + B", PositiveUnate, 1.0, 2e-9, None)),
            comb_cell(spec("NOR2_X1", &["A", "B"], "!(A + B)", NegativeUnate, 1.0, 2e-9, None)),
            comb_cell(spec("XOR2_X1", &["A", "B"], "A ^ B", NonUnate, 1.0, 3e-9, None)),
            comb_cell(spec("XNOR2_X1", &["A", "B"], "!(A ^ B)", NonUnate, 1.0, 3e-9, None)),
            comb_cell(spec("AOI21_X1", &["A1", "A2", "B"], "!((A1 * A2) + B)", NegativeUnate, 1.0, 3e-9, None)),
            tie_cell("TIEHI", "1"),
            tie_cell("TIELO", "0"),
            dff(),
        ];
        Library {
            name: "test_lib".to_string(),
            cells,
            default_max_transition: Some(500e-12),
            default_max_capacitance: None,
            default_max_fanout: Some(16.0),
        }
    }
}
