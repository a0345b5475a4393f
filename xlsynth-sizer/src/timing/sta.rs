// SPDX-License-Identifier: Apache-2.0

//! Reference static timing engine.
//!
//! Single corner with rise/fall transitions and one ideal clock. The graph
//! has one vertex per pin: wire edges run from a net's driver to each of its
//! loads, cell edges follow the library's delay arcs, and clock-to-output
//! arcs launch data paths at sequential outputs. Setup and hold checks come
//! from constraint arcs at sequential data pins; primary outputs are required
//! at `period - output_delay`. Every `update_timing` rebuilds the graph from
//! the netlist, so the engine never holds a reference to it.

use super::parasitics::WireEstimate;
use super::{MinMax, ParasiticModel, PathEnd, PowerResult, TimingOracle};
use crate::cache::Epoch;
use crate::liberty::{CellId, IndexedLibrary, RiseFall, TimingArc, TimingType};
use crate::netlist::{InstId, NetId, Netlist, PinId, PinOwner, SignalType};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

const MIN: usize = 0;
const MAX: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    /// Top-level port carrying the ideal clock.
    pub clock_port: Option<String>,
    /// Clock period in seconds.
    pub period: f64,
    pub input_delay: f64,
    pub output_delay: f64,
    /// Transition at primary inputs.
    pub input_slew: f64,
    /// Capacitance presented by each primary output.
    pub output_load: f64,
    pub vdd: f64,
    /// Toggle probability per cycle of data nets. Clock nets toggle every
    /// cycle.
    pub activity: f64,
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            clock_port: None,
            period: 1e-9,
            input_delay: 0.0,
            output_delay: 0.0,
            input_slew: 0.0,
            output_load: 0.0,
            vdd: 1.0,
            activity: 0.1,
        }
    }
}

impl Constraints {
    /// Power and required times divide by or offset from the period, so it
    /// must be a positive finite number.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(format!("clock period must be positive; got {}", self.period));
        }
        if !(self.activity.is_finite() && (0.0..=1.0).contains(&self.activity)) {
            return Err(format!("activity must be in [0, 1]; got {}", self.activity));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EdgeKind {
    Wire,
    Cell { cell: CellId, arc: usize },
    Launch { cell: CellId, arc: usize },
}

#[derive(Debug, Clone)]
struct Edge {
    from: PinId,
    to: PinId,
    kind: EdgeKind,
    disabled: bool,
    /// `[min_max][out_rf][in_rf]`; NaN where the transition pair does not
    /// propagate through the edge.
    delay: [[[f64; 2]; 2]; 2],
}

#[derive(Debug, Clone, Copy, Default)]
struct CheckArcs {
    setup: Option<(CellId, usize)>,
    hold: Option<(CellId, usize)>,
}

#[derive(Debug, Clone, Copy)]
struct Vertex {
    live: bool,
    is_driver: bool,
    is_clock: bool,
    is_output_port: bool,
    is_input_port: bool,
    net: Option<NetId>,
    inst: Option<InstId>,
    /// Capacitance this pin presents to its net.
    pin_cap: f64,
    /// For drivers: total load on the driven net.
    load_cap: f64,
    fanout: usize,
    max_transition: Option<f64>,
    max_capacitance: Option<f64>,
    max_fanout: Option<f64>,
    check: Option<CheckArcs>,
    /// `[min_max][rf]` for each of the three quantities.
    arrival: [[f64; 2]; 2],
    slew: [[f64; 2]; 2],
    required: [[f64; 2]; 2],
    level: usize,
}

impl Default for Vertex {
    fn default() -> Self {
        Vertex {
            live: false,
            is_driver: false,
            is_clock: false,
            is_output_port: false,
            is_input_port: false,
            net: None,
            inst: None,
            pin_cap: 0.0,
            load_cap: 0.0,
            fanout: 0,
            max_transition: None,
            max_capacitance: None,
            max_fanout: None,
            check: None,
            arrival: [[f64::INFINITY; 2], [f64::NEG_INFINITY; 2]],
            slew: [[f64::INFINITY; 2], [f64::NEG_INFINITY; 2]],
            required: [[f64::NEG_INFINITY; 2], [f64::INFINITY; 2]],
            level: 0,
        }
    }
}

/// `a - b`, treating an undefined difference as unconstrained.
fn slack_diff(a: f64, b: f64) -> f64 {
    let s = a - b;
    if s.is_nan() {
        f64::INFINITY
    } else {
        s
    }
}

pub struct Sta {
    constraints: Constraints,
    parasitics: ParasiticModel,
    wires: Vec<WireEstimate>,
    parasitics_epoch: Option<Epoch>,
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
    fanin: Vec<Vec<usize>>,
    fanout: Vec<Vec<usize>>,
    net_pins: Vec<Vec<PinId>>,
    net_is_clock: Vec<bool>,
    order: Vec<PinId>,
    drivers_sorted: Vec<PinId>,
    endpoints: Vec<PinId>,
    inst_power: Vec<PowerResult>,
}

impl Sta {
    pub fn new(constraints: Constraints, parasitics: ParasiticModel) -> Self {
        Sta {
            constraints,
            parasitics,
            wires: Vec::new(),
            parasitics_epoch: None,
            vertices: Vec::new(),
            edges: Vec::new(),
            fanin: Vec::new(),
            fanout: Vec::new(),
            net_pins: Vec::new(),
            net_is_clock: Vec::new(),
            order: Vec::new(),
            drivers_sorted: Vec::new(),
            endpoints: Vec::new(),
            inst_power: Vec::new(),
        }
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn parasitic_model(&self) -> &ParasiticModel {
        &self.parasitics
    }

    /// Driver pins of the latest-arriving path into `endpoint`, from its
    /// launch point to the endpoint's net driver. Follows the transition of
    /// the endpoint's worst setup slack back through the stored edge delays.
    pub fn worst_path(&self, endpoint: PinId) -> Option<Vec<PinId>> {
        let v = self.vertex(endpoint)?;
        let mut rf = (0..2).min_by(|a, b| {
            slack_diff(v.required[MAX][*a], v.arrival[MAX][*a])
                .total_cmp(&slack_diff(v.required[MAX][*b], v.arrival[MAX][*b]))
        })?;
        let mut pin = endpoint;
        let mut path = Vec::new();
        for _ in 0..self.vertices.len() {
            let (e, in_rf) = self.latest_fanin(pin, rf)?;
            let from = self.edges[e].from;
            let fv = &self.vertices[from.0];
            if fv.is_driver {
                if fv.is_clock {
                    return None;
                }
                path.push(from);
                if self.is_launching(from) {
                    path.reverse();
                    return Some(path);
                }
            }
            pin = from;
            rf = in_rf;
        }
        None
    }

    /// Setup slack at `endpoint` of the single path through the driver pins
    /// in `path`, recomputed hop by hop from the launch arrival of
    /// `path[0]` and the arc and wire delays of the last update.
    pub fn path_slack(&self, path: &[PinId], endpoint: PinId) -> Option<f64> {
        let first = self.vertex(*path.first()?)?;
        let mut at = first.arrival[MAX];
        let mut from = path[0];
        for to in path[1..].iter().copied().chain(std::iter::once(endpoint)) {
            at = self.hop_arrival(from, to, at)?;
            from = to;
        }
        let end = self.vertex(endpoint)?;
        Some((0..2).fold(f64::INFINITY, |worst, r| {
            worst.min(slack_diff(end.required[MAX][r], at[r]))
        }))
    }

    /// Enabled fanin edge and input transition giving the latest `rf`
    /// arrival at `pin`.
    fn latest_fanin(&self, pin: PinId, rf: usize) -> Option<(usize, usize)> {
        let mut best: Option<(f64, usize, usize)> = None;
        for e in self.fanin.get(pin.0)? {
            let edge = &self.edges[*e];
            if edge.disabled {
                continue;
            }
            for i in 0..2 {
                let a = self.vertices[edge.from.0].arrival[MAX][i] + edge.delay[MAX][rf][i];
                if a.is_finite() && best.map_or(true, |(b, _, _)| a > b) {
                    best = Some((a, *e, i));
                }
            }
        }
        best.map(|(_, e, i)| (e, i))
    }

    /// Max arrivals at `to` over the edges leading directly from `from`, or
    /// through one of `to`'s cell inputs wired to `from`.
    fn hop_arrival(&self, from: PinId, to: PinId, at: [f64; 2]) -> Option<[f64; 2]> {
        let mut out: Option<[f64; 2]> = None;
        let mut take = |a: [f64; 2]| {
            let o = out.get_or_insert([f64::NEG_INFINITY; 2]);
            o[0] = o[0].max(a[0]);
            o[1] = o[1].max(a[1]);
        };
        for e in self.fanin.get(to.0)? {
            let edge = &self.edges[*e];
            if edge.disabled {
                continue;
            }
            if edge.from == from {
                take(Self::through(edge, at));
            } else if matches!(edge.kind, EdgeKind::Cell { .. }) {
                for w in &self.fanin[edge.from.0] {
                    let wire = &self.edges[*w];
                    if !wire.disabled && wire.from == from {
                        take(Self::through(edge, Self::through(wire, at)));
                    }
                }
            }
        }
        out
    }

    fn through(edge: &Edge, at: [f64; 2]) -> [f64; 2] {
        let mut out = [f64::NEG_INFINITY; 2];
        for (o, slot) in out.iter_mut().enumerate() {
            for (i, a) in at.iter().enumerate() {
                let d = edge.delay[MAX][o][i];
                if !d.is_nan() && a.is_finite() {
                    *slot = slot.max(a + d);
                }
            }
        }
        out
    }

    fn vertex(&self, pin: PinId) -> Option<&Vertex> {
        self.vertices.get(pin.0).filter(|v| v.live)
    }

    fn wire(&self, net: NetId) -> WireEstimate {
        self.wires.get(net.0).copied().unwrap_or_default()
    }

    fn build_vertices(&mut self, netlist: &Netlist, lib: &IndexedLibrary) {
        self.vertices = vec![Vertex::default(); netlist.pin_capacity()];
        self.net_pins = vec![Vec::new(); netlist.net_capacity()];
        self.net_is_clock = vec![false; netlist.net_capacity()];
        for pin in netlist.pin_ids() {
            let p = netlist.pin(pin);
            let v = &mut self.vertices[pin.0];
            v.live = true;
            v.net = p.net;
            v.is_driver = p.is_driver();
            match p.owner {
                PinOwner::Instance { inst, port } => {
                    let cell = netlist.instance(inst).cell;
                    v.inst = Some(inst);
                    v.pin_cap = if p.direction.is_input() {
                        lib.cell(cell).ports[port].capacitance
                    } else {
                        0.0
                    };
                    v.max_transition = lib.max_transition(cell, port);
                    if v.is_driver {
                        v.max_capacitance = lib.max_capacitance(cell, port);
                        v.max_fanout = lib.max_fanout(cell, port);
                    }
                }
                PinOwner::Port { .. } => {
                    v.is_input_port = p.is_driver();
                    v.is_output_port = p.is_load();
                    v.pin_cap = if p.is_load() {
                        self.constraints.output_load
                    } else {
                        0.0
                    };
                    v.max_transition = lib.library().default_max_transition;
                }
            }
        }
        for net in netlist.net_ids() {
            let pins = netlist.net_pins(net).to_vec();
            let pin_cap: f64 = pins
                .iter()
                .filter(|p| !self.vertices[p.0].is_driver)
                .map(|p| self.vertices[p.0].pin_cap)
                .sum();
            let loads = pins.iter().filter(|p| !self.vertices[p.0].is_driver).count();
            let load_cap = pin_cap + self.wire(net).cap;
            for p in &pins {
                let v = &mut self.vertices[p.0];
                if v.is_driver {
                    v.load_cap = load_cap;
                    v.fanout = loads;
                }
            }
            self.net_is_clock[net.0] = netlist.net(net).signal_type == SignalType::Clock;
            self.net_pins[net.0] = pins;
        }
    }

    fn build_edges(&mut self, netlist: &Netlist, lib: &IndexedLibrary) {
        self.edges.clear();
        let nan = [[[f64::NAN; 2]; 2]; 2];
        for net in netlist.net_ids() {
            let pins = &self.net_pins[net.0];
            for d in pins.iter().filter(|p| self.vertices[p.0].is_driver) {
                for l in pins.iter().filter(|p| !self.vertices[p.0].is_driver) {
                    self.edges.push(Edge {
                        from: *d,
                        to: *l,
                        kind: EdgeKind::Wire,
                        disabled: false,
                        delay: nan,
                    });
                }
            }
        }
        for inst in netlist.instance_ids() {
            let i = netlist.instance(inst);
            let cell = lib.cell(i.cell);
            for (arc_index, arc) in cell.timing_arcs.iter().enumerate() {
                let (Some(from), Some(to)) = (cell.port_index(&arc.from), cell.port_index(&arc.to))
                else {
                    continue;
                };
                let (from, to) = (i.pins[from], i.pins[to]);
                if arc.timing_type.is_check() {
                    let check = self.vertices[to.0].check.get_or_insert_with(CheckArcs::default);
                    if arc.timing_type == TimingType::Setup {
                        check.setup = Some((i.cell, arc_index));
                    } else {
                        check.hold = Some((i.cell, arc_index));
                    }
                    continue;
                }
                let kind = if arc.timing_type.is_clock_to_output() {
                    EdgeKind::Launch {
                        cell: i.cell,
                        arc: arc_index,
                    }
                } else {
                    EdgeKind::Cell {
                        cell: i.cell,
                        arc: arc_index,
                    }
                };
                self.edges.push(Edge {
                    from,
                    to,
                    kind,
                    disabled: false,
                    delay: nan,
                });
            }
        }
        self.fanin = vec![Vec::new(); self.vertices.len()];
        self.fanout = vec![Vec::new(); self.vertices.len()];
        for (e, edge) in self.edges.iter().enumerate() {
            self.fanin[edge.to.0].push(e);
            self.fanout[edge.from.0].push(e);
        }
    }

    /// Marks everything reachable from the clock port or a clock-typed net
    /// through wires and combinational cells.
    fn mark_clock_network(&mut self, netlist: &Netlist) {
        let mut queue = VecDeque::new();
        if let Some(name) = &self.constraints.clock_port {
            match netlist.find_port(name) {
                Some(pin) => queue.push_back(pin),
                None => log::warn!("clock port {} not found in netlist", name),
            }
        }
        for (net, is_clock) in self.net_is_clock.iter().enumerate() {
            if *is_clock {
                queue.extend(self.net_pins[net].iter().copied());
            }
        }
        while let Some(pin) = queue.pop_front() {
            if self.vertices[pin.0].is_clock {
                continue;
            }
            self.vertices[pin.0].is_clock = true;
            for e in &self.fanout[pin.0] {
                let edge = &self.edges[*e];
                if !matches!(edge.kind, EdgeKind::Launch { .. }) {
                    queue.push_back(edge.to);
                }
            }
        }
        for (net, pins) in self.net_pins.iter().enumerate() {
            if pins.iter().any(|p| self.vertices[p.0].is_clock) {
                self.net_is_clock[net] = true;
            }
        }
    }

    /// Kahn's algorithm over enabled edges. A vertex left on a cycle has its
    /// unresolved fanin edges disabled, with a warning.
    fn levelize(&mut self, netlist: &Netlist, lib: &IndexedLibrary) {
        let n = self.vertices.len();
        let mut indegree = vec![0usize; n];
        for edge in &self.edges {
            indegree[edge.to.0] += 1;
        }
        let mut queue: VecDeque<PinId> = (0..n)
            .filter(|i| self.vertices[*i].live && indegree[*i] == 0)
            .map(PinId)
            .collect();
        let mut placed = vec![false; n];
        let mut order = Vec::with_capacity(n);
        let live = self.vertices.iter().filter(|v| v.live).count();
        while order.len() < live {
            while let Some(pin) = queue.pop_front() {
                placed[pin.0] = true;
                order.push(pin);
                for e in &self.fanout[pin.0] {
                    let edge = &self.edges[*e];
                    if edge.disabled {
                        continue;
                    }
                    let level = self.vertices[pin.0].level + 1;
                    let to = &mut self.vertices[edge.to.0];
                    to.level = to.level.max(level);
                    indegree[edge.to.0] -= 1;
                    if indegree[edge.to.0] == 0 {
                        queue.push_back(edge.to);
                    }
                }
            }
            if order.len() >= live {
                break;
            }
            let Some(stuck) = (0..n).find(|i| self.vertices[*i].live && !placed[*i]) else {
                break;
            };
            log::warn!(
                "combinational loop through {}; disabling its fanin",
                netlist.pin_name(PinId(stuck), lib)
            );
            for e in self.fanin[stuck].clone() {
                let from = self.edges[e].from;
                if !placed[from.0] && !self.edges[e].disabled {
                    self.edges[e].disabled = true;
                    indegree[stuck] -= 1;
                }
            }
            if indegree[stuck] == 0 {
                queue.push_back(PinId(stuck));
            }
        }
        self.order = order;
    }

    fn edge_arc<'a>(lib: &'a IndexedLibrary, kind: EdgeKind) -> Option<&'a TimingArc> {
        match kind {
            EdgeKind::Wire => None,
            EdgeKind::Cell { cell, arc } | EdgeKind::Launch { cell, arc } => {
                Some(&lib.cell(cell).timing_arcs[arc])
            }
        }
    }

    /// Forward propagation of arrivals and slews, filling in edge delays.
    fn propagate_arrivals(&mut self, lib: &IndexedLibrary) {
        let input_delay = self.constraints.input_delay;
        let input_slew = self.constraints.input_slew;
        for idx in 0..self.order.len() {
            let pin = self.order[idx];
            let v = self.vertices[pin.0];
            if v.is_clock {
                let vm = &mut self.vertices[pin.0];
                vm.arrival = [[0.0; 2]; 2];
                vm.slew = [[0.0; 2]; 2];
                continue;
            }
            if v.is_input_port {
                let vm = &mut self.vertices[pin.0];
                vm.arrival = [[input_delay; 2]; 2];
                vm.slew = [[input_slew; 2]; 2];
                continue;
            }
            let fanin: Vec<usize> = self.fanin[pin.0]
                .iter()
                .copied()
                .filter(|e| !self.edges[*e].disabled)
                .collect();
            if fanin.is_empty() {
                if v.is_driver {
                    // Constant drivers (tie cells) start at zero.
                    let vm = &mut self.vertices[pin.0];
                    vm.arrival = [[0.0; 2]; 2];
                    vm.slew = [[0.0; 2]; 2];
                }
                continue;
            }
            let mut arrival = Vertex::default().arrival;
            let mut slew = Vertex::default().slew;
            for e in fanin {
                let edge = self.edges[e].clone();
                let from = self.vertices[edge.from.0];
                let mut delay = [[[f64::NAN; 2]; 2]; 2];
                for out_rf in RiseFall::ALL {
                    let o = out_rf.index();
                    match edge.kind {
                        EdgeKind::Wire => {
                            let d = self.wire_delay(edge.from);
                            for mm in [MIN, MAX] {
                                delay[mm][o][o] = d;
                                let a = from.arrival[mm][o] + d;
                                Self::merge(&mut arrival[mm][o], &mut slew[mm][o], mm, a, from.slew[mm][o]);
                            }
                        }
                        EdgeKind::Cell { .. } | EdgeKind::Launch { .. } => {
                            let Some(arc) = Self::edge_arc(lib, edge.kind) else {
                                continue;
                            };
                            let transitions: &[RiseFall] = match arc.timing_type {
                                TimingType::RisingEdge => &[RiseFall::Rise],
                                TimingType::FallingEdge => &[RiseFall::Fall],
                                _ => arc.input_transitions(out_rf),
                            };
                            for in_rf in transitions {
                                let i = in_rf.index();
                                for mm in [MIN, MAX] {
                                    let a_in = from.arrival[mm][i];
                                    if !a_in.is_finite() {
                                        continue;
                                    }
                                    let s_in = from.slew[mm][i];
                                    let Some(d) = lib.arc_delay(arc, out_rf, s_in, v.load_cap) else {
                                        continue;
                                    };
                                    let s_out = lib.arc_slew(arc, out_rf, s_in, v.load_cap).unwrap_or(s_in);
                                    delay[mm][o][i] = d;
                                    Self::merge(&mut arrival[mm][o], &mut slew[mm][o], mm, a_in + d, s_out);
                                }
                            }
                        }
                    }
                }
                self.edges[e].delay = delay;
            }
            let vm = &mut self.vertices[pin.0];
            vm.arrival = arrival;
            vm.slew = slew;
        }
    }

    fn merge(arrival: &mut f64, slew: &mut f64, mm: usize, a: f64, s: f64) {
        if a.is_nan() {
            return;
        }
        if mm == MAX {
            *arrival = arrival.max(a);
            *slew = slew.max(s);
        } else {
            *arrival = arrival.min(a);
            *slew = slew.min(s);
        }
    }

    fn wire_delay(&self, driver: PinId) -> f64 {
        let Some(net) = self.vertices[driver.0].net else {
            return 0.0;
        };
        let wire = self.wire(net);
        wire.elmore_delay((self.vertices[driver.0].load_cap - wire.cap).max(0.0))
    }

    fn seed_requireds(&mut self, lib: &IndexedLibrary) {
        let period = self.constraints.period;
        let output_delay = self.constraints.output_delay;
        let mut endpoints = Vec::new();
        for idx in 0..self.vertices.len() {
            let v = self.vertices[idx];
            if !v.live || v.is_clock {
                continue;
            }
            if v.is_output_port {
                self.vertices[idx].required[MAX] = [period - output_delay; 2];
                endpoints.push(PinId(idx));
                continue;
            }
            let Some(check) = v.check else {
                continue;
            };
            let mut constrained = false;
            for rf in RiseFall::ALL {
                let r = rf.index();
                let data_slew = if v.slew[MAX][r].is_finite() { v.slew[MAX][r] } else { 0.0 };
                if let Some((cell, arc)) = check.setup {
                    let arc = &lib.cell(cell).timing_arcs[arc];
                    if let Some(t) = arc.constraint_table(rf) {
                        self.vertices[idx].required[MAX][r] = period - t.lookup(data_slew, 0.0);
                        constrained = true;
                    }
                }
                if let Some((cell, arc)) = check.hold {
                    let arc = &lib.cell(cell).timing_arcs[arc];
                    if let Some(t) = arc.constraint_table(rf) {
                        let min_slew = if v.slew[MIN][r].is_finite() { v.slew[MIN][r] } else { 0.0 };
                        self.vertices[idx].required[MIN][r] = t.lookup(min_slew, 0.0);
                    }
                }
            }
            if constrained {
                endpoints.push(PinId(idx));
            }
        }
        self.endpoints = endpoints;
    }

    fn propagate_requireds(&mut self) {
        for idx in (0..self.order.len()).rev() {
            let pin = self.order[idx];
            if self.vertices[pin.0].is_clock {
                continue;
            }
            let mut required = self.vertices[pin.0].required;
            for e in &self.fanout[pin.0] {
                let edge = &self.edges[*e];
                if edge.disabled {
                    continue;
                }
                let to = &self.vertices[edge.to.0];
                for o in 0..2 {
                    for i in 0..2 {
                        let d_max = edge.delay[MAX][o][i];
                        if !d_max.is_nan() {
                            required[MAX][i] = required[MAX][i].min(to.required[MAX][o] - d_max);
                        }
                        let d_min = edge.delay[MIN][o][i];
                        if !d_min.is_nan() {
                            required[MIN][i] = required[MIN][i].max(to.required[MIN][o] - d_min);
                        }
                    }
                }
            }
            self.vertices[pin.0].required = required;
        }
    }

    fn compute_power(&mut self, netlist: &Netlist, lib: &IndexedLibrary) {
        let freq = 1.0 / self.constraints.period;
        let vdd2 = self.constraints.vdd * self.constraints.vdd;
        self.inst_power = vec![PowerResult::default(); netlist.instance_capacity()];
        for inst in netlist.instance_ids() {
            let i = netlist.instance(inst);
            let drives_clock = i
                .pins
                .iter()
                .any(|p| self.vertices[p.0].is_driver && self.vertices[p.0].is_clock);
            let activity = if drives_clock {
                1.0
            } else {
                self.constraints.activity
            };
            let leakage = lib.cell_leakage(i.cell).unwrap_or(0.0);
            let internal = activity * freq * lib.cell(i.cell).internal_energy.unwrap_or(0.0);
            let switching: f64 = i
                .pins
                .iter()
                .map(|p| &self.vertices[p.0])
                .filter(|v| v.is_driver)
                .map(|v| 0.5 * activity * freq * v.load_cap * vdd2)
                .sum();
            self.inst_power[inst.0] = PowerResult::new(leakage, internal, switching);
        }
    }

    fn sort_drivers(&mut self, netlist: &Netlist, lib: &IndexedLibrary) {
        let mut drivers: Vec<(usize, String, PinId)> = self
            .vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.live && v.is_driver && !v.is_clock)
            .map(|(i, v)| (v.level, netlist.pin_name(PinId(i), lib), PinId(i)))
            .collect();
        drivers.sort();
        self.drivers_sorted = drivers.into_iter().map(|(_, _, p)| p).collect();
    }

    fn pin_slack(&self, v: &Vertex, min_max: MinMax) -> f64 {
        if v.is_clock {
            return f64::INFINITY;
        }
        let mut worst = f64::INFINITY;
        for r in 0..2 {
            let s = match min_max {
                MinMax::Max => slack_diff(v.required[MAX][r], v.arrival[MAX][r]),
                MinMax::Min => slack_diff(v.arrival[MIN][r], v.required[MIN][r]),
            };
            worst = worst.min(s);
        }
        worst
    }

    fn pins_of(&self, net: Option<NetId>) -> Vec<PinId> {
        match net {
            Some(net) => self.net_pins.get(net.0).cloned().unwrap_or_default(),
            None => self
                .vertices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.live)
                .map(|(i, _)| PinId(i))
                .collect(),
        }
    }
}

impl TimingOracle for Sta {
    fn update_parasitics(&mut self, netlist: &Netlist, _lib: &IndexedLibrary, incremental: bool) {
        if incremental && self.parasitics_epoch == Some(netlist.epoch()) {
            return;
        }
        let mut wires = vec![WireEstimate::default(); netlist.net_capacity()];
        for net in netlist.net_ids() {
            wires[net.0] = self.parasitics.estimate(netlist, net);
        }
        self.wires = wires;
        self.parasitics_epoch = Some(netlist.epoch());
    }

    fn update_timing(&mut self, netlist: &Netlist, lib: &IndexedLibrary) {
        if self.parasitics_epoch != Some(netlist.epoch()) {
            log::trace!("parasitics stale at timing update; re-estimating");
            self.update_parasitics(netlist, lib, false);
        }
        self.build_vertices(netlist, lib);
        self.build_edges(netlist, lib);
        self.mark_clock_network(netlist);
        self.levelize(netlist, lib);
        self.propagate_arrivals(lib);
        self.seed_requireds(lib);
        self.propagate_requireds();
        self.compute_power(netlist, lib);
        self.sort_drivers(netlist, lib);
        log::trace!(
            "timing updated: {} vertices, {} edges, {} endpoints",
            self.order.len(),
            self.edges.len(),
            self.endpoints.len()
        );
    }

    fn vertex_slack(&self, pin: PinId, min_max: MinMax) -> f64 {
        self.vertex(pin)
            .map_or(f64::INFINITY, |v| self.pin_slack(v, min_max))
    }

    fn worst_slack(&self, min_max: MinMax) -> (f64, Option<PinId>) {
        let mut worst = (f64::INFINITY, None);
        for pin in &self.endpoints {
            let s = self.vertex_slack(*pin, min_max);
            if s < worst.0 {
                worst = (s, Some(*pin));
            }
        }
        worst
    }

    fn check_slew_limits(&self, net: Option<NetId>) -> Vec<PinId> {
        self.pins_of(net)
            .into_iter()
            .filter(|p| {
                let v = &self.vertices[p.0];
                let slew = v.slew[MAX][0].max(v.slew[MAX][1]);
                v.max_transition.is_some_and(|limit| slew > limit)
            })
            .collect()
    }

    fn check_capacitance_limits(&self, net: Option<NetId>) -> Vec<PinId> {
        self.pins_of(net)
            .into_iter()
            .filter(|p| {
                let v = &self.vertices[p.0];
                v.is_driver && v.max_capacitance.is_some_and(|limit| v.load_cap > limit)
            })
            .collect()
    }

    fn check_fanout_limits(&self, net: Option<NetId>) -> Vec<PinId> {
        self.pins_of(net)
            .into_iter()
            .filter(|p| {
                let v = &self.vertices[p.0];
                v.is_driver && v.max_fanout.is_some_and(|limit| v.fanout as f64 > limit)
            })
            .collect()
    }

    fn instance_power(&self, inst: InstId) -> PowerResult {
        self.inst_power.get(inst.0).copied().unwrap_or_default()
    }

    fn design_power(&self) -> PowerResult {
        let mut total = PowerResult::default();
        for p in &self.inst_power {
            total.accumulate(p);
        }
        total
    }

    fn is_clock(&self, pin: PinId) -> bool {
        self.vertex(pin).is_some_and(|v| v.is_clock)
    }

    fn is_clock_net(&self, net: NetId) -> bool {
        self.net_is_clock.get(net.0).copied().unwrap_or(false)
    }

    fn clock_period(&self) -> f64 {
        self.constraints.period
    }

    fn arrival(&self, pin: PinId) -> f64 {
        self.vertex(pin)
            .map_or(f64::NEG_INFINITY, |v| v.arrival[MAX][0].max(v.arrival[MAX][1]))
    }

    fn required(&self, pin: PinId) -> f64 {
        self.vertex(pin)
            .map_or(f64::INFINITY, |v| v.required[MAX][0].min(v.required[MAX][1]))
    }

    fn slew(&self, pin: PinId) -> f64 {
        self.vertex(pin)
            .map_or(0.0, |v| v.slew[MAX][0].max(v.slew[MAX][1]).max(0.0))
    }

    fn level(&self, pin: PinId) -> usize {
        self.vertex(pin).map_or(0, |v| v.level)
    }

    fn find_path_ends(&self, limit: usize) -> Vec<PathEnd> {
        let mut ends: Vec<PathEnd> = self
            .endpoints
            .iter()
            .map(|pin| PathEnd {
                pin: *pin,
                min_max: MinMax::Max,
                arrival: self.arrival(*pin),
                required: self.required(*pin),
                slack: self.vertex_slack(*pin, MinMax::Max),
            })
            .filter(|e| e.slack.is_finite())
            .collect();
        ends.sort_by(|a, b| a.slack.total_cmp(&b.slack).then(a.pin.cmp(&b.pin)));
        ends.truncate(limit);
        ends
    }

    fn driver_vertices(&self) -> Vec<PinId> {
        self.drivers_sorted.clone()
    }

    fn fanin_drivers(&self, pin: PinId) -> Vec<PinId> {
        let mut seen = HashSet::new();
        let mut drivers = Vec::new();
        let Some(fanin) = self.fanin.get(pin.0) else {
            return drivers;
        };
        for e in fanin {
            let edge = &self.edges[*e];
            if edge.disabled || !matches!(edge.kind, EdgeKind::Cell { .. }) {
                continue;
            }
            for w in &self.fanin[edge.from.0] {
                let wire = &self.edges[*w];
                if !wire.disabled && !self.vertices[wire.from.0].is_clock && seen.insert(wire.from) {
                    drivers.push(wire.from);
                }
            }
        }
        drivers.sort();
        drivers
    }

    fn is_launching(&self, pin: PinId) -> bool {
        let Some(v) = self.vertex(pin) else {
            return false;
        };
        v.is_driver
            && !v.is_clock
            && !self.fanin[pin.0].iter().any(|e| {
                let edge = &self.edges[*e];
                !edge.disabled && matches!(edge.kind, EdgeKind::Cell { .. })
            })
    }

    fn endpoints(&self) -> Vec<PinId> {
        self.endpoints.clone()
    }

    fn net_driver(&self, pin: PinId) -> Option<PinId> {
        let net = self.vertex(pin)?.net?;
        self.net_pins
            .get(net.0)?
            .iter()
            .copied()
            .find(|p| self.vertices[p.0].is_driver)
    }
}
