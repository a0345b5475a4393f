// SPDX-License-Identifier: Apache-2.0

//! Path-traffic bottleneck metric.
//!
//! For every driver pin this computes a soft-max over the timing paths
//! through it, `fwd + bwd`, in time linear in the size of the timing graph.
//! `fwd` is the log-sum-exp of the path-prefix delays reaching the pin and
//! `bwd` the log-sum-exp of the negated required times of the path suffixes
//! leaving it, both scaled by the temperature `alpha`. Sums are in base 2.
//!
//! Each vertex gets a single reference time: its arrival if it launches
//! paths, otherwise the midpoint of arrival and required. Edge delays are
//! differences of reference times, so on a path whose vertices all share the
//! same slack (the worst path) the model reproduces the timer exactly.

use crate::netlist::PinId;
use crate::timing::{MinMax, TimingOracle};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BottleneckOptions {
    /// Temperature in seconds. Smaller values concentrate the metric on the
    /// single worst path.
    pub alpha: f64,
}

impl Default for BottleneckOptions {
    fn default() -> Self {
        BottleneckOptions { alpha: 10e-12 }
    }
}

impl BottleneckOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.alpha.is_finite() && self.alpha > 0.0 {
            Ok(())
        } else {
            Err(format!(
                "bottleneck alpha must be positive and finite; got {}",
                self.alpha
            ))
        }
    }
}

/// Per driver pin state for one `analyze` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverPinData {
    pub pin: PinId,
    pub reference: f64,
    pub fwd: f64,
    pub bwd: f64,
    /// `(fanin index, reference-time delay)` into this vertex.
    pub edges: Vec<(usize, f64)>,
}

/// Numerically stable `log2(2^a + 2^b)`.
pub fn logsumexp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (1.0 + (lo - hi).exp2()).log2()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Endpoint {
    pin: PinId,
    driver: usize,
    local_required: f64,
}

pub struct Bottleneck {
    alpha: f64,
    data: Vec<DriverPinData>,
    index: HashMap<PinId, usize>,
    endpoints: Vec<Endpoint>,
}

impl Bottleneck {
    /// Runs both passes over the oracle's current timing.
    pub fn analyze<O: TimingOracle + ?Sized>(
        oracle: &O,
        options: &BottleneckOptions,
    ) -> Result<Self, String> {
        options.validate()?;
        let alpha = options.alpha;
        let mut data: Vec<DriverPinData> = Vec::new();
        let mut index = HashMap::new();
        for pin in oracle.driver_vertices() {
            if !oracle.vertex_slack(pin, MinMax::Max).is_finite() {
                continue;
            }
            let reference = if oracle.is_launching(pin) {
                oracle.arrival(pin)
            } else {
                0.5 * (oracle.arrival(pin) + oracle.required(pin))
            };
            index.insert(pin, data.len());
            data.push(DriverPinData {
                pin,
                reference,
                fwd: f64::NEG_INFINITY,
                bwd: f64::NEG_INFINITY,
                edges: Vec::new(),
            });
        }

        // Forward pass. `driver_vertices` is level ordered, so every fanin
        // has been finalized before its fanout.
        for v in 0..data.len() {
            let pin = data[v].pin;
            let mut edges = Vec::new();
            if !oracle.is_launching(pin) {
                for f in oracle.fanin_drivers(pin) {
                    if let Some(&fi) = index.get(&f) {
                        edges.push((fi, data[v].reference - data[fi].reference));
                    }
                }
            }
            let fwd = if edges.is_empty() {
                0.0
            } else {
                edges.iter().fold(f64::NEG_INFINITY, |acc, (fi, delay)| {
                    logsumexp(acc, data[*fi].fwd + delay / alpha)
                })
            };
            data[v].fwd = fwd;
            data[v].edges = edges;
        }

        let mut endpoints = Vec::new();
        for pin in oracle.endpoints() {
            let slack = oracle.vertex_slack(pin, MinMax::Max);
            if !slack.is_finite() {
                continue;
            }
            let Some(driver) = oracle.net_driver(pin).and_then(|d| index.get(&d).copied()) else {
                continue;
            };
            endpoints.push(Endpoint {
                pin,
                driver,
                local_required: data[driver].reference + slack,
            });
        }

        for e in &endpoints {
            let d = &mut data[e.driver];
            d.bwd = logsumexp(d.bwd, -e.local_required / alpha);
        }
        for v in (0..data.len()).rev() {
            let bwd = data[v].bwd;
            if bwd == f64::NEG_INFINITY {
                continue;
            }
            for k in 0..data[v].edges.len() {
                let (fi, delay) = data[v].edges[k];
                data[fi].bwd = logsumexp(data[fi].bwd, bwd + delay / alpha);
            }
        }

        log::debug!(
            "bottleneck analysis: {} driver pins, {} endpoints, alpha {:e}",
            data.len(),
            endpoints.len(),
            alpha
        );
        Ok(Bottleneck {
            alpha,
            data,
            index,
            endpoints,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn data(&self, pin: PinId) -> Option<&DriverPinData> {
        self.index.get(&pin).map(|i| &self.data[*i])
    }

    /// `fwd + bwd`, or `None` for pins excluded from the analysis or not on a
    /// path to any endpoint.
    pub fn score(&self, pin: PinId) -> Option<f64> {
        let d = self.data(pin)?;
        let s = d.fwd + d.bwd;
        s.is_finite().then_some(s)
    }

    /// Scored pins, highest score first.
    pub fn ranked(&self) -> Vec<(PinId, f64)> {
        let mut out: Vec<(PinId, f64)> = self
            .data
            .iter()
            .filter_map(|d| self.score(d.pin).map(|s| (d.pin, s)))
            .collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    /// Slack implied by the reference-time model along `path` (driver pins
    /// from a launch point to the driver of `endpoint`).
    pub fn implied_slack(&self, path: &[PinId], endpoint: PinId) -> Option<f64> {
        let first = *self.index.get(path.first()?)?;
        let last = *self.index.get(path.last()?)?;
        let end = self
            .endpoints
            .iter()
            .find(|e| e.pin == endpoint && e.driver == last)?;
        let mut arrival = self.data[first].reference;
        for pair in path.windows(2) {
            let from = *self.index.get(&pair[0])?;
            let to = *self.index.get(&pair[1])?;
            let (_, delay) = self.data[to].edges.iter().find(|(fi, _)| *fi == from)?;
            arrival += delay;
        }
        Some(end.local_required - arrival)
    }
}
