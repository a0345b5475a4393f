// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::ArgMatches;
use serde::Serialize;
use xlsynth_sizer::optimize::DesignMetrics;
use xlsynth_sizer::timing::{PowerResult, TimingOracle};

use crate::common::{load_design, print_metrics, ps};
use crate::config::SizerConfig;

#[derive(Debug, Serialize)]
struct PathRow {
    endpoint: String,
    arrival: f64,
    required: f64,
    slack: f64,
    /// Driver pins of the latest-arriving path, launch point first.
    through: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TimingReport {
    metrics: DesignMetrics,
    power: PowerResult,
    paths: Vec<PathRow>,
}

pub fn handle_report_timing(matches: &ArgMatches, config: &SizerConfig) -> Result<()> {
    let design = load_design(matches, config)?;
    let limit = *matches.get_one::<usize>("paths").unwrap_or(&5);
    let report = TimingReport {
        metrics: DesignMetrics::measure(&design),
        power: design.oracle.design_power(),
        paths: design
            .oracle
            .find_path_ends(limit)
            .into_iter()
            .map(|end| PathRow {
                endpoint: design.netlist.pin_name(end.pin, &design.library),
                arrival: end.arrival,
                required: end.required,
                slack: end.slack,
                through: design
                    .oracle
                    .worst_path(end.pin)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|pin| design.netlist.pin_name(pin, &design.library))
                    .collect(),
            })
            .collect(),
    };
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    print_metrics("design", &report.metrics);
    println!(
        "power: leakage {:.4e}W internal {:.4e}W switching {:.4e}W",
        report.power.leakage, report.power.internal, report.power.switching
    );
    for path in &report.paths {
        println!(
            "{:<32} arrival {:>12} required {:>12} slack {:>12}",
            path.endpoint,
            ps(path.arrival),
            ps(path.required),
            ps(path.slack)
        );
        if !path.through.is_empty() {
            println!("  through {}", path.through.join(" -> "));
        }
    }
    Ok(())
}
