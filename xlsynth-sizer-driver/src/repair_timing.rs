// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use xlsynth_sizer::optimize::repair_timing;

use crate::common::{load_design, maybe_write_design, print_metrics};
use crate::config::SizerConfig;

pub fn handle_repair_timing(matches: &ArgMatches, config: &SizerConfig) -> Result<()> {
    let mut options = config.repair_timing_options();
    if let Some(percent) = matches.get_one::<f64>("percent") {
        options.percent = *percent;
    }
    if let Some(max_passes) = matches.get_one::<usize>("max_passes") {
        options.max_passes = *max_passes;
    }
    if let Some(pct) = matches.get_one::<f64>("max_area_growth") {
        options.max_area_growth_pct = *pct;
    }
    let mut design = load_design(matches, config)?;
    let stats = repair_timing(&mut design, &options).map_err(|e| anyhow!(e))?;
    maybe_write_design(matches, &design)?;
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("repairs: {}", stats.accepted);
    println!("attempts: {}", stats.attempts);
    print_metrics("before", &stats.baseline);
    print_metrics("after", &stats.final_metrics);
    Ok(())
}
