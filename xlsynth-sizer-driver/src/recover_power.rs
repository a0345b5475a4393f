// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use xlsynth_sizer::optimize::{recover_power, RecoverPowerOptions};

use crate::common::{load_design, maybe_write_design, print_metrics};
use crate::config::SizerConfig;

fn options_from(matches: &ArgMatches, config: &SizerConfig) -> RecoverPowerOptions {
    let mut options = config.recover_power_options();
    if let Some(percent) = matches.get_one::<f64>("percent") {
        options.percent = *percent;
    }
    if let Some(max_passes) = matches.get_one::<usize>("max_passes") {
        options.max_passes = *max_passes;
    }
    options
}

pub fn handle_recover_power(matches: &ArgMatches, config: &SizerConfig) -> Result<()> {
    let options = options_from(matches, config);
    let mut design = load_design(matches, config)?;
    let stats = recover_power(&mut design, &options).map_err(|e| anyhow!(e))?;
    maybe_write_design(matches, &design)?;
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("swaps: {}", stats.swaps);
    println!("removed buffers: {}", stats.removed_buffers);
    println!(
        "attempts: {} (rejected: {} setup, {} hold, {} drv, {} failed)",
        stats.attempts,
        stats.rejected_setup,
        stats.rejected_hold,
        stats.rejected_drv,
        stats.rejected_apply_fail
    );
    print_metrics("before", &stats.baseline);
    print_metrics("after", &stats.final_metrics);
    Ok(())
}
