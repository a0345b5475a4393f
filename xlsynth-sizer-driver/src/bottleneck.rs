// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Result};
use clap::ArgMatches;
use xlsynth_sizer::bottleneck::Bottleneck;
use xlsynth_sizer::timing::{MinMax, TimingOracle};

use crate::common::{load_design, ps};
use crate::config::SizerConfig;

pub fn handle_bottleneck(matches: &ArgMatches, config: &SizerConfig) -> Result<()> {
    let mut options = config.bottleneck_options();
    if let Some(alpha) = matches.get_one::<f64>("alpha") {
        options.alpha = *alpha;
    }
    let top = *matches.get_one::<usize>("top").unwrap_or(&10);
    let design = load_design(matches, config)?;
    let bottleneck = Bottleneck::analyze(&design.oracle, &options).map_err(|e| anyhow!(e))?;
    let ranked = bottleneck.ranked();
    log::info!("{} driver pins scored", ranked.len());
    for (pin, score) in ranked.into_iter().take(top) {
        println!(
            "{:<32} score {:>12} slack {:>12}",
            design.netlist.pin_name(pin, &design.library),
            ps(score),
            ps(design.oracle.vertex_slack(pin, MinMax::Max))
        );
    }
    Ok(())
}
