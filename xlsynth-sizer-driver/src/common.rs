// SPDX-License-Identifier: Apache-2.0

use anyhow::{Context, Result};
use clap::ArgMatches;
use xlsynth_sizer::design::{Design, DesignDescription};
use xlsynth_sizer::optimize::DesignMetrics;
use xlsynth_sizer::timing::Sta;

use crate::config::SizerConfig;

/// Reads the `<design>` positional and builds a timed design, applying the
/// config file's wire model when it has one.
pub fn load_design(matches: &ArgMatches, config: &SizerConfig) -> Result<Design<Sta>> {
    let path = matches
        .get_one::<String>("design")
        .context("missing design file argument")?;
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading design file {}", path))?;
    let mut desc =
        DesignDescription::from_json(&text).with_context(|| format!("loading design {}", path))?;
    if let Some(parasitics) = config.parasitics {
        desc.parasitics = parasitics;
    }
    desc.build().with_context(|| format!("building design {}", path))
}

/// Writes the design back out when `--output` was given.
pub fn maybe_write_design(matches: &ArgMatches, design: &Design<Sta>) -> Result<()> {
    let Some(path) = matches.get_one::<String>("output") else {
        return Ok(());
    };
    let json = design.describe().to_json()?;
    std::fs::write(path, json).with_context(|| format!("writing design file {}", path))?;
    log::info!("wrote {}", path);
    Ok(())
}

pub fn ps(seconds: f64) -> String {
    if seconds.is_finite() {
        format!("{:.3}ps", seconds * 1e12)
    } else {
        "inf".to_string()
    }
}

pub fn print_metrics(label: &str, m: &DesignMetrics) {
    println!(
        "{}: wns {} tns {} hold {} power {:.4e}W area {:.3} drv {}",
        label,
        ps(m.wns),
        ps(m.tns),
        ps(m.hold_wns),
        m.power,
        m.area,
        m.drv
    );
}
