// SPDX-License-Identifier: Apache-2.0

//! Optional TOML configuration shared by the subcommands.
//!
//! Each table is optional; a missing table leaves the library defaults in
//! place, and command-line flags override whatever the file provides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use xlsynth_sizer::bottleneck::BottleneckOptions;
use xlsynth_sizer::optimize::{RecoverPowerOptions, RepairTimingOptions};
use xlsynth_sizer::timing::ParasiticModel;

/// Name of the configuration file picked up from the current directory when
/// `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "xlsynth-sizer.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizerConfig {
    pub recover_power: Option<RecoverPowerOptions>,
    pub repair_timing: Option<RepairTimingOptions>,
    pub bottleneck: Option<BottleneckOptions>,
    /// Replaces the wire model carried by the design file.
    pub parasitics: Option<ParasiticModel>,
}

impl SizerConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: SizerConfig = toml::from_str(text)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn recover_power_options(&self) -> RecoverPowerOptions {
        self.recover_power.clone().unwrap_or_default()
    }

    pub fn repair_timing_options(&self) -> RepairTimingOptions {
        self.repair_timing.clone().unwrap_or_default()
    }

    pub fn bottleneck_options(&self) -> BottleneckOptions {
        self.bottleneck.unwrap_or_default()
    }
}

/// Resolves the config path: the explicit flag wins, otherwise the default
/// file in the current directory if one exists.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<std::path::PathBuf> {
    if let Some(path) = explicit {
        return Some(path.into());
    }
    let cwd_config = Path::new(DEFAULT_CONFIG_FILE);
    if cwd_config.exists() {
        log::info!("Using {} in current directory", DEFAULT_CONFIG_FILE);
        Some(cwd_config.to_path_buf())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_keeps_defaults() {
        let config = SizerConfig::from_toml("").unwrap();
        assert_eq!(config.recover_power_options(), RecoverPowerOptions::default());
        assert_eq!(config.repair_timing_options(), RepairTimingOptions::default());
        assert_eq!(config.bottleneck_options(), BottleneckOptions::default());
        assert!(config.parasitics.is_none());
    }

    #[test]
    fn partial_tables_fill_in_defaults() {
        let config = SizerConfig::from_toml(
            r#"
[recover_power]
percent = 0.5
max_passes = 1

[bottleneck]
alpha = 5e-12

[parasitics]
cap_per_unit = 1e-17
"#,
        )
        .unwrap();
        let rp = config.recover_power_options();
        assert_eq!(rp.percent, 0.5);
        assert_eq!(rp.max_passes, 1);
        assert_eq!(rp.swap_passes, RecoverPowerOptions::default().swap_passes);
        assert_eq!(config.bottleneck_options().alpha, 5e-12);
        let parasitics = config.parasitics.unwrap();
        assert_eq!(parasitics.cap_per_unit, 1e-17);
        assert_eq!(parasitics.res_per_unit, ParasiticModel::default().res_per_unit);
    }

    #[test]
    fn unknown_table_is_rejected() {
        let err = SizerConfig::from_toml("[resize]\npercent = 1.0\n").unwrap_err();
        assert!(err.to_string().contains("resize"), "{}", err);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = SizerConfig::load(Path::new("/nonexistent/sizer.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/sizer.toml"));
    }
}
