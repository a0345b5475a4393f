// SPDX-License-Identifier: Apache-2.0

//! Command line driver for gate sizing and power recovery.
//!
//! Commands are given like:
//!
//! ```text
//! xlsynth-sizer-driver <global-options> <command> <design.json> <command-options>
//! ```
//!
//! Commands are:
//!
//! - classify: Prints the functional bucket and target load of every cell.
//! - report-timing: Prints worst slack, design rule counts, power and the
//!   worst setup endpoints.
//! - recover-power: Downsizes cells and removes buffers without violating
//!   the timing floors.
//! - repair-timing: Upsizes, swaps pins and rebuffers to recover slack.
//! - bottleneck: Ranks driver pins by the smooth-max bottleneck metric.
//!
//! Sample usage:
//!
//! ```shell
//! $ cargo run -- --config=xlsynth-sizer.toml \
//!     recover-power design.json --percent=0.5 --output=recovered.json
//! $ cargo run -- bottleneck design.json --top=20
//! ```

mod bottleneck;
mod classify;
mod common;
mod config;
mod recover_power;
mod repair_timing;
mod report_cli_error;
mod report_timing;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches};
use config::{resolve_config_path, SizerConfig};
use report_cli_error::report_cli_error_and_exit;

trait AppExt {
    fn add_design_arg(self) -> Self;
    fn add_output_arg(self) -> Self;
    fn add_percent_arg(self, help: &'static str) -> Self;
    fn add_max_passes_arg(self) -> Self;
    fn add_bool_arg(self, long: &'static str, help: &'static str) -> Self;
}

impl AppExt for clap::Command {
    fn add_design_arg(self) -> Self {
        (self as clap::Command).arg(
            Arg::new("design")
                .value_name("DESIGN_JSON")
                .help("Design description (library, constraints and netlist) as JSON")
                .required(true)
                .index(1),
        )
    }

    fn add_output_arg(self) -> Self {
        (self as clap::Command).arg(
            Arg::new("output")
                .long("output")
                .value_name("OUTPUT_JSON")
                .help("Write the optimized design description here")
                .action(ArgAction::Set),
        )
    }

    fn add_percent_arg(self, help: &'static str) -> Self {
        (self as clap::Command).arg(
            Arg::new("percent")
                .long("percent")
                .value_name("FRACTION")
                .help(help)
                .value_parser(clap::value_parser!(f64))
                .action(ArgAction::Set),
        )
    }

    fn add_max_passes_arg(self) -> Self {
        (self as clap::Command).arg(
            Arg::new("max_passes")
                .long("max-passes")
                .value_name("N")
                .help("Upper bound on optimization passes")
                .value_parser(clap::value_parser!(usize))
                .action(ArgAction::Set),
        )
    }

    fn add_bool_arg(self, long: &'static str, help: &'static str) -> Self {
        (self as clap::Command).arg(
            Arg::new(long)
                .long(long)
                .help(help)
                .action(ArgAction::SetTrue),
        )
    }
}

fn dispatch(
    name: &str,
    matches: &ArgMatches,
    config: &SizerConfig,
    handler: fn(&ArgMatches, &SizerConfig) -> Result<()>,
) {
    if let Err(e) = handler(matches, config) {
        report_cli_error_and_exit(&format!("{:#}", e), Some(name), vec![]);
    }
}

fn main() {
    let _ = env_logger::try_init();

    log::info!(
        "xlsynth-sizer-driver starting; version: {}",
        env!("CARGO_PKG_VERSION")
    );

    let matches = clap::Command::new("xlsynth-sizer-driver")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Gate sizing, power recovery and bottleneck analysis")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG")
                .help("Path to a xlsynth-sizer.toml file")
                .action(ArgAction::Set),
        )
        .subcommand(clap::Command::new("version").about("Prints the version of the driver"))
        .subcommand(
            clap::Command::new("classify")
                .about("Prints the functional bucket and target load of each library cell")
                .add_design_arg()
                .add_bool_arg("json", "Emit JSON instead of a table"),
        )
        .subcommand(
            clap::Command::new("report-timing")
                .about("Reports slack, design rule violations and power")
                .add_design_arg()
                .arg(
                    Arg::new("paths")
                        .long("paths")
                        .value_name("N")
                        .help("Number of worst setup endpoints to list")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("5")
                        .action(ArgAction::Set),
                )
                .add_bool_arg("json", "Emit JSON instead of text"),
        )
        .subcommand(
            clap::Command::new("recover-power")
                .about("Trades positive slack for lower power")
                .add_design_arg()
                .add_percent_arg("Fraction of the candidate instances visited per pass")
                .add_max_passes_arg()
                .add_output_arg()
                .add_bool_arg("json", "Emit the run statistics as JSON"),
        )
        .subcommand(
            clap::Command::new("repair-timing")
                .about("Spends area to recover negative slack")
                .add_design_arg()
                .add_percent_arg("Fraction of the negative-slack driver pins visited per pass")
                .add_max_passes_arg()
                .arg(
                    Arg::new("max_area_growth")
                        .long("max-area-growth")
                        .value_name("PERCENT")
                        .help("Area may grow at most this much over the starting design")
                        .value_parser(clap::value_parser!(f64))
                        .action(ArgAction::Set),
                )
                .add_output_arg()
                .add_bool_arg("json", "Emit the run statistics as JSON"),
        )
        .subcommand(
            clap::Command::new("bottleneck")
                .about("Ranks driver pins by how much near-critical timing flows through them")
                .add_design_arg()
                .arg(
                    Arg::new("top")
                        .long("top")
                        .value_name("N")
                        .help("Number of pins to print")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("alpha")
                        .long("alpha")
                        .value_name("SECONDS")
                        .help("Smooth-max temperature; smaller values focus on the worst path")
                        .value_parser(clap::value_parser!(f64))
                        .action(ArgAction::Set),
                ),
        )
        .get_matches();

    if matches.subcommand_matches("version").is_some() {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let config_path = resolve_config_path(matches.get_one::<String>("config").map(String::as_str));
    let config = match config_path {
        Some(path) => {
            if !path.exists() {
                let cwd = std::env::current_dir()
                    .map(|d| d.display().to_string())
                    .unwrap_or_default();
                report_cli_error_and_exit(
                    "config file does not exist",
                    None,
                    vec![
                        ("path", &path.display().to_string()),
                        ("working directory", &cwd),
                    ],
                );
            }
            match SizerConfig::load(&path) {
                Ok(config) => config,
                Err(e) => report_cli_error_and_exit(&format!("{:#}", e), None, vec![]),
            }
        }
        None => SizerConfig::default(),
    };

    if let Some(matches) = matches.subcommand_matches("classify") {
        dispatch("classify", matches, &config, classify::handle_classify);
    } else if let Some(matches) = matches.subcommand_matches("report-timing") {
        dispatch(
            "report-timing",
            matches,
            &config,
            report_timing::handle_report_timing,
        );
    } else if let Some(matches) = matches.subcommand_matches("recover-power") {
        dispatch(
            "recover-power",
            matches,
            &config,
            recover_power::handle_recover_power,
        );
    } else if let Some(matches) = matches.subcommand_matches("repair-timing") {
        dispatch(
            "repair-timing",
            matches,
            &config,
            repair_timing::handle_repair_timing,
        );
    } else if let Some(matches) = matches.subcommand_matches("bottleneck") {
        dispatch("bottleneck", matches, &config, bottleneck::handle_bottleneck);
    } else {
        report_cli_error_and_exit("No valid subcommand provided.", None, vec![]);
    }
}
