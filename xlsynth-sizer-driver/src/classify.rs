// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::ArgMatches;
use serde::Serialize;

use crate::common::load_design;
use crate::config::SizerConfig;

#[derive(Debug, Serialize)]
struct CellRow {
    cell: String,
    bucket: &'static str,
    /// Farads; `None` when the cell has no delay arcs to characterize.
    target_load: Option<f64>,
    dont_use: bool,
}

pub fn handle_classify(matches: &ArgMatches, config: &SizerConfig) -> Result<()> {
    let design = load_design(matches, config)?;
    let lib = &design.library;
    let rows: Vec<CellRow> = lib
        .cell_ids()
        .map(|id| {
            let cell = lib.cell(id);
            CellRow {
                cell: cell.name.clone(),
                bucket: lib.classify(id).as_str(),
                target_load: lib.target_load(id).ok(),
                dont_use: cell.dont_use,
            }
        })
        .collect();
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in &rows {
        let load = match row.target_load {
            Some(f) => format!("{:.3}fF", f * 1e15),
            None => "-".to_string(),
        };
        println!(
            "{:<24} {:<10} {:>12}{}",
            row.cell,
            row.bucket,
            load,
            if row.dont_use { "  dont_use" } else { "" }
        );
    }
    Ok(())
}
