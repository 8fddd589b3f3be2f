//! Merge harvested files into one CSV per report family
//!
//! Usage: `consolidate [--base <dir>] [--config <path>]`

use anyhow::Result;
use crt_harvest_lib::application::ConsolidationEngine;
use crt_harvest_lib::infrastructure::logging::init_logging_with_config;
use crt_harvest_lib::{config_path_arg, load_app_config};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config = load_app_config(config_path_arg(&args)).await?;
    init_logging_with_config(config.logging.clone())?;

    let base = args
        .iter()
        .position(|a| a == "--base")
        .and_then(|i| args.get(i + 1))
        .map_or_else(|| config.harvest.base_download_dir.clone(), PathBuf::from);

    let engine = ConsolidationEngine::new(&base).with_extension(config.harvest.export_extension.clone());
    let summaries = engine.consolidate_all()?;

    if summaries.is_empty() {
        println!("No valid files found under {}", base.display());
        return Ok(());
    }

    println!("📊 Consolidated outputs:");
    for summary in &summaries {
        println!(
            "  {} -> {} ({} rows, {} files, {} skipped)",
            summary.dimension,
            summary.output_path.display(),
            summary.rows_written,
            summary.files_read,
            summary.files_skipped
        );
    }
    Ok(())
}
