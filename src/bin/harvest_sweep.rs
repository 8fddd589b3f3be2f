//! Run one sweep in the foreground
//!
//! Usage: `harvest_sweep [categorias|paises] [--config <path>]`

use anyhow::{Context, Result, anyhow};
use crt_harvest_lib::application::SweepDriver;
use crt_harvest_lib::domain::SweepKind;
use crt_harvest_lib::infrastructure::ChromeSessionFactory;
use crt_harvest_lib::infrastructure::logging::{init_logging_with_config, log_system_info};
use crt_harvest_lib::{config_path_arg, load_app_config};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let kind = match args.get(1).filter(|a| !a.starts_with("--")) {
        Some(tipo) => tipo.parse::<SweepKind>().map_err(|e| anyhow!("{e}; use 'categorias' or 'paises'"))?,
        None => SweepKind::Categorias,
    };

    let config = load_app_config(config_path_arg(&args)).await?;
    init_logging_with_config(config.logging.clone())?;
    log_system_info();

    let harvest = config.harvest;
    let driver = SweepDriver::new(harvest.clone(), ChromeSessionFactory::new(harvest));
    let report = tokio::task::spawn_blocking(move || driver.run(kind))
        .await
        .context("Sweep task failed")?;

    println!("🏁 Sweep {} ({}) finished in {}s", report.run_id, report.kind, report.elapsed_seconds());
    for (label, count) in report.outcome_counts() {
        println!("  {label}: {count}");
    }
    if !report.years_skipped.is_empty() {
        println!("  years skipped: {}", report.years_skipped.len());
    }
    if !report.sessions_failed.is_empty() {
        println!("  sessions failed: {:?}", report.sessions_failed);
    }

    Ok(())
}
