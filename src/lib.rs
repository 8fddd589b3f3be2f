//! CRT Harvest - tequila statistics report harvester
//!
//! Sweeps the CRT report viewer month by month with a headless browser,
//! stores every export under a canonical name and consolidates the
//! harvested files into one table per report family.

// Module declarations
pub mod application;
pub mod commands;
pub mod domain;
pub mod infrastructure;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use application::BackgroundSweepLauncher;
use commands::ControlState;
use infrastructure::{AppConfig, ChromeSessionFactory, ConfigManager};

/// Load configuration from `path`, or from the user config directory
/// (created with defaults on first run) when no path is given
pub async fn load_app_config(path: Option<&str>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {path}")),
        None => ConfigManager::new()?.load_config().await,
    }
}

/// `--config <path>` from the command line, if present
pub fn config_path_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Serve the control API until the process is interrupted
pub async fn run_server(config: AppConfig) -> Result<()> {
    let factory = ChromeSessionFactory::new(config.harvest.clone());
    let launcher = BackgroundSweepLauncher::new(config.harvest.clone(), factory);
    let app = commands::router(ControlState::new(Arc::new(launcher)));

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("🌐 Control API listening on http://{}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("🛑 Shutdown signal received");
        })
        .await
        .context("Control API server failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_flag_is_found_anywhere() {
        let args: Vec<String> = ["bin", "paises", "--config", "cfg.toml"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(config_path_arg(&args), Some("cfg.toml"));
        assert_eq!(config_path_arg(&args[..2]), None);
    }
}
