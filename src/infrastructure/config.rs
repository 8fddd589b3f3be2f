//! Configuration infrastructure
//!
//! Contains configuration loading and management for the CRT harvester.
//!
//! Configuration is organized into three sections:
//! 1. Harvest settings (download layout, browser, viewer timings)
//! 2. Control server settings
//! 3. Logging settings
//!
//! Core harvesting code receives a [`HarvestConfig`] by value; nothing below
//! the binaries reads the process environment.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::info;
use url::Url;

use crate::domain::{SweepKind, YearRange};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config from file: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Report harvesting settings
    pub harvest: HarvestConfig,

    /// HTTP control surface settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Everything the sweep driver needs, injected at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Root of the harvested file tree
    pub base_download_dir: PathBuf,

    /// Chrome/Chromium executable; auto-detected when absent
    pub browser_binary_path: Option<PathBuf>,

    /// Label of the export menu entry to click
    pub export_format_label: String,

    /// Extension of the exported file, dot included
    pub export_extension: String,

    /// Base URL the report page names are resolved against
    pub viewer_base_url: String,

    /// Literal text the viewer renders for an empty report
    pub no_data_marker: String,

    /// Run the browser without a window
    pub headless: bool,

    /// Years swept by the category reports
    pub category_years: YearRange,

    /// Years swept by the country report
    pub country_years: YearRange,

    /// Waits and settle delays
    pub timing: TimingConfig,
}

/// Timing configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Wait budget for form controls and render completion (category reports)
    pub category_wait_secs: u64,

    /// Wait budget for form controls and render completion (country report)
    pub country_wait_secs: u64,

    /// Bounded wait for a dropdown option before reporting it missing
    pub option_wait_secs: u64,

    /// How long to wait for an exported file to appear
    pub download_timeout_secs: u64,

    /// Directory polling interval while waiting for a download
    pub download_poll_ms: u64,

    /// Pause after opening a dropdown
    pub dropdown_settle_ms: u64,

    /// Pause between checkbox clicks (the viewer re-renders per click)
    pub checkbox_settle_ms: u64,

    /// Pause after clicking "run report", before waiting for the render marker
    pub render_settle_ms: u64,

    /// Pause after opening the export menu
    pub export_menu_settle_ms: u64,
}

/// Control server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the control API listens on
    pub bind_address: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log file name inside the log directory
    pub file_name: String,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_download_dir: PathBuf::from(defaults::BASE_DOWNLOAD_DIR),
            browser_binary_path: None,
            export_format_label: defaults::EXPORT_FORMAT_LABEL.to_string(),
            export_extension: defaults::EXPORT_EXTENSION.to_string(),
            viewer_base_url: crt::VIEWER_BASE_URL.to_string(),
            no_data_marker: defaults::NO_DATA_MARKER.to_string(),
            headless: defaults::HEADLESS,
            category_years: YearRange::new(
                defaults::CATEGORY_FIRST_YEAR,
                defaults::CATEGORY_END_YEAR_EXCLUSIVE,
            ),
            country_years: YearRange::new(
                defaults::COUNTRY_FIRST_YEAR,
                defaults::COUNTRY_END_YEAR_EXCLUSIVE,
            ),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            category_wait_secs: defaults::CATEGORY_WAIT_SECS,
            country_wait_secs: defaults::COUNTRY_WAIT_SECS,
            option_wait_secs: defaults::OPTION_WAIT_SECS,
            download_timeout_secs: defaults::DOWNLOAD_TIMEOUT_SECS,
            download_poll_ms: defaults::DOWNLOAD_POLL_MS,
            dropdown_settle_ms: defaults::DROPDOWN_SETTLE_MS,
            checkbox_settle_ms: defaults::CHECKBOX_SETTLE_MS,
            render_settle_ms: defaults::RENDER_SETTLE_MS,
            export_menu_settle_ms: defaults::EXPORT_MENU_SETTLE_MS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
        }
    }
}

impl HarvestConfig {
    pub fn years_for(&self, kind: SweepKind) -> YearRange {
        match kind {
            SweepKind::Categorias => self.category_years,
            SweepKind::Paises => self.country_years,
        }
    }

    /// Absolute viewer URL of a report page
    pub fn viewer_url(&self, page: &str) -> Result<Url, url::ParseError> {
        let mut base = Url::parse(&self.viewer_base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(page)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, range) in [
            ("category_years", self.category_years),
            ("country_years", self.country_years),
        ] {
            if range.is_empty() {
                return Err(ConfigError::Validation {
                    message: format!("{} must contain at least one year", name),
                });
            }
        }

        if !self.export_extension.starts_with('.') {
            return Err(ConfigError::Validation {
                message: "export_extension must start with '.'".to_string(),
            });
        }

        if self.export_format_label.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "export_format_label cannot be empty".to_string(),
            });
        }

        if Url::parse(&self.viewer_base_url).is_err() {
            return Err(ConfigError::Validation {
                message: format!("viewer_base_url is not a URL: {}", self.viewer_base_url),
            });
        }

        let t = &self.timing;
        if t.category_wait_secs == 0
            || t.country_wait_secs == 0
            || t.option_wait_secs == 0
            || t.download_timeout_secs == 0
            || t.download_poll_ms == 0
        {
            return Err(ConfigError::Validation {
                message: "wait budgets and poll interval must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl TimingConfig {
    pub fn wait_budget(&self, kind: SweepKind) -> Duration {
        Duration::from_secs(match kind {
            SweepKind::Categorias => self.category_wait_secs,
            SweepKind::Paises => self.country_wait_secs,
        })
    }

    pub fn option_wait(&self) -> Duration {
        Duration::from_secs(self.option_wait_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn download_poll(&self) -> Duration {
        Duration::from_millis(self.download_poll_ms)
    }

    pub fn dropdown_settle(&self) -> Duration {
        Duration::from_millis(self.dropdown_settle_ms)
    }

    pub fn checkbox_settle(&self) -> Duration {
        Duration::from_millis(self.checkbox_settle_ms)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_millis(self.render_settle_ms)
    }

    pub fn export_menu_settle(&self) -> Duration {
        Duration::from_millis(self.export_menu_settle_ms)
    }
}

impl AppConfig {
    /// Layer an optional config file and `CRT_HARVEST__*` environment variables
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("CRT_HARVEST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.harvest.validate()?;

        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::Validation {
                message: format!("bind_address is not a socket address: {}", self.server.bind_address),
            });
        }

        Ok(())
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("crt-harvest");

        Ok(config_dir)
    }

    /// Create a new configuration manager pointing at the user config directory
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        let config_path = config_dir.join("crt_harvest_config.json");

        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("🎉 Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let path = self.config_path.to_string_lossy().to_string();
        let config = AppConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        info!("Loaded configuration from: {:?}", self.config_path);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// CRT statistics viewer endpoints
pub mod crt {
    /// Folder holding every report page of the legacy viewer
    pub const VIEWER_BASE_URL: &str = "https://old.crt.org.mx/EstadisticasCRTweb/Informes/";
}

/// Default harvest configuration values
pub mod defaults {
    pub const BASE_DOWNLOAD_DIR: &str = "data";

    /// Export menu entry of the viewer (comma-delimited CSV)
    pub const EXPORT_FORMAT_LABEL: &str = "CSV (delimitado por comas)";

    pub const EXPORT_EXTENSION: &str = ".csv";

    /// Placeholder text of an empty report
    pub const NO_DATA_MARKER: &str = "No se encontro";

    pub const HEADLESS: bool = true;

    pub const CATEGORY_FIRST_YEAR: i32 = 1995;
    pub const CATEGORY_END_YEAR_EXCLUSIVE: i32 = 2025;
    pub const COUNTRY_FIRST_YEAR: i32 = 1997;
    pub const COUNTRY_END_YEAR_EXCLUSIVE: i32 = 2025;

    pub const CATEGORY_WAIT_SECS: u64 = 120;
    pub const COUNTRY_WAIT_SECS: u64 = 180;
    pub const OPTION_WAIT_SECS: u64 = 30;
    pub const DOWNLOAD_TIMEOUT_SECS: u64 = 20;
    pub const DOWNLOAD_POLL_MS: u64 = 200;
    pub const DROPDOWN_SETTLE_MS: u64 = 1000;
    pub const CHECKBOX_SETTLE_MS: u64 = 200;
    pub const RENDER_SETTLE_MS: u64 = 1500;
    pub const EXPORT_MENU_SETTLE_MS: u64 = 500;

    pub const BIND_ADDRESS: &str = "0.0.0.0:8000";

    // Log configuration defaults
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = true;
    pub const LOG_FILE_NAME: &str = "crt-harvest.log";
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_valid() {
        AppConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn viewer_url_joins_page_names() {
        let mut harvest = HarvestConfig::default();
        assert_eq!(
            harvest.viewer_url("ExportacionesPorPais.aspx").unwrap().as_str(),
            "https://old.crt.org.mx/EstadisticasCRTweb/Informes/ExportacionesPorPais.aspx"
        );

        harvest.viewer_base_url = "http://localhost:9000/Informes".to_string();
        assert_eq!(
            harvest.viewer_url("X.aspx").unwrap().as_str(),
            "http://localhost:9000/Informes/X.aspx"
        );
    }

    #[test]
    fn empty_year_range_is_rejected() {
        let mut harvest = HarvestConfig::default();
        harvest.country_years = YearRange::new(2025, 2025);
        assert!(matches!(harvest.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn extension_without_dot_is_rejected() {
        let mut harvest = HarvestConfig::default();
        harvest.export_extension = "csv".to_string();
        assert!(harvest.validate().is_err());
    }

    #[test]
    fn years_follow_sweep_kind() {
        let harvest = HarvestConfig::default();
        assert_eq!(harvest.years_for(SweepKind::Categorias), YearRange::new(1995, 2025));
        assert_eq!(harvest.years_for(SweepKind::Paises), YearRange::new(1997, 2025));
    }

    #[tokio::test]
    async fn config_manager_round_trips_json() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        let created = manager.load_config().await.unwrap();
        assert!(manager.config_path().exists());
        assert_eq!(created.harvest.export_extension, ".csv");

        let mut changed = created.clone();
        changed.harvest.headless = false;
        changed.harvest.timing.download_timeout_secs = 45;
        manager.save_config(&changed).await.unwrap();

        let loaded = manager.load_config().await.unwrap();
        assert!(!loaded.harvest.headless);
        assert_eq!(loaded.harvest.timing.download_timeout_secs, 45);
    }
}
