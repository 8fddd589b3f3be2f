//! Infrastructure layer for configuration, logging, browser control and
//! download handling
//!
//! This module holds everything that touches the outside world: the config
//! files, the log sinks, the Chrome process driving the report viewer and the
//! download directories it writes into.

pub mod config; // Configuration loading and defaults
pub mod download_watcher; // Directory polling and canonical rename
pub mod harvest_error; // Error taxonomy of a harvest job
pub mod logging; // Logging infrastructure
pub mod viewer_session; // Browser-side UI primitives

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, HarvestConfig, LoggingConfig, ServerConfig, TimingConfig};
pub use download_watcher::{DirectorySnapshot, DownloadWatcher};
pub use harvest_error::{HarvestError, HarvestResult};
pub use logging::{get_log_directory, init_logging_with_config};
pub use viewer_session::{
    CheckboxState, ChromeSessionFactory, ChromeViewerSession, RenderStatus, SessionFactory,
    SessionGuard, SessionOptions, ViewerSession,
};
