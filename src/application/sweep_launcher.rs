//! Detached sweep dispatch for the control API
//!
//! Browser control blocks, so the sweep runs on tokio's blocking pool while a
//! small async task waits for it and logs the result. Callers get the join
//! handle back immediately and are free to drop it.

use tokio::task::JoinHandle;
use tracing::{error, info};

use super::sweep_driver::SweepDriver;
use crate::domain::{SweepKind, SweepReport};
use crate::infrastructure::{HarvestConfig, SessionFactory};

/// Starts a sweep without waiting for it
pub trait SweepLauncher: Send + Sync {
    /// Must be called from within a tokio runtime.
    /// The handle yields `None` when the sweep task died.
    fn launch(&self, kind: SweepKind) -> JoinHandle<Option<SweepReport>>;
}

/// Runs each sweep on the blocking pool with a fresh [`SweepDriver`]
#[derive(Debug, Clone)]
pub struct BackgroundSweepLauncher<F> {
    config: HarvestConfig,
    factory: F,
}

impl<F> BackgroundSweepLauncher<F> {
    pub const fn new(config: HarvestConfig, factory: F) -> Self {
        Self { config, factory }
    }
}

impl<F> SweepLauncher for BackgroundSweepLauncher<F>
where
    F: SessionFactory + Clone + Send + Sync + 'static,
{
    fn launch(&self, kind: SweepKind) -> JoinHandle<Option<SweepReport>> {
        let driver = SweepDriver::new(self.config.clone(), self.factory.clone());
        info!("🔄 Dispatching '{}' sweep in the background", kind);

        let sweep = tokio::task::spawn_blocking(move || driver.run(kind));
        tokio::spawn(async move {
            match sweep.await {
                Ok(report) => {
                    info!(
                        "🏁 Background '{}' sweep {} done: {} saved, {} failed",
                        kind,
                        report.run_id,
                        report.successes(),
                        report.failures()
                    );
                    Some(report)
                }
                Err(e) => {
                    error!("❌ Background '{}' sweep died: {}", kind, e);
                    None
                }
            }
        })
    }
}
