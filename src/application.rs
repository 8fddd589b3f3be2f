//! Application layer module
//!
//! Orchestrates the domain types and infrastructure services: the per-job
//! harvest state machine, the sweep driver walking the whole catalog, the
//! background launcher used by the control API and the consolidation pass.

pub mod consolidation;
pub mod harvest_machine;
pub mod sweep_driver;
pub mod sweep_launcher;

pub use consolidation::{ConsolidationEngine, ConsolidationSummary};
pub use harvest_machine::{HarvestMachine, HarvestState};
pub use sweep_driver::SweepDriver;
pub use sweep_launcher::{BackgroundSweepLauncher, SweepLauncher};
