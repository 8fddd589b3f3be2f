//! Domain module - report catalog, harvest jobs and sweep outcomes
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod dimension;
pub mod report_job;
pub mod sweep_report;

pub use dimension::{CheckboxGroup, Dimension, PeriodFilters, SweepKind, ViewerLayout, MONTH_LABELS};
pub use report_job::{year_directory, JobOutcome, PeriodKey, ReportJob, YearRange};
pub use sweep_report::{SweepEntry, SweepReport};
