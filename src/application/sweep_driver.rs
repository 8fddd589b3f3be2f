//! Sweep driver
//!
//! Walks (dimension, year, month) in ascending order, one browser session per
//! (dimension, year), one job at a time. Jobs share the session's UI state, so
//! nothing here runs concurrently.

#![allow(clippy::uninlined_format_args)]

use std::path::Path;
use tracing::{error, info, warn};

use super::harvest_machine::HarvestMachine;
use crate::domain::{year_directory, Dimension, JobOutcome, PeriodKey, ReportJob, SweepKind, SweepReport};
use crate::infrastructure::{HarvestConfig, SessionFactory, SessionGuard};

/// Runs full sweeps with an injected configuration and session factory
pub struct SweepDriver<F: SessionFactory> {
    config: HarvestConfig,
    factory: F,
    machine: HarvestMachine,
}

impl<F: SessionFactory> SweepDriver<F> {
    pub fn new(config: HarvestConfig, factory: F) -> Self {
        let machine = HarvestMachine::new(&config);
        Self {
            config,
            factory,
            machine,
        }
    }

    /// Sweep every dimension of `kind` over its configured year range
    pub fn run(&self, kind: SweepKind) -> SweepReport {
        let mut report = SweepReport::start(kind);
        let years = self.config.years_for(kind);
        info!(
            "🚀 Starting '{}' sweep {} (years {}..{}, base {:?})",
            kind, report.run_id, years.start, years.end_exclusive, self.config.base_download_dir
        );

        for &dimension in kind.dimensions() {
            let page_url = match self.config.viewer_url(dimension.page()) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    error!("❌ No viewer URL for {}: {}", dimension, e);
                    continue;
                }
            };

            info!("📂 Dimension {} ({})", dimension, page_url);
            for year in years.years() {
                self.sweep_year(dimension, year, &page_url, &mut report);
            }
        }

        report.finish();
        log_summary(&report);
        report
    }

    fn sweep_year(&self, dimension: Dimension, year: i32, page_url: &str, report: &mut SweepReport) {
        let base = self.config.base_download_dir.as_path();
        let year_dir = year_directory(base, dimension, year);
        if let Err(e) = std::fs::create_dir_all(&year_dir) {
            warn!("⚠️ Cannot create {:?}: {}", year_dir, e);
            report.sessions_failed.push((dimension, year));
            return;
        }

        let session = match self.factory.create(dimension, &year_dir) {
            Ok(session) => session,
            Err(e) => {
                warn!("⚠️ No browser session for {} {}: {}", dimension, year, e);
                report.sessions_failed.push((dimension, year));
                return;
            }
        };
        let mut session = SessionGuard::new(session);

        match self.machine.enter_year(&mut *session, dimension, year, page_url) {
            Ok(()) => info!("📅 {} {}", dimension, year),
            Err(JobOutcome::YearUnavailable) => {
                info!("⏭️ Year {} not offered for {}, skipping", year, dimension);
                report.years_skipped.push((dimension, year));
                return;
            }
            // Each job re-asserts the year, so a flaky first load is not fatal
            Err(other) => warn!("⚠️ Entering {} {} failed ({}), trying months anyway", dimension, year, other),
        }

        self.sweep_months(&mut *session, dimension, year, page_url, base, report);
        session.close();
    }

    fn sweep_months(
        &self,
        session: &mut F::Session,
        dimension: Dimension,
        year: i32,
        page_url: &str,
        base: &Path,
        report: &mut SweepReport,
    ) {
        for period in PeriodKey::months_of(year) {
            let job = ReportJob::new(dimension, period, base);
            let outcome = self.machine.run(session, &job, page_url);
            let year_gone = outcome == JobOutcome::YearUnavailable;
            report.record(dimension, period, outcome);

            if year_gone {
                info!("⏭️ Year {} disappeared for {}, skipping remaining months", year, dimension);
                report.years_skipped.push((dimension, year));
                break;
            }
        }
    }
}

fn log_summary(report: &SweepReport) {
    info!(
        "📊 Sweep {} ({}) finished in {}s: {} jobs, {} saved, {} failed, {} years skipped, {} sessions failed",
        report.run_id,
        report.kind,
        report.elapsed_seconds(),
        report.entries.len(),
        report.successes(),
        report.failures(),
        report.years_skipped.len(),
        report.sessions_failed.len()
    );
    for (label, count) in report.outcome_counts() {
        info!("   {}: {}", label, count);
    }
}
