//! Harvest state machine
//!
//! Drives one [`ReportJob`] through
//! `SelectYear → SelectPeriodFilters → Render → CheckEmpty → Export →
//! AwaitDownload → Commit → Done`, or into `Failed` from any state. A job
//! runs the sequence at most once; there are no backward transitions.
//!
//! Errors never leave [`HarvestMachine::run`]: each one is classified into a
//! [`JobOutcome`] according to the state that raised it, and every failure
//! goes through the same recovery path (dismiss modal, reset frame, log)
//! before control returns to the sweep.

#![allow(clippy::uninlined_format_args)]

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{CheckboxGroup, Dimension, JobOutcome, PeriodFilters, ReportJob};
use crate::infrastructure::{
    CheckboxState, DirectorySnapshot, DownloadWatcher, HarvestConfig, HarvestError, RenderStatus,
    ViewerSession,
};

/// States of a single harvest job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestState {
    SelectYear,
    SelectPeriodFilters,
    Render,
    CheckEmpty,
    Export,
    AwaitDownload,
    Commit,
    Done,
    Failed,
}

impl fmt::Display for HarvestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one state handler
enum Transition {
    Next(HarvestState),
    Finish(JobOutcome),
}

/// A classified failure plus the error that caused it, for the log line
struct Failure {
    outcome: JobOutcome,
    cause: String,
    recoverable: bool,
}

impl Failure {
    /// State-specific classification; only transient outcomes are worth a later retry
    fn new(outcome: JobOutcome, cause: impl ToString) -> Self {
        let recoverable = matches!(outcome, JobOutcome::TransientError(_));
        Self {
            outcome,
            cause: cause.to_string(),
            recoverable,
        }
    }

    /// Classification shared by every state without a more specific rule
    fn from_error(error: HarvestError) -> Self {
        let cause = error.to_string();
        let recoverable = error.is_recoverable();
        Self {
            outcome: error.into_outcome(),
            cause,
            recoverable,
        }
    }
}

type StepResult = Result<Transition, Failure>;

/// Values carried from one state to a later one
#[derive(Default)]
struct JobContext {
    snapshot: Option<DirectorySnapshot>,
    downloaded: Option<std::path::PathBuf>,
}

/// Runs report jobs against a [`ViewerSession`]
#[derive(Debug, Clone)]
pub struct HarvestMachine {
    export_format_label: String,
    export_extension: String,
    download_timeout: Duration,
    watcher: DownloadWatcher,
}

impl HarvestMachine {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            export_format_label: config.export_format_label.clone(),
            export_extension: config.export_extension.clone(),
            download_timeout: config.timing.download_timeout(),
            watcher: DownloadWatcher::new(config.timing.download_poll()),
        }
    }

    /// Navigate a fresh session and gate on the year being offered.
    ///
    /// Returns `Err(YearUnavailable)` when the year dropdown has no such
    /// option. Reports that re-navigate per job have no year gate and
    /// defer navigation to the job itself.
    pub fn enter_year<S: ViewerSession + ?Sized>(
        &self,
        session: &mut S,
        dimension: Dimension,
        year: i32,
        page_url: &str,
    ) -> Result<(), JobOutcome> {
        let layout = dimension.layout();
        if layout.reload_per_job {
            return Ok(());
        }

        let entered = session
            .open(page_url)
            .map_err(Failure::from_error)
            .and_then(|()| match layout.year_selector {
                Some(group) => self.select_year_option(session, &group, year),
                None => Ok(()),
            });

        entered.map_err(|failure| {
            Self::recover(session, &format!("{year}-{dimension}"), HarvestState::SelectYear, &failure);
            failure.outcome
        })
    }

    /// Drive `job` to a terminal outcome; never panics, never returns an error
    pub fn run<S: ViewerSession + ?Sized>(
        &self,
        session: &mut S,
        job: &ReportJob,
        page_url: &str,
    ) -> JobOutcome {
        let mut state = HarvestState::SelectYear;
        let mut context = JobContext::default();
        let mut outcome = None;

        loop {
            debug!("[{}] state {}", job, state);
            let step = match state {
                HarvestState::SelectYear => self.select_year(session, job, page_url),
                HarvestState::SelectPeriodFilters => self.select_period_filters(session, job),
                HarvestState::Render => Self::render(session, job),
                HarvestState::CheckEmpty => Self::check_empty(session, job),
                HarvestState::Export => self.export(session, job, &mut context),
                HarvestState::AwaitDownload => self.await_download(job, &mut context),
                HarvestState::Commit => self.commit(job, &mut context),
                HarvestState::Done | HarvestState::Failed => break,
            };

            state = match step {
                Ok(Transition::Next(next)) => next,
                Ok(Transition::Finish(finished)) => {
                    outcome = Some(finished);
                    HarvestState::Done
                }
                Err(failure) => {
                    Self::recover(session, &job.to_string(), state, &failure);
                    outcome = Some(failure.outcome);
                    HarvestState::Failed
                }
            };
        }

        outcome.unwrap_or_else(|| JobOutcome::TransientError(format!("job stopped in {state} without an outcome")))
    }

    /// Uniform recovery before moving on to the next job
    fn recover<S: ViewerSession + ?Sized>(
        session: &mut S,
        label: &str,
        state: HarvestState,
        failure: &Failure,
    ) {
        if session.dismiss_modal_if_present() {
            debug!("[{}] dismissed a modal alert during recovery", label);
        }
        session.reset_to_main_frame();

        if matches!(failure.outcome, JobOutcome::NoDataForPeriod) {
            info!("📭 [{}] no data in {}: {}", label, state, failure.cause);
        } else {
            warn!(
                "⚠️ [{}] {} -> {} ({}){}",
                label,
                state,
                failure.outcome.label(),
                failure.cause,
                if failure.recoverable { ", retry on a later sweep" } else { "" }
            );
        }
    }

    fn select_year_option<S: ViewerSession + ?Sized>(
        &self,
        session: &mut S,
        group: &CheckboxGroup,
        year: i32,
    ) -> Result<(), Failure> {
        session
            .select_single_option(group, &year.to_string())
            .map_err(|e| match e {
                HarvestError::OptionNotFound { .. } => Failure::new(JobOutcome::YearUnavailable, e),
                other => Failure::from_error(other),
            })
    }

    fn select_year<S: ViewerSession + ?Sized>(
        &self,
        session: &mut S,
        job: &ReportJob,
        page_url: &str,
    ) -> StepResult {
        let layout = job.dimension().layout();
        if layout.reload_per_job {
            // Fresh form per month; the date range carries the year
            session.open(page_url).map_err(Failure::from_error)?;
        } else if let Some(group) = layout.year_selector {
            // Re-asserted per job since another job may have left the form dirty
            self.select_year_option(session, &group, job.period().year())?;
        }
        Ok(Transition::Next(HarvestState::SelectPeriodFilters))
    }

    fn select_period_filters<S: ViewerSession + ?Sized>(
        &self,
        session: &mut S,
        job: &ReportJob,
    ) -> StepResult {
        let period = job.period();
        let period_error = |e: HarvestError| match e {
            HarvestError::OptionNotFound { .. } => Failure::new(JobOutcome::NoDataForPeriod, e),
            other => Failure::from_error(other),
        };

        match job.dimension().layout().period {
            PeriodFilters::MonthOption { month_group } => {
                session
                    .set_multi_checkbox_state(&month_group, CheckboxState::AllDeselected)
                    .map_err(period_error)?;
                session
                    .select_single_option(&month_group, period.month_label())
                    .map_err(period_error)?;
            }
            PeriodFilters::DateRange {
                start_input,
                end_input,
                select_all,
            } => {
                let (first, last) = period.date_range();
                session
                    .set_date_range(start_input, end_input, first, last)
                    .map_err(period_error)?;
                for group in &select_all {
                    session
                        .set_multi_checkbox_state(group, CheckboxState::AllSelected)
                        .map_err(period_error)?;
                }
            }
        }

        Ok(Transition::Next(HarvestState::Render))
    }

    fn render<S: ViewerSession + ?Sized>(session: &mut S, job: &ReportJob) -> StepResult {
        // A click that never happened would leave the previous month's report
        // on screen, so only the wait itself is best-effort.
        match session.trigger_render().map_err(Failure::from_error)? {
            RenderStatus::Complete => debug!("[{}] render complete", job),
            RenderStatus::TimedOut => debug!("[{}] render wait timed out, checking page anyway", job),
        }
        Ok(Transition::Next(HarvestState::CheckEmpty))
    }

    fn check_empty<S: ViewerSession + ?Sized>(session: &mut S, job: &ReportJob) -> StepResult {
        if session.page_indicates_no_data().map_err(Failure::from_error)? {
            info!("📭 [{}] no data for period", job);
            return Ok(Transition::Finish(JobOutcome::NoDataForPeriod));
        }
        Ok(Transition::Next(HarvestState::Export))
    }

    fn export<S: ViewerSession + ?Sized>(
        &self,
        session: &mut S,
        job: &ReportJob,
        context: &mut JobContext,
    ) -> StepResult {
        let dir = job.destination_dir();
        std::fs::create_dir_all(dir)
            .map_err(|e| Failure::from_error(HarvestError::file_system(dir, e)))?;
        context.snapshot = Some(DirectorySnapshot::capture(dir).map_err(Failure::from_error)?);

        session
            .trigger_export(&self.export_format_label)
            .map_err(|e| Failure::new(JobOutcome::ExportUnavailable, e))?;
        Ok(Transition::Next(HarvestState::AwaitDownload))
    }

    fn await_download(&self, job: &ReportJob, context: &mut JobContext) -> StepResult {
        let before = context.snapshot.take().unwrap_or_default();
        let found = self.watcher.wait_for_new_file(
            job.destination_dir(),
            &before,
            &self.export_extension,
            self.download_timeout,
        );

        match found {
            Some(path) => {
                context.downloaded = Some(path);
                Ok(Transition::Next(HarvestState::Commit))
            }
            None => Err(Failure::new(
                JobOutcome::TransientError("no file detected".to_string()),
                format!("nothing arrived within {}s", self.download_timeout.as_secs()),
            )),
        }
    }

    fn commit(&self, job: &ReportJob, context: &mut JobContext) -> StepResult {
        let Some(source) = context.downloaded.take() else {
            return Err(Failure::new(
                JobOutcome::TransientError("no file detected".to_string()),
                "commit reached without a download",
            ));
        };

        let committed = self
            .watcher
            .commit_as(
                &source,
                job.destination_dir(),
                job.canonical_name(),
                &self.export_extension,
            )
            .map_err(|e| Failure::new(JobOutcome::TransientError("rename failed".to_string()), e))?;

        info!("✅ [{}] saved {:?}", job, committed);
        Ok(Transition::Finish(JobOutcome::Success(committed)))
    }
}
