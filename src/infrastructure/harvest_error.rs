//! Error taxonomy of the report harvester
//!
//! Every error raised while driving a job is caught at the harvest state
//! machine boundary and converted into a [`JobOutcome`]; none of these
//! escape a single job.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::JobOutcome;

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("Browser could not be started: {0}")]
    BrowserLaunch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Option '{label}' not found in {locator}")]
    OptionNotFound { locator: String, label: String },

    #[error("Element {locator} unavailable: {reason}")]
    ElementUnavailable { locator: String, reason: String },

    #[error("Export format '{format}' unavailable: {reason}")]
    ExportUnavailable { format: String, reason: String },

    #[error("{0}")]
    Transient(String),

    #[error("File system error on {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarvestError {
    pub fn navigation(url: &str, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn option_not_found(locator: &str, label: &str) -> Self {
        Self::OptionNotFound {
            locator: locator.to_string(),
            label: label.to_string(),
        }
    }

    pub fn element(locator: &str, reason: impl ToString) -> Self {
        Self::ElementUnavailable {
            locator: locator.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn export_unavailable(format: &str, reason: impl ToString) -> Self {
        Self::ExportUnavailable {
            format: format.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Whether a later run may succeed where this one failed
    pub const fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::OptionNotFound { .. } | Self::ExportUnavailable { .. }
        )
    }

    /// Outcome for an error that escaped a state without a more specific mapping
    pub fn into_outcome(self) -> JobOutcome {
        match self {
            Self::ExportUnavailable { .. } => JobOutcome::ExportUnavailable,
            Self::OptionNotFound { .. } => JobOutcome::NoDataForPeriod,
            other => JobOutcome::TransientError(other.to_string()),
        }
    }
}

pub type HarvestResult<T> = Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_errors_classify_as_export_unavailable() {
        let err = HarvestError::export_unavailable("CSV (delimitado por comas)", "menu missing");
        assert!(!err.is_recoverable());
        assert_eq!(err.into_outcome(), JobOutcome::ExportUnavailable);
    }

    #[test]
    fn navigation_errors_are_transient() {
        let err = HarvestError::navigation("https://example.invalid", "timeout");
        assert!(err.is_recoverable());
        match err.into_outcome() {
            JobOutcome::TransientError(cause) => assert!(cause.contains("timeout")),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
