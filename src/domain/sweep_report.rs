//! In-memory record of one sweep run (logged, never persisted)

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::dimension::{Dimension, SweepKind};
use super::report_job::{JobOutcome, PeriodKey};

#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
    pub dimension: Dimension,
    pub period: PeriodKey,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub kind: SweepKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Executed jobs in execution order
    pub entries: Vec<SweepEntry>,
    /// (dimension, year) pairs the viewer did not offer
    pub years_skipped: Vec<(Dimension, i32)>,
    /// (dimension, year) pairs whose session could not be opened
    pub sessions_failed: Vec<(Dimension, i32)>,
}

impl SweepReport {
    pub fn start(kind: SweepKind) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            entries: Vec::new(),
            years_skipped: Vec::new(),
            sessions_failed: Vec::new(),
        }
    }

    pub fn record(&mut self, dimension: Dimension, period: PeriodKey, outcome: JobOutcome) {
        self.entries.push(SweepEntry {
            dimension,
            period,
            outcome,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Number of entries per outcome label
    pub fn outcome_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.outcome.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn successes(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, JobOutcome::Success(_)))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    pub fn elapsed_seconds(&self) -> i64 {
        self.finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_seconds()
    }
}
