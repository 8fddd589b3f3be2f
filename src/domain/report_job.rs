//! Harvest units of work and their outcomes

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use super::dimension::{Dimension, MONTH_LABELS};

/// (year, month) coordinate of one harvested report; month is always 1..=12
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodKey {
    year: i32,
    month: u32,
}

impl PeriodKey {
    /// Returns `None` when the month is outside 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub const fn year(self) -> i32 {
        self.year
    }

    pub const fn month(self) -> u32 {
        self.month
    }

    /// Spanish label shown by the viewer's month filter
    pub fn month_label(self) -> &'static str {
        MONTH_LABELS[(self.month - 1) as usize]
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last calendar day of the month, leap years included
    pub fn last_day(self) -> NaiveDate {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    /// `[first-day, last-day]` range used by the country report
    pub fn date_range(self) -> (NaiveDate, NaiveDate) {
        (self.first_day(), self.last_day())
    }

    /// Every month of a year in ascending order
    pub fn months_of(year: i32) -> impl Iterator<Item = PeriodKey> {
        (1..=12).map(move |month| PeriodKey { year, month })
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Half-open year range `[start, end_exclusive)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end_exclusive: i32,
}

impl YearRange {
    pub const fn new(start: i32, end_exclusive: i32) -> Self {
        Self { start, end_exclusive }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..self.end_exclusive).contains(&year)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end_exclusive
    }

    pub fn years(&self) -> std::ops::Range<i32> {
        self.start..self.end_exclusive
    }
}

/// Directory holding every harvested file of one (dimension, year)
///
/// Category reports nest under a per-dimension folder; the country report
/// keeps its year folders directly under the base directory.
pub fn year_directory(base_dir: &Path, dimension: Dimension, year: i32) -> PathBuf {
    let folder = format!("{year}-{}", dimension.name());
    if dimension.is_country() {
        base_dir.join(folder)
    } else {
        base_dir.join(dimension.name()).join(folder)
    }
}

/// One report to harvest; immutable once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportJob {
    dimension: Dimension,
    period: PeriodKey,
    destination_dir: PathBuf,
    canonical_name: String,
}

impl ReportJob {
    pub fn new(dimension: Dimension, period: PeriodKey, base_dir: &Path) -> Self {
        Self {
            dimension,
            period,
            destination_dir: year_directory(base_dir, dimension, period.year()),
            canonical_name: format!("{period}-{}", dimension.name()),
        }
    }

    pub const fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub const fn period(&self) -> PeriodKey {
        self.period
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// `{year}-{month:02}-{dimension}` without extension
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn destination_path(&self, extension: &str) -> PathBuf {
        self.destination_dir
            .join(format!("{}{}", self.canonical_name, extension))
    }
}

impl fmt::Display for ReportJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name)
    }
}

/// Classified result of driving one job through the harvest state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Success(PathBuf),
    /// The viewer rendered its "no results" placeholder; expected, not a failure
    NoDataForPeriod,
    /// The year is not offered by the viewer; the rest of the year is skipped
    YearUnavailable,
    ExportUnavailable,
    TransientError(String),
}

impl JobOutcome {
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::ExportUnavailable | Self::TransientError(_))
    }

    /// Short label used in logs and sweep summaries
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::NoDataForPeriod => "no_data",
            Self::YearUnavailable => "year_unavailable",
            Self::ExportUnavailable => "export_unavailable",
            Self::TransientError(_) => "transient_error",
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(path) => write!(f, "success ({})", path.display()),
            Self::TransientError(cause) => write!(f, "transient error: {cause}"),
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(13)]
    fn period_rejects_out_of_range_months(#[case] month: u32) {
        assert!(PeriodKey::new(2000, month).is_none());
    }

    #[rstest]
    #[case(2000, 2, 29)]
    #[case(1900, 2, 28)]
    #[case(2023, 2, 28)]
    #[case(2024, 2, 29)]
    #[case(2024, 4, 30)]
    #[case(2024, 12, 31)]
    fn last_day_respects_calendar(#[case] year: i32, #[case] month: u32, #[case] day: u32) {
        let period = PeriodKey::new(year, month).unwrap();
        assert_eq!(period.last_day(), NaiveDate::from_ymd_opt(year, month, day).unwrap());
    }

    #[test]
    fn canonical_name_pads_month() {
        let period = PeriodKey::new(2003, 7).unwrap();
        let job = ReportJob::new(Dimension::Production, period, Path::new("/data"));
        assert_eq!(job.canonical_name(), "2003-07-ProduccionTotalTequila");
        assert_eq!(
            job.destination_path(".csv"),
            PathBuf::from("/data/ProduccionTotalTequila/2003-ProduccionTotalTequila/2003-07-ProduccionTotalTequila.csv")
        );
    }

    #[test]
    fn country_jobs_live_directly_under_base() {
        let period = PeriodKey::new(2000, 2).unwrap();
        let job = ReportJob::new(Dimension::ExportsByCountry, period, Path::new("/data"));
        assert_eq!(
            job.destination_path(".csv"),
            PathBuf::from("/data/2000-ExportacionesPais/2000-02-ExportacionesPais.csv")
        );
    }

    #[test]
    fn month_labels_follow_calendar_order() {
        let labels: Vec<_> = PeriodKey::months_of(2010).map(PeriodKey::month_label).collect();
        assert_eq!(labels.first(), Some(&"Enero"));
        assert_eq!(labels.last(), Some(&"Diciembre"));
        assert_eq!(labels.len(), 12);
    }

    #[test]
    fn year_range_is_half_open() {
        let range = YearRange::new(1995, 2025);
        assert!(range.contains(1995));
        assert!(range.contains(2024));
        assert!(!range.contains(2025));
        assert_eq!(range.years().count(), 30);
    }

    proptest! {
        #[test]
        fn date_range_spans_the_whole_month(year in 1990i32..2100, month in 1u32..=12) {
            let period = PeriodKey::new(year, month).unwrap();
            let (first, last) = period.date_range();
            prop_assert_eq!(first.format("%d").to_string(), "01");
            prop_assert!(last >= first);
            prop_assert_eq!(last.succ_opt().unwrap().format("%d").to_string(), "01");
        }
    }
}
