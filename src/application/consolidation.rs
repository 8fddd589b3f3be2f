//! Consolidation of harvested per-month files into one table per dimension
//!
//! Category-style reports export a small preamble followed by a
//! `SubCategoria,Year,Valor` table; the country report exports two title
//! lines followed by a fixed six-column table. Each valid file contributes
//! its rows, tagged with the year and month taken from its canonical name.
//! Invalid files are logged and skipped, never fatal.

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{year_directory, Dimension, YearRange};

/// Header of category-style tables
pub const CATEGORY_HEADER: [&str; 3] = ["SubCategoria", "Year", "Valor"];

/// Header of the country table, after the two title lines
pub const COUNTRY_HEADER: [&str; 6] = [
    "NombrePais",
    "textbox11",
    "Categoria",
    "textbox14",
    "Clase",
    "textbox17",
];

/// Title lines preceding the country header
const COUNTRY_SKIP_LINES: usize = 2;

/// Years scanned for harvested folders
pub const DEFAULT_SCAN_YEARS: YearRange = YearRange::new(1995, 2026);

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

lazy_static! {
    static ref PERIOD_PREFIX: Option<Regex> = Regex::new(r"^(\d{4})-(\d{1,2})-").ok();
}

/// Why one harvested file was left out of a consolidated table
#[derive(Error, Debug)]
pub enum FileRejection {
    #[error("file name does not start with YYYY-MM-")]
    UnnamedPeriod,

    #[error("header {expected:?} not found")]
    MissingHeader { expected: Vec<&'static str> },

    #[error("no valid data rows")]
    NoRows,

    #[error("value '{value}' is not a number")]
    BadNumber { value: String },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One consolidated category-style row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
    #[serde(rename = "SubCategoria")]
    pub sub_category: String,
    #[serde(rename = "Year")]
    pub year: String,
    #[serde(rename = "Valor")]
    pub value: f64,
    #[serde(rename = "AñoArchivo")]
    pub file_year: i32,
    #[serde(rename = "Mes")]
    pub file_month: u32,
}

/// One consolidated country row, with the report's textbox columns renamed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRow {
    #[serde(rename = "NombrePais")]
    pub country: String,
    #[serde(rename = "Total_Pais_Mes")]
    pub country_total: f64,
    #[serde(rename = "Categoria")]
    pub category: String,
    #[serde(rename = "Total_Categoria_Mes")]
    pub category_total: f64,
    #[serde(rename = "Clase")]
    pub class: String,
    #[serde(rename = "Litros 40 % Alc. Vol")]
    pub liters_40_abv: f64,
    #[serde(rename = "AñoArchivo")]
    pub file_year: i32,
    #[serde(rename = "Mes")]
    pub file_month: u32,
}

/// Result of consolidating one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidationSummary {
    pub dimension: Dimension,
    pub output_path: PathBuf,
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_written: usize,
}

/// `(year, month)` from a `YYYY-MM-...` file name
pub fn period_from_file_name(file_name: &str) -> Option<(i32, u32)> {
    let captures = PERIOD_PREFIX.as_ref()?.captures(file_name)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    Some((year, month))
}

/// Strip thousands separators and parse
fn parse_amount(raw: &str) -> Result<f64, FileRejection> {
    let cleaned = raw.replace(',', "");
    cleaned.trim().parse().map_err(|_| FileRejection::BadNumber {
        value: raw.to_string(),
    })
}

/// Parse one category-style export.
///
/// Blank lines and `#` comments are dropped, everything before the
/// `SubCategoria,Year,Valor` header is ignored, and only records with exactly
/// three fields are kept. Rows with an empty `Valor` are dropped.
pub fn parse_category_file(content: &str, file_name: &str) -> Result<Vec<CategoryRow>, FileRejection> {
    let (file_year, file_month) = period_from_file_name(file_name).ok_or(FileRejection::UnnamedPeriod)?;

    let lines: Vec<&str> = content
        .trim_start_matches('\u{feff}')
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let header_at = lines
        .iter()
        .position(|line| line.split(',').eq(CATEGORY_HEADER))
        .ok_or_else(|| FileRejection::MissingHeader {
            expected: CATEGORY_HEADER.to_vec(),
        })?;

    let body = lines[header_at + 1..].join("\n");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    let mut saw_record = false;
    for record in reader.records() {
        let record = record?;
        if record.len() != CATEGORY_HEADER.len() {
            continue;
        }
        saw_record = true;

        let raw_value = record[2].replace(',', "");
        if raw_value.trim().is_empty() {
            continue;
        }
        rows.push(CategoryRow {
            sub_category: record[0].to_string(),
            year: record[1].to_string(),
            value: parse_amount(&raw_value)?,
            file_year,
            file_month,
        });
    }

    if !saw_record {
        return Err(FileRejection::NoRows);
    }
    Ok(rows)
}

/// Parse one country export: two title lines, then the fixed header.
/// Empty numeric cells count as zero.
pub fn parse_country_file(content: &str, file_name: &str) -> Result<Vec<CountryRow>, FileRejection> {
    let (file_year, file_month) = period_from_file_name(file_name).ok_or(FileRejection::UnnamedPeriod)?;

    let table: String = content
        .trim_start_matches('\u{feff}')
        .lines()
        .skip(COUNTRY_SKIP_LINES)
        .collect::<Vec<_>>()
        .join("\n");

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(table.as_bytes());

    let headers = reader.headers()?.clone();
    if !headers.iter().eq(COUNTRY_HEADER) {
        return Err(FileRejection::MissingHeader {
            expected: COUNTRY_HEADER.to_vec(),
        });
    }

    let amount_or_zero = |raw: &str| -> Result<f64, FileRejection> {
        if raw.replace(',', "").trim().is_empty() {
            Ok(0.0)
        } else {
            parse_amount(raw)
        }
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(CountryRow {
            country: record[0].to_string(),
            country_total: amount_or_zero(&record[1])?,
            category: record[2].to_string(),
            category_total: amount_or_zero(&record[3])?,
            class: record[4].to_string(),
            liters_40_abv: amount_or_zero(&record[5])?,
            file_year,
            file_month,
        });
    }

    if rows.is_empty() {
        return Err(FileRejection::NoRows);
    }
    Ok(rows)
}

/// Merges harvested files under a base directory
#[derive(Debug, Clone)]
pub struct ConsolidationEngine {
    base_dir: PathBuf,
    years: YearRange,
    extension: String,
}

impl ConsolidationEngine {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            years: DEFAULT_SCAN_YEARS,
            extension: ".csv".to_string(),
        }
    }

    #[must_use]
    pub const fn with_years(mut self, years: YearRange) -> Self {
        self.years = years;
        self
    }

    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// `<base>/consolidado_<name>.csv`
    pub fn output_path(&self, dimension: Dimension) -> PathBuf {
        let stem = if dimension.is_country() {
            "exportaciones_pais".to_string()
        } else {
            dimension.name().to_lowercase()
        };
        self.base_dir.join(format!("consolidado_{stem}.csv"))
    }

    /// Consolidate every dimension, skipping those without valid files
    pub fn consolidate_all(&self) -> Result<Vec<ConsolidationSummary>> {
        let mut summaries = Vec::new();
        for dimension in Dimension::CATEGORY_DIMENSIONS
            .into_iter()
            .chain([Dimension::ExportsByCountry])
        {
            if let Some(summary) = self.consolidate(dimension)? {
                summaries.push(summary);
            }
        }
        Ok(summaries)
    }

    /// Consolidate one dimension; `None` when no file was valid (nothing written)
    pub fn consolidate(&self, dimension: Dimension) -> Result<Option<ConsolidationSummary>> {
        info!("=== Consolidating {} ===", dimension);
        let files = self.harvested_files(dimension)?;

        let mut files_read = 0;
        let mut files_skipped = 0;
        let output_path = self.output_path(dimension);

        let rows_written = if dimension.is_country() {
            let rows = Self::collect(&files, parse_country_file, &mut files_read, &mut files_skipped);
            (!rows.is_empty())
                .then(|| write_with_bom(&output_path, &rows))
                .transpose()?
        } else {
            let rows = Self::collect(&files, parse_category_file, &mut files_read, &mut files_skipped);
            (!rows.is_empty())
                .then(|| write_with_bom(&output_path, &rows))
                .transpose()?
        };

        let Some(rows_written) = rows_written else {
            warn!("No valid files to consolidate for {}", dimension);
            return Ok(None);
        };

        info!("💾 Saved {:?} ({} rows from {} files)", output_path, rows_written, files_read);
        Ok(Some(ConsolidationSummary {
            dimension,
            output_path,
            files_read,
            files_skipped,
            rows_written,
        }))
    }

    /// Harvested files of a dimension, year folders ascending, names sorted
    fn harvested_files(&self, dimension: Dimension) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for year in self.years.years() {
            let dir = year_directory(&self.base_dir, dimension, year);
            if !dir.is_dir() {
                debug!("Folder not found: {:?}", dir);
                continue;
            }

            let mut year_files: Vec<PathBuf> = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to list {}", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file()
                        && path
                            .file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.ends_with(&self.extension))
                })
                .collect();
            year_files.sort();
            files.extend(year_files);
        }
        Ok(files)
    }

    fn collect<R>(
        files: &[PathBuf],
        parse: fn(&str, &str) -> Result<Vec<R>, FileRejection>,
        files_read: &mut usize,
        files_skipped: &mut usize,
    ) -> Vec<R> {
        let mut rows = Vec::new();
        for path in files {
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let parsed = std::fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|content| parse(&content, name).map_err(|e| e.to_string()));

            match parsed {
                Ok(file_rows) => {
                    debug!("Valid file {} ({} rows)", name, file_rows.len());
                    *files_read += 1;
                    rows.extend(file_rows);
                }
                Err(reason) => {
                    warn!("Skipped {:?}: {}", path, reason);
                    *files_skipped += 1;
                }
            }
        }
        rows
    }
}

/// Write rows as CSV prefixed with a UTF-8 byte order mark
fn write_with_bom<R: Serialize>(path: &Path, rows: &[R]) -> Result<usize> {
    let mut file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(UTF8_BOM)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(rows.len())
}
