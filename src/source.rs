//! Raw Table Sources - where the four input tables come from
//!
//! The pipeline does not care whether a table was fetched or read from a
//! cache; it only sees [`RawTable`]s. Cached tables are CSV files named
//! after the source and granularity, e.g. `bfs_state.csv`.

use crate::error::{NebError, Result};
use crate::model::{Granularity, RawTable, SourceTable};
use crate::pipeline::SourceTables;
use csv::ReaderBuilder;
use std::path::{Path, PathBuf};
use tracing::info;

const KEY_COLUMN: &str = "fips";
const PERIOD_COLUMN: &str = "time";
const LABEL_COLUMN: &str = "region";

/// Provider of raw source tables.
pub trait RawTableSource {
    fn load(&self, source: SourceTable, granularity: Granularity) -> Result<RawTable>;

    /// Source type (e.g., "csv")
    fn source_type(&self) -> &str;
}

impl SourceTables {
    pub fn load(source: &dyn RawTableSource, granularity: Granularity) -> Result<Self> {
        Ok(Self {
            bfs: source.load(SourceTable::Bfs, granularity)?,
            bfs_march_shift: source.load(SourceTable::BfsMarchShift, granularity)?,
            bds: source.load(SourceTable::Bds, granularity)?,
            pep: source.load(SourceTable::Pep, granularity)?,
        })
    }
}

/// Reads cached raw tables from a directory of CSV files.
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, source: SourceTable, granularity: Granularity) -> PathBuf {
        self.dir.join(format!("{}.csv", source.file_stem(granularity)))
    }

    fn parse_value(cell: &str, path: &Path, line: u64, column: &str) -> Result<Option<f64>> {
        let trimmed = cell.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Ok(None);
        }
        trimmed
            .parse::<f64>()
            .map(Some)
            .map_err(|e| {
                NebError::Source(format!(
                    "{}:{}: column '{}' value '{}': {}",
                    path.display(),
                    line,
                    column,
                    trimmed,
                    e
                ))
            })
    }

    /// Numeric region codes lose their leading zeros so `"01"` and `"1"`
    /// join as the same region. Other keys are kept as written.
    pub fn canonical_key(cell: &str) -> String {
        let trimmed = cell.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = trimmed.trim_start_matches('0');
            if stripped.is_empty() {
                "0".to_string()
            } else {
                stripped.to_string()
            }
        } else {
            trimmed.to_string()
        }
    }

    fn parse_period(cell: &str, path: &Path, line: u64) -> Result<i32> {
        let trimmed = cell.trim();
        if let Ok(year) = trimmed.parse::<i32>() {
            return Ok(year);
        }
        match trimmed.parse::<f64>() {
            Ok(year) if year.fract() == 0.0 => Ok(year as i32),
            _ => Err(NebError::Source(format!(
                "{}:{}: invalid {} '{}'",
                path.display(),
                line,
                PERIOD_COLUMN,
                trimmed
            ))),
        }
    }

    /// Parse one wide CSV table into long rows.
    pub fn read_table(path: &Path, source: SourceTable, csv_text: &str) -> Result<RawTable> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_text.as_bytes());

        let headers = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect::<Vec<_>>();
        let position = |name: &str| headers.iter().position(|h| h == name);
        let require = |name: &str| {
            position(name).ok_or_else(|| {
                NebError::Source(format!("{}: missing column '{}'", path.display(), name))
            })
        };

        let key_idx = require(KEY_COLUMN)?;
        let period_idx = require(PERIOD_COLUMN)?;
        let label_idx = position(LABEL_COLUMN);
        let metric_idx = source
            .metric_columns()
            .iter()
            .map(|m| require(*m).map(|idx| (*m, idx)))
            .collect::<Result<Vec<_>>>()?;

        let mut table = RawTable::new(source);
        for (i, record) in rdr.records().enumerate() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(i as u64 + 2);

            let key = Self::canonical_key(record.get(key_idx).unwrap_or(""));
            if key.is_empty() {
                return Err(NebError::Source(format!(
                    "{}:{}: empty {}",
                    path.display(),
                    line,
                    KEY_COLUMN
                )));
            }
            let period = Self::parse_period(record.get(period_idx).unwrap_or(""), path, line)?;

            if let Some(label) = label_idx.and_then(|idx| record.get(idx)) {
                if !label.trim().is_empty() {
                    table.label(&key, label.trim());
                }
            }

            for (metric, idx) in &metric_idx {
                let value = Self::parse_value(record.get(*idx).unwrap_or(""), path, line, metric)?;
                table.push(&key, period, metric, value);
            }
        }

        Ok(table)
    }
}

impl RawTableSource for CsvDirectorySource {
    fn load(&self, source: SourceTable, granularity: Granularity) -> Result<RawTable> {
        let path = self.path_for(source, granularity);
        let csv_text = std::fs::read_to_string(&path)?;
        let table = Self::read_table(&path, source, &csv_text)?;
        info!(
            path = %path.display(),
            rows = table.rows.len(),
            "loaded raw table"
        );
        Ok(table)
    }

    fn source_type(&self) -> &str {
        "csv"
    }
}
