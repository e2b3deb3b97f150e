//! Data model for the NEB index pipeline.
//!
//! Raw source tables arrive in long form (one value per region, year and
//! metric) and are pivoted into polars frames before joining. Everything
//! downstream of the joiner works on frames; callers get typed
//! [`IndexedRow`]s back.

use crate::error::{NebError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// Column names shared by every stage.
pub mod columns {
    pub const REGION_KEY: &str = "region_key";
    pub const PERIOD: &str = "period";
    pub const REGION: &str = "region";

    pub const BA: &str = "ba";
    pub const BF: &str = "bf";
    pub const AVG_SPEED_ANNUAL: &str = "avg_speed_annual";
    pub const BF_MARCH_SHIFT: &str = "bf_march_shift";
    pub const FIRMS: &str = "firms";
    pub const POPULATION: &str = "population";

    pub const VELOCITY: &str = "velocity";
    pub const ACTUALIZATION: &str = "actualization";
    pub const BF_PER_CAPITA: &str = "bf_per_capita";
    pub const NEWNESS: &str = "newness";

    pub const INDEX: &str = "index";
    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const TYPE: &str = "type";

    pub const NORMALIZED_SUFFIX: &str = "_normalized";
}

/// Last year (inclusive) of the historical slice used for calibration.
pub const REFERENCE_CUTOFF_YEAR: i32 = 2017;

/// Year whose mean defines each variable's reference value.
pub const REFERENCE_BASE_YEAR: i32 = 2005;

/// First year reported in the shaped output.
pub const OUTPUT_START_YEAR: i32 = 2005;

/// Tag written into both `category` and `type`.
pub const TOTAL_TAG: &str = "Total";

/// Indicators reported per row, in output order.
pub const INDICATORS: [&str; 4] = [
    columns::ACTUALIZATION,
    columns::BF_PER_CAPITA,
    columns::VELOCITY,
    columns::NEWNESS,
];

/// Geographic aggregation level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Us,
    State,
    County,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Us => "us",
            Granularity::State => "state",
            Granularity::County => "county",
        }
    }

    /// Fixed width of a formatted region key.
    pub fn key_width(&self) -> usize {
        match self {
            Granularity::Us | Granularity::State => 2,
            Granularity::County => 5,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four statistical sources feeding one granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTable {
    /// Business formation statistics, annualized. Primary table of the join.
    Bfs,
    /// Business formation statistics, march-shifted.
    BfsMarchShift,
    /// Business dynamics statistics firm counts.
    Bds,
    /// Population estimates.
    Pep,
}

impl SourceTable {
    pub fn file_stem(&self, granularity: Granularity) -> String {
        let prefix = match self {
            SourceTable::Bfs => "bfs",
            SourceTable::BfsMarchShift => "bfs_march",
            SourceTable::Bds => "bds",
            SourceTable::Pep => "pep",
        };
        format!("{}_{}", prefix, granularity)
    }

    pub fn metric_columns(&self) -> &'static [&'static str] {
        match self {
            SourceTable::Bfs => &[columns::BA, columns::BF, columns::AVG_SPEED_ANNUAL],
            SourceTable::BfsMarchShift => &[columns::BF_MARCH_SHIFT],
            SourceTable::Bds => &[columns::FIRMS],
            SourceTable::Pep => &[columns::POPULATION],
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceTable::Bfs => "bfs",
            SourceTable::BfsMarchShift => "bfs_march_shift",
            SourceTable::Bds => "bds",
            SourceTable::Pep => "pep",
        };
        f.write_str(name)
    }
}

/// One observation of one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSeriesRow {
    pub region_key: String,
    pub period: i32,
    pub metric_name: String,
    pub value: Option<f64>,
}

/// A raw source table in long form, plus optional region name labels.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub source: SourceTable,
    pub rows: Vec<RawSeriesRow>,
    pub labels: HashMap<String, String>,
}

impl RawTable {
    pub fn new(source: SourceTable) -> Self {
        Self {
            source,
            rows: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn push(&mut self, region_key: &str, period: i32, metric_name: &str, value: Option<f64>) {
        self.rows.push(RawSeriesRow {
            region_key: region_key.to_string(),
            period,
            metric_name: metric_name.to_string(),
            value,
        });
    }

    /// Builder form of [`RawTable::push`].
    pub fn with(mut self, region_key: &str, period: i32, metric_name: &str, value: f64) -> Self {
        self.push(region_key, period, metric_name, Some(value));
        self
    }

    pub fn label(&mut self, region_key: &str, name: &str) {
        self.labels.insert(region_key.to_string(), name.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pivot into a wide frame: `region_key`, `period`, `region` and one
    /// Float64 column per metric of this source. Keys keep first-seen order.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let metrics = self.source.metric_columns();
        let mut positions: HashMap<(String, i32), usize> = HashMap::new();
        let mut keys: Vec<(String, i32)> = Vec::new();
        let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); metrics.len()];

        for row in &self.rows {
            let slot = metrics
                .iter()
                .position(|m| *m == row.metric_name)
                .ok_or_else(|| {
                    NebError::Source(format!(
                        "{} has no metric '{}'",
                        self.source, row.metric_name
                    ))
                })?;

            let key = (row.region_key.clone(), row.period);
            let idx = match positions.get(&key) {
                Some(&idx) => idx,
                None => {
                    let idx = keys.len();
                    positions.insert(key.clone(), idx);
                    keys.push(key);
                    for column in values.iter_mut() {
                        column.push(None);
                    }
                    idx
                }
            };

            if values[slot][idx].is_some() {
                warn!(
                    source = %self.source,
                    region_key = %row.region_key,
                    period = row.period,
                    metric = %row.metric_name,
                    "duplicate observation, keeping the last one"
                );
            }
            values[slot][idx] = row.value;
        }

        let region_keys: Vec<String> = keys.iter().map(|(k, _)| k.clone()).collect();
        let periods: Vec<i32> = keys.iter().map(|(_, p)| *p).collect();
        let names: Vec<Option<String>> = region_keys
            .iter()
            .map(|k| self.labels.get(k).cloned())
            .collect();

        let mut series = vec![
            Series::new(columns::REGION_KEY, region_keys),
            Series::new(columns::PERIOD, periods),
            Series::new(columns::REGION, names),
        ];
        for (metric, column) in metrics.iter().zip(values) {
            series.push(Series::new(metric, column));
        }

        Ok(DataFrame::new(series)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    /// Higher raw values score higher.
    Pos,
    /// Higher raw values score lower.
    Neg,
}

/// Calibrated goalposts for one index variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexVariableSpec {
    pub name: String,
    pub polarity: Polarity,
    pub reference_value: f64,
    pub half_spread: f64,
}

impl IndexVariableSpec {
    /// Fails with `DegenerateReferenceWindow` when the spread is zero or
    /// not finite, since every normalized score would be undefined.
    pub fn new(name: &str, polarity: Polarity, reference_value: f64, half_spread: f64) -> Result<Self> {
        if half_spread == 0.0 || !half_spread.is_finite() {
            return Err(NebError::DegenerateReferenceWindow {
                variable: name.to_string(),
                half_spread,
            });
        }
        Ok(Self {
            name: name.to_string(),
            polarity,
            reference_value,
            half_spread,
        })
    }

    pub fn normalized_column(&self) -> String {
        format!("{}{}", self.name, columns::NORMALIZED_SUFFIX)
    }
}

/// The variables entering the index and their polarities.
pub const INDEX_VARIABLES: [(&str, Polarity); 2] = [
    (columns::VELOCITY, Polarity::Neg),
    (columns::ACTUALIZATION, Polarity::Pos),
];

/// Ordered set of calibrated index variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexVariables {
    specs: Vec<IndexVariableSpec>,
}

impl IndexVariables {
    pub fn new(specs: Vec<IndexVariableSpec>) -> Self {
        Self { specs }
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexVariableSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&IndexVariableSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn normalized_columns(&self) -> Vec<String> {
        self.specs.iter().map(|s| s.normalized_column()).collect()
    }
}

/// Final output row for one region and year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRow {
    pub region_key: String,
    pub name: Option<String>,
    pub demographic_type: String,
    pub category: String,
    pub period: i32,
    pub actualization: Option<f64>,
    pub bf_per_capita: Option<f64>,
    pub velocity: Option<f64>,
    pub newness: Option<f64>,
    pub velocity_normalized: Option<f64>,
    pub actualization_normalized: Option<f64>,
    pub index: Option<f64>,
}

impl IndexedRow {
    /// Value of a reported indicator (or `index`) by column name.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        match name {
            columns::ACTUALIZATION => self.actualization,
            columns::BF_PER_CAPITA => self.bf_per_capita,
            columns::VELOCITY => self.velocity,
            columns::NEWNESS => self.newness,
            columns::INDEX => self.index,
            _ => None,
        }
    }

    /// Read rows out of a shaped frame.
    pub fn from_frame(df: &DataFrame) -> Result<Vec<IndexedRow>> {
        let region_keys = str_column(df, columns::REGION_KEY)?;
        let names = str_column(df, columns::NAME)?;
        let types = str_column(df, columns::TYPE)?;
        let categories = str_column(df, columns::CATEGORY)?;
        let periods = column(df, columns::PERIOD)?.i32()?;
        let actualization = f64_column(df, columns::ACTUALIZATION)?;
        let bf_per_capita = f64_column(df, columns::BF_PER_CAPITA)?;
        let velocity = f64_column(df, columns::VELOCITY)?;
        let newness = f64_column(df, columns::NEWNESS)?;
        let velocity_normalized = f64_column(df, &format!("{}{}", columns::VELOCITY, columns::NORMALIZED_SUFFIX))?;
        let actualization_normalized = f64_column(df, &format!("{}{}", columns::ACTUALIZATION, columns::NORMALIZED_SUFFIX))?;
        let index = f64_column(df, columns::INDEX)?;

        let mut rows = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            let period = periods
                .get(i)
                .ok_or_else(|| NebError::Source(format!("row {} has no period", i)))?;
            rows.push(IndexedRow {
                region_key: region_keys.get(i).unwrap_or_default().to_string(),
                name: names.get(i).map(str::to_string),
                demographic_type: types.get(i).unwrap_or(TOTAL_TAG).to_string(),
                category: categories.get(i).unwrap_or(TOTAL_TAG).to_string(),
                period,
                actualization: actualization.get(i),
                bf_per_capita: bf_per_capita.get(i),
                velocity: velocity.get(i),
                newness: newness.get(i),
                velocity_normalized: velocity_normalized.get(i),
                actualization_normalized: actualization_normalized.get(i),
                index: index.get(i),
            });
        }
        Ok(rows)
    }
}

pub(crate) fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map_err(|_| NebError::MissingColumn(name.to_string()))
}

pub(crate) fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked> {
    Ok(column(df, name)?.f64()?)
}

pub(crate) fn str_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a StringChunked> {
    Ok(column(df, name)?.str()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_frame_pivots_metrics_by_key() {
        let mut table = RawTable::new(SourceTable::Bfs)
            .with("01", 2010, columns::BA, 100.0)
            .with("01", 2010, columns::BF, 20.0)
            .with("02", 2010, columns::BA, 50.0);
        table.label("01", "Alabama");

        let df = table.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(
            df.get_column_names(),
            &["region_key", "period", "region", "ba", "bf", "avg_speed_annual"]
        );

        let bf = df.column("bf").unwrap().f64().unwrap();
        assert_eq!(bf.get(0), Some(20.0));
        assert_eq!(bf.get(1), None);

        let region = df.column("region").unwrap().str().unwrap();
        assert_eq!(region.get(0), Some("Alabama"));
        assert_eq!(region.get(1), None);
    }

    #[test]
    fn test_to_frame_rejects_foreign_metric() {
        let table = RawTable::new(SourceTable::Pep).with("01", 2010, columns::FIRMS, 3.0);
        assert!(matches!(table.to_frame(), Err(NebError::Source(_))));
    }

    #[test]
    fn test_zero_half_spread_is_degenerate() {
        let err = IndexVariableSpec::new("velocity", Polarity::Neg, 4.0, 0.0).unwrap_err();
        assert!(matches!(err, NebError::DegenerateReferenceWindow { .. }));
        assert!(IndexVariableSpec::new("velocity", Polarity::Neg, 4.0, f64::NAN).is_err());
    }

    #[test]
    fn test_file_stems() {
        assert_eq!(SourceTable::BfsMarchShift.file_stem(Granularity::State), "bfs_march_state");
        assert_eq!(SourceTable::Pep.file_stem(Granularity::Us), "pep_us");
    }
}
