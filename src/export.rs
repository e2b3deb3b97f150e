//! Output files for a finished run.
//!
//! - `neb_download.csv`: one line per indexed row
//! - `neb_website_<indicator>.csv`: one line per region, one column per year
//! - `neb_manifest.json`: run id, timing and files written
//!
//! Every file goes to the output directory and, when configured, to the
//! mirror directory as well.

use crate::error::Result;
use crate::model::{columns, IndexVariables, IndexedRow, INDICATORS, TOTAL_TAG};
use crate::pipeline::NebOutput;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

pub const DOWNLOAD_FILE: &str = "neb_download.csv";
pub const MANIFEST_FILE: &str = "neb_manifest.json";

const DOWNLOAD_HEADER: [&str; 10] = [
    "fips",
    "name",
    "type",
    "category",
    "year",
    "actualization",
    "bf_per_capita",
    "velocity",
    "newness",
    "index",
];

/// Shared cell format for every output file: shortest round-trip text,
/// whole numbers keep their `.0`, missing values are empty.
pub fn format_value(value: Option<f64>) -> String {
    value.map(|v| format!("{:?}", v)).unwrap_or_default()
}

#[derive(Debug, Serialize)]
struct DownloadRecord<'a> {
    fips: &'a str,
    name: Option<&'a str>,
    demographic_type: &'a str,
    category: &'a str,
    year: i32,
    actualization: String,
    bf_per_capita: String,
    velocity: String,
    newness: String,
    index: String,
}

impl<'a> From<&'a IndexedRow> for DownloadRecord<'a> {
    fn from(row: &'a IndexedRow) -> Self {
        Self {
            fips: &row.region_key,
            name: row.name.as_deref(),
            demographic_type: &row.demographic_type,
            category: &row.category,
            year: row.period,
            actualization: format_value(row.actualization),
            bf_per_capita: format_value(row.bf_per_capita),
            velocity: format_value(row.velocity),
            newness: format_value(row.newness),
            index: format_value(row.index),
        }
    }
}

/// Long-format download file.
pub fn download_csv<'a>(rows: impl IntoIterator<Item = &'a IndexedRow>) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(DOWNLOAD_HEADER)?;
    for row in rows {
        wtr.serialize(DownloadRecord::from(row))?;
    }
    wtr.flush()?;
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

type WideKey = (String, String, String);

/// One indicator pivoted to (region, type, category) × year. Lines with no
/// values and years with no values are left out. `Total` tags are blank.
pub fn website_csv<'a>(rows: impl IntoIterator<Item = &'a IndexedRow>, indicator: &str) -> Result<Vec<u8>> {
    let mut cells: BTreeMap<WideKey, BTreeMap<i32, (f64, u32)>> = BTreeMap::new();
    for row in rows {
        let Some(value) = row.indicator(indicator) else {
            continue;
        };
        let key = (
            row.region_key.clone(),
            row.demographic_type.clone(),
            row.category.clone(),
        );
        let cell = cells.entry(key).or_default().entry(row.period).or_insert((0.0, 0));
        cell.0 += value;
        cell.1 += 1;
    }

    let years: Vec<i32> = cells
        .values()
        .flat_map(|by_year| by_year.keys().copied())
        .sorted_unstable()
        .dedup()
        .collect();

    let blank_total = |tag: &str| if tag == TOTAL_TAG { String::new() } else { tag.to_string() };

    let mut wtr = csv::Writer::from_writer(Vec::new());
    let mut header = vec![
        "region".to_string(),
        "demographic-type".to_string(),
        "demographic".to_string(),
    ];
    header.extend(years.iter().map(|y| y.to_string()));
    wtr.write_record(&header)?;

    for ((region, demographic_type, category), by_year) in &cells {
        let mut record = vec![region.clone(), blank_total(demographic_type), blank_total(category)];
        record.extend(years.iter().map(|year| {
            by_year
                .get(year)
                .map(|(sum, count)| format_value(Some(sum / *count as f64)))
                .unwrap_or_default()
        }));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

pub fn website_file_name(indicator: &str) -> String {
    format!("neb_website_{}.csv", indicator)
}

/// Summary of one run, written next to the data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: BTreeMap<String, usize>,
    pub variables: IndexVariables,
    pub files: Vec<String>,
}

/// Writes run outputs to the output directory and an optional mirror.
pub struct NebExporter {
    output_dir: PathBuf,
    mirror_dir: Option<PathBuf>,
}

impl NebExporter {
    pub fn new(output_dir: PathBuf, mirror_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir,
            mirror_dir,
        }
    }

    fn targets(&self) -> impl Iterator<Item = &PathBuf> {
        std::iter::once(&self.output_dir).chain(self.mirror_dir.iter())
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<()> {
        for dir in self.targets() {
            fs::create_dir_all(dir)?;
            let path = dir.join(name);
            fs::write(&path, bytes)?;
            info!(path = %path.display(), bytes = bytes.len(), "wrote output file");
        }
        Ok(())
    }

    /// Write download, per-indicator and manifest files.
    pub fn write_all(&self, output: &NebOutput, started_at: DateTime<Utc>) -> Result<RunManifest> {
        let mut files = Vec::new();

        self.write_file(DOWNLOAD_FILE, &download_csv(output.rows())?)?;
        files.push(DOWNLOAD_FILE.to_string());

        for indicator in INDICATORS.iter().chain(std::iter::once(&columns::INDEX)) {
            let name = website_file_name(indicator);
            self.write_file(&name, &website_csv(output.rows(), indicator)?)?;
            files.push(name);
        }

        let mut rows = BTreeMap::new();
        rows.insert("state".to_string(), output.state.len());
        rows.insert("us".to_string(), output.us.len());

        let manifest = RunManifest {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            rows,
            variables: output.variables.clone(),
            files,
        };
        self.write_file(MANIFEST_FILE, serde_json::to_string_pretty(&manifest)?.as_bytes())?;

        Ok(manifest)
    }
}
