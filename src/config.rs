//! Runtime I/O configuration.
//!
//! Only file locations are configurable. Precedence, lowest first:
//! defaults, environment (`.env` is loaded if present), explicit overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const RAW_DATA_DIR_ENV: &str = "NEB_RAW_DATA_DIR";
pub const OUTPUT_DIR_ENV: &str = "NEB_OUTPUT_DIR";
pub const MIRROR_DIR_ENV: &str = "NEB_MIRROR_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory holding the cached raw tables (`bfs_state.csv`, ...)
    pub raw_data_dir: PathBuf,
    /// Directory the output files are written to
    pub output_dir: PathBuf,
    /// Optional second directory receiving a copy of every output file
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            raw_data_dir: PathBuf::from("data/raw_data"),
            output_dir: PathBuf::from("data"),
            mirror_dir: None,
        }
    }
}

impl RunConfig {
    /// Defaults overlaid with `NEB_*` environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            raw_data_dir: non_empty(RAW_DATA_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.raw_data_dir),
            output_dir: non_empty(OUTPUT_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            mirror_dir: non_empty(MIRROR_DIR_ENV).map(PathBuf::from),
        }
    }

    /// Apply explicit (e.g. command line) overrides.
    pub fn with_overrides(
        mut self,
        raw_data_dir: Option<PathBuf>,
        output_dir: Option<PathBuf>,
        mirror_dir: Option<PathBuf>,
    ) -> Self {
        if let Some(dir) = raw_data_dir {
            self.raw_data_dir = dir;
        }
        if let Some(dir) = output_dir {
            self.output_dir = dir;
        }
        if mirror_dir.is_some() {
            self.mirror_dir = mirror_dir;
        }
        self
    }
}
