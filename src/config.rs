// src/config.rs

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{PipelineError, Result};

/// How segment records are matched against the filtered geography header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentMatch {
    /// Keep every record whose id lies numerically within `[min_id, max_id]`.
    #[default]
    Range,
    /// Keep only records whose id was seen in the filtered header.
    Exact,
}

impl std::str::FromStr for SegmentMatch {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "range" => Ok(SegmentMatch::Range),
            "exact" => Ok(SegmentMatch::Exact),
            other => Err(PipelineError::Config(format!(
                "segment_match must be `range` or `exact`, got `{}`",
                other
            ))),
        }
    }
}

/// Run configuration, read from YAML and validated once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub work_dir: PathBuf,
    #[serde(default)]
    pub archive: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(default = "default_year")]
    pub year: u16,
    #[serde(default = "default_summary_level")]
    pub summary_level: String,
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,
    #[serde(default)]
    pub segment_match: SegmentMatch,
    #[serde(default)]
    pub assume_sorted: bool,
    #[serde(default)]
    pub database: Option<PathBuf>,
    #[serde(default)]
    pub schema_script: Option<PathBuf>,
    pub metadata: PathBuf,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_file_prefix() -> String {
    "us".into()
}
fn default_dataset() -> String {
    "sf1".into()
}
fn default_year() -> u16 {
    2010
}
fn default_summary_level() -> String {
    "880".into()
}
fn default_segment_count() -> usize {
    47
}
fn default_chunk_size() -> usize {
    5000
}

impl Config {
    /// A configuration with every optional field at its default.
    pub fn new(work_dir: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            archive: None,
            file_prefix: default_file_prefix(),
            dataset: default_dataset(),
            year: default_year(),
            summary_level: default_summary_level(),
            segment_count: default_segment_count(),
            segment_match: SegmentMatch::default(),
            assume_sorted: false,
            database: None,
            schema_script: None,
            metadata: metadata.into(),
            output: None,
            chunk_size: default_chunk_size(),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(PipelineError::Config(msg));

        if self.work_dir.as_os_str().is_empty() {
            return bad("work_dir must be set".into());
        }
        if self.summary_level.len() != 3 || !self.summary_level.bytes().all(|b| b.is_ascii_digit())
        {
            return bad(format!(
                "summary_level must be 3 digits, got `{}`",
                self.summary_level
            ));
        }
        if !(1..=99).contains(&self.segment_count) {
            return bad(format!(
                "segment_count must be within 1..=99, got {}",
                self.segment_count
            ));
        }
        if self.chunk_size == 0 {
            return bad("chunk_size must be greater than zero".into());
        }
        if !(1000..=9999).contains(&self.year) {
            return bad(format!("year must have 4 digits, got {}", self.year));
        }
        let ident_ok = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());
        if !ident_ok(&self.file_prefix) || !ident_ok(&self.dataset) {
            return bad("file_prefix and dataset must be non-empty and alphanumeric".into());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| self.work_dir.join("census.duckdb"))
    }

    pub fn output_path(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.work_dir.join("census.json"))
    }

    /// Raw geographic header, e.g. `usgeo2010.sf1`.
    pub fn geo_input(&self) -> PathBuf {
        self.work_dir
            .join(format!("{}geo{}.{}", self.file_prefix, self.year, self.dataset))
    }

    /// Filtered geographic header, e.g. `usgeo2010.csv`.
    pub fn geo_filtered(&self) -> PathBuf {
        self.work_dir
            .join(format!("{}geo{}.csv", self.file_prefix, self.year))
    }

    /// Raw segment file for 1-based `segment`, e.g. `us000012010.sf1`.
    pub fn segment_input(&self, segment: usize) -> PathBuf {
        self.work_dir.join(format!(
            "{}000{:02}{}.{}",
            self.file_prefix, segment, self.year, self.dataset
        ))
    }

    /// Filtered segment file, e.g. `us000012010.cs1`.
    pub fn segment_filtered(&self, segment: usize) -> PathBuf {
        self.work_dir.join(format!(
            "{}000{:02}{}.cs1",
            self.file_prefix, segment, self.year
        ))
    }

    pub fn geo_table(&self) -> String {
        format!("geo{}", self.year)
    }

    pub fn segment_table(&self, segment: usize) -> String {
        format!("{}_{:02}", self.dataset, segment)
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join("run_report.json")
    }
}
