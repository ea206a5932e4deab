// src/store/load.rs

use serde::Serialize;
use std::fs;
use tracing::{info, instrument, warn};

use super::{geo_table_ddl, CensusStore, LoadFormat, LoadSpec};
use crate::cancel::CancelToken;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::utils::is_non_empty;

/// What happened to one table during a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "rows")]
pub enum TableLoad {
    Loaded(u64),
    /// Already populated by an earlier run.
    Resumed(u64),
    /// Filtered input file missing or empty; table left as is.
    MissingFile,
    /// The schema has no such table.
    MissingTable,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub geo: TableLoad,
    pub segments: Vec<(usize, TableLoad)>,
}

impl LoadReport {
    pub fn missing_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|(_, l)| matches!(l, TableLoad::MissingFile | TableLoad::MissingTable))
            .count()
    }
}

/// Create the schema: the configured DDL script if any, otherwise just the
/// geography table (segment schemas only come from the script).
///
/// The script is only run against a store that has none of the census tables
/// yet, so plain `CREATE TABLE` scripts survive a rerun.
pub fn prepare_schema<S: CensusStore>(store: &S, cfg: &Config) -> Result<()> {
    match &cfg.schema_script {
        Some(path) => {
            if let Some(table) = existing_census_table(store, cfg)? {
                info!(table = %table, "census tables already created; not rerunning the schema script");
                return Ok(());
            }
            let sql = fs::read_to_string(path).map_err(|e| {
                PipelineError::Store(format!("reading schema script {}: {}", path.display(), e))
            })?;
            info!(script = %path.display(), "creating census tables");
            store.execute_script(&sql)
        }
        None => store.execute_script(&geo_table_ddl(&cfg.geo_table())),
    }
}

fn existing_census_table<S: CensusStore>(store: &S, cfg: &Config) -> Result<Option<String>> {
    let tables = std::iter::once(cfg.geo_table())
        .chain((1..=cfg.segment_count).map(|n| cfg.segment_table(n)));
    for table in tables {
        if !store.table_columns(&table)?.is_empty() {
            return Ok(Some(table));
        }
    }
    Ok(None)
}

/// Load the filtered header and every filtered segment file.
///
/// A table that already has rows is skipped; there is no atomicity across
/// tables, so an interrupted run resumes here table by table.
#[instrument(level = "info", skip_all)]
pub fn load_tables<S: CensusStore>(
    store: &S,
    cfg: &Config,
    cancel: &CancelToken,
) -> Result<LoadReport> {
    let geo_spec = LoadSpec {
        table: cfg.geo_table(),
        path: cfg.geo_filtered(),
        format: LoadFormat::FixedWidth,
    };
    if !is_non_empty(&geo_spec.path) {
        return Err(PipelineError::EmptyInput {
            path: geo_spec.path,
        });
    }
    let geo = load_one(store, &geo_spec)?;
    if geo == TableLoad::MissingTable {
        return Err(PipelineError::Store(format!(
            "table {} does not exist",
            geo_spec.table
        )));
    }

    let mut segments = Vec::with_capacity(cfg.segment_count);
    for segment in 1..=cfg.segment_count {
        cancel.check()?;
        let spec = LoadSpec {
            table: cfg.segment_table(segment),
            path: cfg.segment_filtered(segment),
            format: LoadFormat::Delimited { delimiter: b',' },
        };
        segments.push((segment, load_one(store, &spec)?));
    }

    let report = LoadReport { geo, segments };
    info!(missing = report.missing_segments(), "table loading done");
    Ok(report)
}

fn load_one<S: CensusStore>(store: &S, spec: &LoadSpec) -> Result<TableLoad> {
    if store.table_columns(&spec.table)?.is_empty() {
        warn!(table = %spec.table, "table not in schema; skipping");
        return Ok(TableLoad::MissingTable);
    }
    let existing = store.row_count(&spec.table)?;
    if existing > 0 {
        info!(table = %spec.table, rows = existing, "already loaded; skipping");
        return Ok(TableLoad::Resumed(existing));
    }
    if !is_non_empty(&spec.path) {
        warn!(table = %spec.table, path = %spec.path.display(), "file doesn't exist; skipping table");
        return Ok(TableLoad::MissingFile);
    }
    Ok(TableLoad::Loaded(store.bulk_load(spec)?))
}
