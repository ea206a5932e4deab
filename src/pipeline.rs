// src/pipeline.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fs,
    io::BufWriter,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::archive::{extract_bundle, ExtractReport};
use crate::cancel::CancelToken;
use crate::config::{Config, SegmentMatch};
use crate::geo::{FilterOutcome, GeoFilter};
use crate::metadata::{MetadataResolver, MetadataTree, MissCounts};
use crate::output::{AssemblyStats, NdjsonWriter, RecordAssembler};
use crate::query::{JoinQueryBuilder, PaginatedQueryExecutor, SegmentCatalog};
use crate::segment::{self, SegmentsReport};
use crate::store::{load_tables, prepare_schema, CensusStore, LoadReport};

/// What the export stage produced.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output: PathBuf,
    pub total_row_estimate: u64,
    pub rows: u64,
    pub chunks: u64,
    pub segments_joined: usize,
    pub segments_skipped: Vec<usize>,
    pub variables: usize,
    pub assembly: AssemblyStats,
    pub misses: MissCounts,
}

/// Summary of one pipeline run, written next to the data as `run_report.json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub summary_level: String,
    pub segment_match: SegmentMatch,
    pub archive: Option<ExtractReport>,
    pub filter: FilterOutcome,
    pub segments: Option<SegmentsReport>,
    pub load: Option<LoadReport>,
    pub export: Option<ExportReport>,
}

/// Run every stage against `store`: unpack, filter the header, extract
/// segments, load, then export the joined rows as NDJSON.
///
/// Each stage skips work an earlier run already finished, so rerunning after
/// a failure picks up where it stopped.
#[instrument(level = "info", skip_all, fields(work_dir = %cfg.work_dir.display()))]
pub fn run<S: CensusStore>(cfg: &Config, store: &S, cancel: &CancelToken) -> Result<RunReport> {
    let started = Utc::now();
    cfg.validate()?;
    let resolver = MetadataResolver::new(MetadataTree::load(&cfg.metadata)?);

    // ─── 1) unpack ──────────────────────────────────────────────────
    let archive = match &cfg.archive {
        Some(zip) => Some(
            extract_bundle(zip, &cfg.work_dir, cfg.segment_count + 1)
                .with_context(|| format!("unpacking {}", zip.display()))?,
        ),
        None => None,
    };

    // ─── 2) filter the geographic header ────────────────────────────
    let filter = GeoFilter::new(&cfg.summary_level)
        .collect_ids(cfg.segment_match == SegmentMatch::Exact)
        .filter_file(cfg.geo_input(), cfg.geo_filtered(), cancel)
        .context("filtering the geographic header")?;

    let mut report = RunReport {
        started,
        finished: started,
        summary_level: cfg.summary_level.clone(),
        segment_match: cfg.segment_match,
        archive,
        filter,
        segments: None,
        load: None,
        export: None,
    };

    // ─── 3) extract segment records ─────────────────────────────────
    report.segments = segment::extract_all(cfg, &report.filter, cancel)
        .context("extracting segment records")?;

    if report.segments.is_none() {
        warn!(
            summary_level = %cfg.summary_level,
            "no geography at this summary level; writing an empty output"
        );
        write_atomically(&cfg.output_path(), |_| Ok(()))?;
    } else {
        // ─── 4) load tables ─────────────────────────────────────────
        prepare_schema(store, cfg).context("creating census tables")?;
        report.load = Some(load_tables(store, cfg, cancel).context("loading census tables")?);

        // ─── 5) join, label and write ───────────────────────────────
        report.export = Some(export(store, cfg, &resolver, cancel)?);
    }

    report.finished = Utc::now();
    write_report(&cfg.report_path(), &report)?;
    info!(
        elapsed_ms = (report.finished - report.started).num_milliseconds(),
        "run complete"
    );
    Ok(report)
}

/// Page through the join and write one labelled record per variable.
#[instrument(level = "info", skip_all)]
pub fn export<S: CensusStore>(
    store: &S,
    cfg: &Config,
    resolver: &MetadataResolver,
    cancel: &CancelToken,
) -> Result<ExportReport> {
    let catalog = SegmentCatalog::discover(store, cfg).context("listing segment tables")?;
    let query = JoinQueryBuilder::from_config(cfg).build(&catalog);
    let exec = PaginatedQueryExecutor::new(store, cfg.chunk_size, cancel.clone());
    let total = exec
        .estimate_rows(&query)
        .context("counting joined rows")?;
    info!(total, chunk_size = cfg.chunk_size, "exporting joined rows");

    let assembler = RecordAssembler::new(resolver);
    let output = cfg.output_path();
    let (rows, chunks) = write_atomically(&output, |file| {
        let mut writer = NdjsonWriter::new(BufWriter::new(file));
        let mut pages = exec.run(&query, total);
        let mut rows = 0u64;
        for row in pages.by_ref() {
            let row = row?;
            rows += 1;
            for record in assembler.assemble(&row) {
                writer.write(&record)?;
            }
        }
        writer.into_inner()?;
        Ok((rows, pages.chunks()))
    })
    .with_context(|| format!("writing {}", output.display()))?;

    let report = ExportReport {
        output,
        total_row_estimate: total,
        rows,
        chunks,
        segments_joined: catalog.segments.len(),
        segments_skipped: catalog.skipped.clone(),
        variables: catalog.variable_count(),
        assembly: assembler.stats(),
        misses: resolver.misses(),
    };
    info!(
        rows = report.rows,
        emitted = report.assembly.emitted,
        skipped = report.assembly.unresolved,
        unknown_tables = report.misses.unknown_table,
        unknown_labels = report.misses.unknown_label,
        "export done"
    );
    Ok(report)
}

/// Write `path` through a temp file in the same directory, so a cancelled or
/// failed run never leaves a partial file behind.
fn write_atomically<T>(
    path: &Path,
    body: impl FnOnce(&fs::File) -> crate::error::Result<T>,
) -> Result<T> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let tmp = NamedTempFile::new_in(dir)?;
    let value = body(tmp.as_file())?;
    tmp.persist(path)
        .with_context(|| format!("moving output into {}", path.display()))?;
    Ok(value)
}

fn write_report(path: &Path, report: &RunReport) -> Result<()> {
    write_atomically(path, |file| {
        serde_json::to_writer_pretty(file, report)?;
        Ok(())
    })
    .context("writing run report")
}
