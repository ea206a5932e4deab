use anyhow::{bail, Context, Result};
use clap::Parser;
use sf1join::{pipeline, store::DuckStore, CancelToken, Config, SegmentMatch};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Filter, load and label an SF1 ZCTA extract as newline-delimited JSON.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// YAML run configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the raw and filtered files
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Label dictionary (JSON)
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Three-digit summary level to keep
    #[arg(long)]
    summary_level: Option<String>,

    /// Rows fetched per join query
    #[arg(long)]
    chunk_size: Option<usize>,

    /// `range` or `exact`
    #[arg(long)]
    segment_match: Option<SegmentMatch>,
}

impl Args {
    /// Config file values first, then command-line overrides.
    fn into_config(self) -> Result<Config> {
        let mut cfg = match (&self.config, &self.work_dir, &self.metadata) {
            (Some(path), _, _) => Config::from_yaml_file(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            (None, Some(work_dir), Some(metadata)) => Config::new(work_dir, metadata),
            _ => bail!("pass --config, or both --work-dir and --metadata"),
        };
        if let Some(v) = self.work_dir {
            cfg.work_dir = v;
        }
        if let Some(v) = self.metadata {
            cfg.metadata = v;
        }
        if let Some(v) = self.summary_level {
            cfg.summary_level = v;
        }
        if let Some(v) = self.chunk_size {
            cfg.chunk_size = v;
        }
        if let Some(v) = self.segment_match {
            cfg.segment_match = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sf1join=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();

    // ─── 2) configuration ────────────────────────────────────────────
    let cfg = Args::parse().into_config()?;
    info!(
        work_dir = %cfg.work_dir.display(),
        summary_level = %cfg.summary_level,
        segments = cfg.segment_count,
        segment_match = ?cfg.segment_match,
        "startup"
    );

    // ─── 3) open the store ───────────────────────────────────────────
    let db = cfg.database_path();
    let store = DuckStore::open(&db)
        .with_context(|| format!("opening database {}; check the path and rerun", db.display()))?;

    // ─── 4) run ──────────────────────────────────────────────────────
    let report = pipeline::run(&cfg, &store, &CancelToken::new())?;

    if let Some(segments) = &report.segments {
        let missing = segments.count(sf1join::segment::ExtractStatus::MissingSource);
        if missing > 0 {
            warn!(missing, "some segment files were missing; their variables are absent");
        }
    }
    match &report.export {
        Some(export) => info!(
            output = %export.output.display(),
            rows = export.rows,
            records = export.assembly.emitted,
            "all done"
        ),
        None => info!("all done; nothing to export"),
    }
    Ok(())
}
