// src/segment/mod.rs

pub mod extract;

use serde::Serialize;
use tracing::{info, instrument};

pub use extract::{ExtractOutcome, ExtractStatus, SegmentRangeExtractor, Selection};

use crate::cancel::CancelToken;
use crate::config::{Config, SegmentMatch};
use crate::error::Result;
use crate::geo::FilterOutcome;

/// Columns every segment record starts with, before its record-sequence id.
pub const ADMIN_FIELDS: [&str; 4] = ["FILEID", "STUSAB", "CHARITER", "CIFSN"];

/// Name of the shared record-sequence key.
pub const LOGRECNO: &str = "LOGRECNO";

/// Zero-based position of LOGRECNO in a segment record.
pub const LOGRECNO_INDEX: usize = ADMIN_FIELDS.len();

pub fn is_admin_field(name: &str) -> bool {
    ADMIN_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Per-segment results of one extraction run, indexed by 1-based segment number.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SegmentsReport {
    pub segments: Vec<(usize, ExtractOutcome)>,
}

impl SegmentsReport {
    pub fn count(&self, status: ExtractStatus) -> usize {
        self.segments.iter().filter(|(_, o)| o.status == status).count()
    }
}

/// Extract every configured segment against the header filter's result.
///
/// Returns `None` when the header filter matched nothing: there is no range
/// to extract.
#[instrument(level = "info", skip_all, fields(segments = cfg.segment_count))]
pub fn extract_all(
    cfg: &Config,
    header: &FilterOutcome,
    cancel: &CancelToken,
) -> Result<Option<SegmentsReport>> {
    let Some(bounds) = header.bounds else {
        return Ok(None);
    };
    let selection = match (cfg.segment_match, &header.ids) {
        (SegmentMatch::Exact, Some(ids)) => Selection::Exact(ids.clone()),
        _ => Selection::Range(bounds),
    };
    let extractor = SegmentRangeExtractor::new(selection).assume_sorted(cfg.assume_sorted);

    let mut report = SegmentsReport::default();
    for segment in 1..=cfg.segment_count {
        cancel.check()?;
        let outcome = extractor.extract_file(
            cfg.segment_input(segment),
            cfg.segment_filtered(segment),
            cancel,
        )?;
        report.segments.push((segment, outcome));
    }

    info!(
        extracted = report.count(ExtractStatus::Extracted),
        cached = report.count(ExtractStatus::Cached),
        missing = report.count(ExtractStatus::MissingSource),
        "segment extraction done"
    );
    Ok(Some(report))
}
