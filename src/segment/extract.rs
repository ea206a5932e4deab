// src/segment/extract.rs

use csv::{ByteRecord, ReaderBuilder, WriterBuilder};
use serde::Serialize;
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use super::LOGRECNO_INDEX;
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::geo::filter::RecordBounds;
use crate::utils::is_non_empty;

/// Which record-sequence ids a segment extraction keeps.
#[derive(Debug, Clone)]
pub enum Selection {
    /// Numeric `min <= id <= max`.
    Range(RecordBounds),
    /// Only these ids.
    Exact(BTreeSet<u64>),
}

impl Selection {
    fn accepts(&self, id: u64) -> bool {
        match self {
            Selection::Range(b) => b.contains(id),
            Selection::Exact(ids) => ids.contains(&id),
        }
    }

    fn upper(&self) -> Option<u64> {
        match self {
            Selection::Range(b) => Some(b.max),
            Selection::Exact(ids) => ids.last().copied(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractStatus {
    Extracted,
    /// Destination already present and non-empty; left untouched.
    Cached,
    /// Source missing or empty; the segment is skipped.
    MissingSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractOutcome {
    pub status: ExtractStatus,
    pub scanned: u64,
    pub emitted: u64,
    pub malformed: u64,
}

impl ExtractOutcome {
    fn with_status(status: ExtractStatus) -> Self {
        Self {
            status,
            scanned: 0,
            emitted: 0,
            malformed: 0,
        }
    }
}

/// Copies the records of one segment file whose id passes a `Selection`.
///
/// Ids are compared as numbers, never as text: `0000100` and `100` are the
/// same record and `0000099 < 0000100` regardless of any shared prefix.
#[derive(Debug, Clone)]
pub struct SegmentRangeExtractor {
    selection: Selection,
    assume_sorted: bool,
}

impl SegmentRangeExtractor {
    pub fn new(selection: Selection) -> Self {
        Self {
            selection,
            assume_sorted: false,
        }
    }

    pub fn range(bounds: RecordBounds) -> Self {
        Self::new(Selection::Range(bounds))
    }

    /// Stop at the first id past the upper bound. Only sound when the file's
    /// ids are non-decreasing.
    pub fn assume_sorted(mut self, yes: bool) -> Self {
        self.assume_sorted = yes;
        self
    }

    /// Stream `input` to `output`, one record at a time.
    pub fn extract<R: Read, W: Write>(
        &self,
        input: R,
        output: W,
        cancel: &CancelToken,
    ) -> Result<ExtractOutcome> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(input);
        let mut wtr = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(output);

        let mut outcome = ExtractOutcome::with_status(ExtractStatus::Extracted);
        let upper = self.selection.upper();
        let mut record = ByteRecord::new();

        while rdr.read_byte_record(&mut record)? {
            outcome.scanned += 1;
            cancel.check_at_line(outcome.scanned)?;

            let Some(id) = record_id(&record) else {
                outcome.malformed += 1;
                debug!(record = outcome.scanned, "segment record without a numeric LOGRECNO");
                continue;
            };

            if self.selection.accepts(id) {
                wtr.write_byte_record(&record)?;
                outcome.emitted += 1;
            } else if self.assume_sorted && upper.is_some_and(|max| id > max) {
                debug!(id, "past the upper bound; stopping early");
                break;
            }
        }

        wtr.flush()?;
        Ok(outcome)
    }

    /// Extract `src` into `dst`, reusing `dst` when it is already populated.
    #[instrument(level = "info", skip(self, src, dst, cancel), fields(src = %src.as_ref().display()))]
    pub fn extract_file(
        &self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
        cancel: &CancelToken,
    ) -> Result<ExtractOutcome> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if is_non_empty(dst) {
            info!(dst = %dst.display(), "already filtered; skipping");
            return Ok(ExtractOutcome::with_status(ExtractStatus::Cached));
        }
        if !is_non_empty(src) {
            warn!("segment file missing or empty; skipping");
            return Ok(ExtractOutcome::with_status(ExtractStatus::MissingSource));
        }

        let dir = dst.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        let outcome = self.extract(
            BufReader::new(File::open(src)?),
            BufWriter::new(tmp.as_file()),
            cancel,
        )?;
        tmp.persist(dst).map_err(|e| PipelineError::Io(e.error))?;

        info!(
            scanned = outcome.scanned,
            emitted = outcome.emitted,
            malformed = outcome.malformed,
            "filtered segment"
        );
        Ok(outcome)
    }
}

fn record_id(record: &ByteRecord) -> Option<u64> {
    let raw = record.get(LOGRECNO_INDEX)?;
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn row(id: &str) -> String {
        format!("SF1ST,US,000,01,{},12,7,0\n", id)
    }

    fn ids_in(out: &[u8]) -> Vec<u64> {
        String::from_utf8_lossy(out)
            .lines()
            .map(|l| l.split(',').nth(4).unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn emits_only_numeric_range_with_interleaved_ids() -> Result<()> {
        // ids out of order, plus 0001000 which shares the "00010" prefix with the lower bound
        let input: String = ["0000099", "0000150", "0001000", "0000100", "0000020", "0000199", "0000200", "0000120"]
            .iter()
            .map(|id| row(id))
            .collect();
        let bounds = RecordBounds::new(100, 199);
        let mut out = Vec::new();
        let outcome = SegmentRangeExtractor::range(bounds).extract(
            Cursor::new(input),
            &mut out,
            &CancelToken::new(),
        )?;

        let ids = ids_in(&out);
        assert_eq!(ids, vec![150, 100, 199, 120]);
        assert!(ids.iter().all(|&id| bounds.contains(id)));
        assert_eq!(outcome.scanned, 8);
        assert_eq!(outcome.emitted, 4);
        Ok(())
    }

    #[test]
    fn records_are_copied_verbatim() -> Result<()> {
        let input = "SF1ST,US,000,01,0000005,1,2,3\nSF1ST,US,000,01,0000006,4,,6\n";
        let mut out = Vec::new();
        SegmentRangeExtractor::range(RecordBounds::new(1, 10)).extract(
            Cursor::new(input),
            &mut out,
            &CancelToken::new(),
        )?;
        assert_eq!(String::from_utf8(out)?, input);
        Ok(())
    }

    #[test]
    fn sorted_mode_stops_past_the_bound() -> Result<()> {
        let input: String = (1..=10).map(|i| row(&format!("{:07}", i))).collect();
        let mut out = Vec::new();
        let outcome = SegmentRangeExtractor::range(RecordBounds::new(3, 5))
            .assume_sorted(true)
            .extract(Cursor::new(input), &mut out, &CancelToken::new())?;
        assert_eq!(ids_in(&out), vec![3, 4, 5]);
        assert_eq!(outcome.scanned, 6);
        Ok(())
    }

    #[test]
    fn exact_selection_skips_gaps_inside_the_range() -> Result<()> {
        let input: String = (1..=6).map(|i| row(&format!("{:07}", i))).collect();
        let mut out = Vec::new();
        SegmentRangeExtractor::new(Selection::Exact(BTreeSet::from([2, 5]))).extract(
            Cursor::new(input),
            &mut out,
            &CancelToken::new(),
        )?;
        assert_eq!(ids_in(&out), vec![2, 5]);
        Ok(())
    }

    #[test]
    fn malformed_records_are_counted() -> Result<()> {
        let input = "SF1ST,US,000\nSF1ST,US,000,01,abc,1\nSF1ST,US,000,01,0000002,1\n";
        let mut out = Vec::new();
        let outcome = SegmentRangeExtractor::range(RecordBounds::new(1, 3)).extract(
            Cursor::new(input),
            &mut out,
            &CancelToken::new(),
        )?;
        assert_eq!(outcome.malformed, 2);
        assert_eq!(outcome.emitted, 1);
        Ok(())
    }

    #[test]
    fn file_level_checkpoint_and_missing_source() -> Result<()> {
        let dir = tempdir()?;
        let src = dir.path().join("us000012010.sf1");
        let dst = dir.path().join("us000012010.cs1");
        let extractor = SegmentRangeExtractor::range(RecordBounds::new(1, 2));
        let cancel = CancelToken::new();

        let missing = extractor.extract_file(&src, &dst, &cancel)?;
        assert_eq!(missing.status, ExtractStatus::MissingSource);
        assert!(!dst.exists());

        fs::write(&src, row("0000001") + &row("0000009"))?;
        let first = extractor.extract_file(&src, &dst, &cancel)?;
        assert_eq!(first.status, ExtractStatus::Extracted);
        assert_eq!(first.emitted, 1);

        fs::write(&src, row("0000002"))?;
        let second = extractor.extract_file(&src, &dst, &cancel)?;
        assert_eq!(second.status, ExtractStatus::Cached);
        assert_eq!(fs::read_to_string(&dst)?, row("0000001"));
        Ok(())
    }
}
