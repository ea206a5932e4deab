// src/geo/filter.rs

use serde::Serialize;
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use super::decode::{trim_line_end, FixedWidthDecoder};
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::utils::is_non_empty;

/// Inclusive range of record-sequence ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordBounds {
    pub min: u64,
    pub max: u64,
}

impl RecordBounds {
    pub fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, id: u64) -> bool {
        self.min <= id && id <= self.max
    }

    /// Widen to include `id`, starting from `None` on the first observation.
    pub fn observe(bounds: Option<Self>, id: u64) -> Option<Self> {
        Some(match bounds {
            None => Self::new(id, id),
            Some(b) => Self::new(b.min.min(id), b.max.max(id)),
        })
    }
}

/// What a filter pass saw.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FilterOutcome {
    pub scanned: u64,
    pub matched: u64,
    pub malformed: u64,
    pub bounds: Option<RecordBounds>,
    /// Matched ids, only collected when exact segment matching is on.
    #[serde(skip)]
    pub ids: Option<BTreeSet<u64>>,
    /// True when the filtered file already existed and was only rescanned.
    pub resumed: bool,
}

/// Keeps header lines whose summary level equals the target code.
#[derive(Debug, Clone)]
pub struct GeoFilter {
    target: Vec<u8>,
    collect_ids: bool,
    decoder: FixedWidthDecoder,
}

impl GeoFilter {
    pub fn new(summary_level: &str) -> Self {
        Self {
            target: summary_level.as_bytes().to_vec(),
            collect_ids: false,
            decoder: FixedWidthDecoder,
        }
    }

    /// Also keep the full set of matched ids (needed for exact segment matching).
    pub fn collect_ids(mut self, yes: bool) -> Self {
        self.collect_ids = yes;
        self
    }

    /// Stream `input`, writing matching lines to `output` in their original
    /// order. Line content is kept byte-for-byte; every line ending is written
    /// as `\n`. Bounds are tracked in the same pass.
    ///
    /// A matching line that cannot be decoded is counted as malformed and not written.
    pub fn filter<R: BufRead, W: Write>(
        &self,
        mut input: R,
        output: &mut W,
        cancel: &CancelToken,
    ) -> Result<FilterOutcome> {
        let mut outcome = FilterOutcome {
            ids: self.collect_ids.then(BTreeSet::new),
            ..Default::default()
        };
        let mut buf = Vec::with_capacity(512);

        loop {
            buf.clear();
            if input.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            outcome.scanned += 1;
            let line_no = outcome.scanned;
            cancel.check_at_line(line_no)?;

            let line = trim_line_end(&buf);
            if line.is_empty() {
                continue;
            }
            match self.decoder.summary_level(line) {
                Some(level) if level == self.target.as_slice() => {}
                Some(_) => continue,
                None => {
                    outcome.malformed += 1;
                    debug!(line_no, "header line too short to hold a summary level");
                    continue;
                }
            }

            let id = match self.decoder.decode_keyed(line_no, line) {
                Ok((_, id)) => id,
                Err(e) if e.is_per_record() => {
                    outcome.malformed += 1;
                    warn!("skipping header line: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            output.write_all(line)?;
            output.write_all(b"\n")?;
            outcome.matched += 1;
            outcome.bounds = RecordBounds::observe(outcome.bounds, id);
            if let Some(ids) = outcome.ids.as_mut() {
                ids.insert(id);
            }
        }

        Ok(outcome)
    }

    /// Filter the header file at `src` into `dst`.
    ///
    /// When `dst` already exists and is non-empty it is rescanned for bounds
    /// instead of rewritten; filtering an already-filtered file is a no-op on
    /// its contents, so the result is the same.
    #[instrument(level = "info", skip(self, src, dst, cancel), fields(src = %src.as_ref().display()))]
    pub fn filter_file(
        &self,
        src: impl AsRef<Path>,
        dst: impl AsRef<Path>,
        cancel: &CancelToken,
    ) -> Result<FilterOutcome> {
        let (src, dst) = (src.as_ref(), dst.as_ref());
        if !is_non_empty(src) {
            return Err(PipelineError::EmptyInput {
                path: src.to_path_buf(),
            });
        }

        if is_non_empty(dst) {
            info!(dst = %dst.display(), "filtered header exists; rescanning for bounds");
            let reader = BufReader::new(File::open(dst)?);
            let mut outcome = self.filter(reader, &mut io::sink(), cancel)?;
            outcome.resumed = true;
            return Ok(outcome);
        }

        let dir = dst.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let tmp = NamedTempFile::new_in(dir)?;
        let reader = BufReader::new(File::open(src)?);
        let outcome = {
            let mut writer = BufWriter::new(tmp.as_file());
            let outcome = self.filter(reader, &mut writer, cancel)?;
            writer.flush()?;
            outcome
        };
        tmp.persist(dst).map_err(|e| PipelineError::Io(e.error))?;

        match outcome.bounds {
            Some(b) => info!(
                matched = outcome.matched,
                scanned = outcome.scanned,
                malformed = outcome.malformed,
                "records between {} and {}",
                b.min,
                b.max
            ),
            None => warn!(
                scanned = outcome.scanned,
                "no header records at the target summary level"
            ),
        }
        Ok(outcome)
    }
}
