// src/archive.rs

use serde::Serialize;
use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use zip::ZipArchive;

use crate::error::{PipelineError, Result};
use crate::utils::is_non_empty;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExtractReport {
    pub entries: usize,
    pub extracted: usize,
    /// Targets that already existed and were left alone.
    pub existing: usize,
}

/// Unpack the SF1 bundle at `zip_path` into `work_dir`, flattening any
/// directories inside the archive.
///
/// The bundle holds one header file plus one file per segment, so anything
/// other than `expected_entries` file entries is rejected before extracting.
#[instrument(level = "info", skip(zip_path, work_dir), fields(path = %zip_path.display()))]
pub fn extract_bundle(zip_path: &Path, work_dir: &Path, expected_entries: usize) -> Result<ExtractReport> {
    let archive_err = |reason: String| PipelineError::Archive {
        path: zip_path.to_path_buf(),
        reason,
    };

    let file = File::open(zip_path).map_err(|e| archive_err(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;

    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| archive_err(format!("entry #{}: {}", i, e)))?;
        if !entry.is_file() {
            continue;
        }
        let name = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_os_string()))
            .ok_or_else(|| archive_err(format!("unsafe entry name {}", entry.name())))?;
        names.push((i, name));
    }
    if names.len() != expected_entries {
        return Err(archive_err(format!(
            "expected {} files, found {}",
            expected_entries,
            names.len()
        )));
    }

    fs::create_dir_all(work_dir)?;
    let mut report = ExtractReport {
        entries: names.len(),
        ..Default::default()
    };
    for (i, name) in names {
        let target = work_dir.join(&name);
        if is_non_empty(&target) {
            debug!(target = %target.display(), "already extracted");
            report.existing += 1;
            continue;
        }
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_err(format!("entry #{}: {}", i, e)))?;
        let tmp = NamedTempFile::new_in(work_dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            io::copy(&mut entry, &mut writer)
                .map_err(|e| archive_err(format!("reading {}: {}", entry.name(), e)))?;
            writer.flush()?;
        }
        tmp.persist(&target).map_err(|e| PipelineError::Io(e.error))?;
        report.extracted += 1;
    }

    info!(
        extracted = report.extracted,
        existing = report.existing,
        "archive unpacked"
    );
    Ok(report)
}
