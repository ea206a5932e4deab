// src/utils.rs

use std::{fs, path::Path};

/// True when `path` is a file with at least one byte. Missing or unreadable
/// paths count as empty.
pub fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
