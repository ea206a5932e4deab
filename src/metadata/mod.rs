// src/metadata/mod.rs

pub mod code;

use serde::Deserialize;
use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, Read},
    path::Path,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use code::{canonical_table_code, table_code};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub text: String,
}

/// One table of the label dictionary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TableDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub universe: String,
    /// Full column code -> label.
    #[serde(default)]
    pub labels: HashMap<String, Label>,
}

/// Label dictionary keyed by canonical table code.
#[derive(Debug, Clone, Default)]
pub struct MetadataTree {
    tables: HashMap<String, TableDescriptor>,
}

impl MetadataTree {
    /// Build from raw entries, canonicalising table codes and upper-casing column codes.
    ///
    /// When two keys canonicalise to the same code, a key already in canonical
    /// form wins over an unpadded one; otherwise the lexicographically first key
    /// wins. The loser is logged and dropped.
    pub fn from_tables(raw: HashMap<String, TableDescriptor>) -> Self {
        let mut entries: Vec<(String, String, TableDescriptor)> = raw
            .into_iter()
            .map(|(key, table)| (canonical_table_code(&key), key, table))
            .collect();
        entries.sort_by(|(a_code, a_key, _), (b_code, b_key, _)| {
            let a_rewritten = a_key.trim().to_ascii_uppercase() != *a_code;
            let b_rewritten = b_key.trim().to_ascii_uppercase() != *b_code;
            (a_rewritten, a_key).cmp(&(b_rewritten, b_key))
        });

        let mut tables: HashMap<String, TableDescriptor> = HashMap::with_capacity(entries.len());
        for (code, key, mut table) in entries {
            if let Some(kept) = tables.get(&code) {
                warn!(
                    table = %code,
                    dropped = %key,
                    kept_name = %kept.name,
                    "label dictionary has two entries for one table; keeping the first"
                );
                continue;
            }
            table.labels = table
                .labels
                .into_iter()
                .map(|(col, label)| (col.trim().to_ascii_uppercase(), label))
                .collect();
            tables.insert(code, table);
        }
        Self { tables }
    }

    pub fn from_reader<R: Read>(reader: R) -> std::result::Result<Self, serde_json::Error> {
        let raw: HashMap<String, TableDescriptor> = serde_json::from_reader(reader)?;
        Ok(Self::from_tables(raw))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| PipelineError::Metadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let tree = Self::from_reader(BufReader::new(file)).map_err(|e| {
            PipelineError::Metadata {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;
        info!(tables = tree.len(), path = %path.display(), "loaded label dictionary");
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, table_code: &str) -> Option<&TableDescriptor> {
        self.tables.get(table_code)
    }
}

/// Human-readable description of one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor<'a> {
    pub name: &'a str,
    pub universe: &'a str,
    pub text: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupMiss {
    #[error("table not found: {table} (column {column})")]
    UnknownTable { table: String, column: String },
    #[error("label not found: {column} in table {table}")]
    UnknownLabel { table: String, column: String },
}

impl LookupMiss {
    fn column(&self) -> &str {
        match self {
            LookupMiss::UnknownTable { column, .. } | LookupMiss::UnknownLabel { column, .. } => {
                column
            }
        }
    }
}

/// Counts of lookup misses since the resolver was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MissCounts {
    pub unknown_table: u64,
    pub unknown_label: u64,
    /// Distinct column codes that missed at least once.
    pub distinct_columns: u64,
}

/// Maps column codes to descriptors through a `MetadataTree`.
///
/// Misses are not errors: `record_miss` logs the first miss of each column at
/// `warn` and the rest at `debug`, and keeps counts for the run report.
pub struct MetadataResolver {
    tree: MetadataTree,
    misses: RefCell<(MissCounts, HashSet<String>)>,
}

impl MetadataResolver {
    pub fn new(tree: MetadataTree) -> Self {
        Self {
            tree,
            misses: RefCell::new((MissCounts::default(), HashSet::new())),
        }
    }

    pub fn resolve(&self, column_code: &str) -> std::result::Result<ColumnDescriptor<'_>, LookupMiss> {
        let table = table_code(column_code);
        let Some(desc) = self.tree.table(&table) else {
            return Err(LookupMiss::UnknownTable {
                table,
                column: column_code.to_string(),
            });
        };
        let key = column_code.trim().to_ascii_uppercase();
        match desc.labels.get(&key) {
            Some(label) => Ok(ColumnDescriptor {
                name: &desc.name,
                universe: &desc.universe,
                text: &label.text,
            }),
            None => Err(LookupMiss::UnknownLabel {
                table,
                column: column_code.to_string(),
            }),
        }
    }

    pub fn record_miss(&self, miss: &LookupMiss) {
        let mut guard = self.misses.borrow_mut();
        let (counts, seen) = &mut *guard;
        match miss {
            LookupMiss::UnknownTable { .. } => counts.unknown_table += 1,
            LookupMiss::UnknownLabel { .. } => counts.unknown_label += 1,
        }
        if seen.insert(miss.column().to_string()) {
            counts.distinct_columns += 1;
            warn!("{}", miss);
        } else {
            debug!("{}", miss);
        }
    }

    pub fn misses(&self) -> MissCounts {
        self.misses.borrow().0
    }

    pub fn tree(&self) -> &MetadataTree {
        &self.tree
    }
}
