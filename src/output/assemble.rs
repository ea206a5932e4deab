// src/output/assemble.rs

use serde::Serialize;
use serde_json::Value as Json;
use std::cell::Cell;

use super::OutputRecord;
use crate::geo::layout::ZCTA5;
use crate::metadata::MetadataResolver;
use crate::query::{ColumnRef, Source, GEO_IDENTIFIERS};
use crate::segment::is_admin_field;
use crate::store::Row;

/// Running totals across every row assembled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssemblyStats {
    pub rows: u64,
    pub emitted: u64,
    pub admin_dropped: u64,
    pub identifiers_skipped: u64,
    pub unresolved: u64,
}

#[derive(Debug, PartialEq, Eq)]
enum Role<'a> {
    Admin,
    Zcta5,
    Identifier,
    Variable(&'a str),
}

/// Decide what a joined column is for. Namespaced (`g.X`, `sNN.X`) and bare
/// column names are both accepted.
fn classify(column: &str) -> Role<'_> {
    let (source, field) = match ColumnRef::parse(column) {
        Some(c) => (Some(c.source), &column[column.len() - c.name.len()..]),
        None => (None, column),
    };
    if is_admin_field(field) {
        Role::Admin
    } else if field.eq_ignore_ascii_case(ZCTA5) {
        Role::Zcta5
    } else if source == Some(Source::Geo)
        || GEO_IDENTIFIERS.iter().any(|g| g.eq_ignore_ascii_case(field))
    {
        Role::Identifier
    } else {
        Role::Variable(field)
    }
}

/// Turns joined rows into one `OutputRecord` per variable column.
pub struct RecordAssembler<'r> {
    resolver: &'r MetadataResolver,
    stats: Cell<AssemblyStats>,
}

impl<'r> RecordAssembler<'r> {
    pub fn new(resolver: &'r MetadataResolver) -> Self {
        Self {
            resolver,
            stats: Cell::new(AssemblyStats::default()),
        }
    }

    pub fn stats(&self) -> AssemblyStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut AssemblyStats)) {
        let mut s = self.stats.get();
        f(&mut s);
        self.stats.set(s);
    }

    /// Lazily produce the records of `row`. Administrative columns are
    /// dropped, ZCTA5 is attached to every record, other geography
    /// identifiers are not emitted, and columns without metadata are skipped.
    pub fn assemble<'a>(&'a self, row: &'a Row) -> Assembled<'a, 'r> {
        self.bump(|s| s.rows += 1);
        let zcta5 = row
            .iter()
            .find(|(name, _)| classify(name) == Role::Zcta5)
            .map(|(_, v)| v);
        Assembled {
            assembler: self,
            columns: Box::new(row.iter()),
            zcta5,
        }
    }
}

/// Iterator returned by `RecordAssembler::assemble`.
pub struct Assembled<'a, 'r> {
    assembler: &'a RecordAssembler<'r>,
    columns: Box<dyn Iterator<Item = (&'a str, &'a Json)> + 'a>,
    zcta5: Option<&'a Json>,
}

impl<'a, 'r: 'a> Iterator for Assembled<'a, 'r> {
    type Item = OutputRecord<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for (name, value) in self.columns.by_ref() {
            let code = match classify(name) {
                Role::Admin => {
                    self.assembler.bump(|s| s.admin_dropped += 1);
                    continue;
                }
                Role::Zcta5 | Role::Identifier => {
                    self.assembler.bump(|s| s.identifiers_skipped += 1);
                    continue;
                }
                Role::Variable(code) => code,
            };
            match self.assembler.resolver.resolve(code) {
                Ok(desc) => {
                    self.assembler.bump(|s| s.emitted += 1);
                    return Some(OutputRecord {
                        zcta5: self.zcta5,
                        name: desc.name,
                        universe: desc.universe,
                        text: desc.text,
                        key: code,
                        value,
                    });
                }
                Err(miss) => {
                    self.assembler.resolver.record_miss(&miss);
                    self.assembler.bump(|s| s.unresolved += 1);
                }
            }
        }
        None
    }
}
