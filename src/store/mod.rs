// src/store/mod.rs

pub mod duck;
pub mod load;

use serde_json::Value as Json;
use std::{path::PathBuf, sync::Arc};

pub use duck::DuckStore;
pub use load::{load_tables, prepare_schema, LoadReport, TableLoad};

use crate::error::Result;
use crate::geo::GEO_FIELDS;

/// How a file maps onto a table's columns, in column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFormat {
    /// Geographic header: one column per `GEO_FIELDS` entry, cut by position.
    FixedWidth,
    /// Segment file: one column per delimited field.
    Delimited { delimiter: u8 },
}

#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub table: String,
    pub path: PathBuf,
    pub format: LoadFormat,
}

/// One result row: column names shared across the rows of a query, values in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Json>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Json>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Json> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Json)> + '_ {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
}

/// The relational store the pipeline talks to.
///
/// Access is sequential; implementations do not need to be `Sync`.
pub trait CensusStore {
    /// Run a multi-statement DDL script.
    fn execute_script(&self, sql: &str) -> Result<()>;

    /// Load a whole file into an existing table, returning the rows appended.
    fn bulk_load(&self, spec: &LoadSpec) -> Result<u64>;

    /// Run a query and return its rows.
    fn query(&self, sql: &str) -> Result<Vec<Row>>;

    /// Rows currently in `table`; used to decide whether a load can be skipped.
    fn row_count(&self, table: &str) -> Result<u64>;

    /// Column names of `table` in declaration order; empty when the table does not exist.
    fn table_columns(&self, table: &str) -> Result<Vec<String>>;
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// DDL for the geographic header table: one VARCHAR column per layout field.
pub fn geo_table_ddl(table: &str) -> String {
    let cols: Vec<String> = GEO_FIELDS
        .iter()
        .map(|f| format!("    {} VARCHAR({})", quote_ident(f.name), f.len))
        .collect();
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(table),
        cols.join(",\n")
    )
}
