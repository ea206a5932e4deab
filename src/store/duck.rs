// src/store/duck.rs

use duckdb::{appender_params_from_iter, params, types::Value, Connection};
use serde_json::{Number, Value as Json};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
    sync::Arc,
    time::Instant,
};
use tracing::{debug, info, instrument, warn};

use super::{quote_ident, CensusStore, LoadFormat, LoadSpec, Row};
use crate::error::Result;
use crate::geo::decode::{latin1_to_string, FixedWidthDecoder};

/// `CensusStore` backed by an embedded DuckDB database.
pub struct DuckStore {
    conn: Connection,
}

impl DuckStore {
    /// Open a DuckDB database on disk at `path`, creating the file if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Ok(Self { conn })
    }

    /// Open a DuckDB in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    fn load_fixed_width(&self, spec: &LoadSpec) -> Result<u64> {
        let decoder = FixedWidthDecoder;
        let mut reader = BufReader::new(File::open(&spec.path)?);
        let mut appender = self.conn.appender(&spec.table)?;
        let (mut appended, mut skipped, mut line_no) = (0u64, 0u64, 0u64);
        let mut buf = Vec::with_capacity(512);

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            line_no += 1;
            let record = match decoder.decode(line_no, &buf) {
                Ok(r) => r,
                Err(e) if e.is_per_record() => {
                    skipped += 1;
                    warn!("not loading header line: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            let values = record.fields().map(|(_, v)| non_blank(v.trim()));
            appender.append_row(appender_params_from_iter(values))?;
            appended += 1;
        }
        appender.flush()?;

        if skipped > 0 {
            warn!(table = %spec.table, skipped, "malformed header lines not loaded");
        }
        Ok(appended)
    }

    fn load_delimited(&self, spec: &LoadSpec, delimiter: u8) -> Result<u64> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(BufReader::new(File::open(&spec.path)?));
        let mut appender = self.conn.appender(&spec.table)?;
        let mut record = csv::ByteRecord::new();
        let mut appended = 0u64;

        while rdr.read_byte_record(&mut record)? {
            let values = record
                .iter()
                .map(|field| non_blank(latin1_to_string(field).trim()));
            appender.append_row(appender_params_from_iter(values))?;
            appended += 1;
        }
        appender.flush()?;
        Ok(appended)
    }
}

fn non_blank(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Map a DuckDB value onto JSON; numbers stay numbers.
fn to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(b),
        Value::TinyInt(i) => Json::from(i),
        Value::SmallInt(i) => Json::from(i),
        Value::Int(i) => Json::from(i),
        Value::BigInt(i) => Json::from(i),
        Value::UTinyInt(i) => Json::from(i),
        Value::USmallInt(i) => Json::from(i),
        Value::UInt(i) => Json::from(i),
        Value::UBigInt(i) => Json::from(i),
        Value::HugeInt(i) => i64::try_from(i)
            .map(Json::from)
            .unwrap_or_else(|_| Json::String(i.to_string())),
        Value::Float(f) => float(f64::from(f)),
        Value::Double(f) => float(f),
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(float)
            .unwrap_or_else(|_| Json::String(d.to_string())),
        Value::Text(s) => Json::String(s),
        other => Json::String(format!("{:?}", other)),
    }
}

fn float(f: f64) -> Json {
    Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
}

impl CensusStore for DuckStore {
    fn execute_script(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    #[instrument(level = "info", skip(self, spec), fields(table = %spec.table, path = %spec.path.display()))]
    fn bulk_load(&self, spec: &LoadSpec) -> Result<u64> {
        let start = Instant::now();
        let rows = match spec.format {
            LoadFormat::FixedWidth => self.load_fixed_width(spec)?,
            LoadFormat::Delimited { delimiter } => self.load_delimited(spec, delimiter)?,
        };
        info!(rows, elapsed = ?start.elapsed(), "loaded");
        Ok(rows)
    }

    fn query(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(sql_len = sql.len(), "running query");
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let columns: Arc<[String]> = rows
            .as_ref()
            .map(|s| s.column_names())
            .unwrap_or_default()
            .into();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..columns.len())
                .map(|i| row.get::<_, Value>(i).map(to_json))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            out.push(Row::new(Arc::clone(&columns), values));
        }
        Ok(out)
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(table));
        let n: i64 = self.conn.query_row(&sql, [], |r| r.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name FROM information_schema.columns \
             WHERE table_name = ? ORDER BY ordinal_position",
        )?;
        let names = stmt
            .query_map(params![table], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }
}
