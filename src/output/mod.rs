// src/output/mod.rs

pub mod assemble;

use serde::Serialize;
use serde_json::Value as Json;
use std::io::Write;

pub use assemble::{Assembled, AssemblyStats, RecordAssembler};

use crate::error::Result;

/// One labelled value of one geography.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRecord<'a> {
    pub zcta5: Option<&'a Json>,
    pub name: &'a str,
    pub universe: &'a str,
    pub text: &'a str,
    pub key: &'a str,
    pub value: &'a Json,
}

/// Newline-delimited JSON sink.
pub struct NdjsonWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.inner, record)?;
        self.inner.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(mut self) -> Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn one_object_per_line() -> anyhow::Result<()> {
        let zcta = json!("01001");
        let v1 = json!(17416);
        let v2 = json!(null);
        let rec = |key, value| OutputRecord {
            zcta5: Some(&zcta),
            name: "TOTAL POPULATION",
            universe: "Total population",
            text: "Total",
            key,
            value,
        };

        let mut w = NdjsonWriter::new(Vec::new());
        w.write(&rec("P0010001", &v1))?;
        w.write(&rec("P0010002", &v2))?;
        assert_eq!(w.written(), 2);
        let out = String::from_utf8(w.into_inner()?)?;

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: Json = serde_json::from_str(lines[0])?;
        assert_eq!(first["key"], "P0010001");
        assert_eq!(first["value"], 17416);
        let second: Json = serde_json::from_str(lines[1])?;
        assert!(second["value"].is_null());
        Ok(())
    }
}
