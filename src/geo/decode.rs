// src/geo/decode.rs

use tracing::trace;

use super::layout::{self, GeoField, GEO_FIELDS, RECORD_WIDTH};
use crate::error::{PipelineError, Result};

/// Census files are ISO-8859-1: every byte maps straight to the code point of the same value.
pub fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Inverse of `latin1_to_string`; characters outside Latin-1 become `?`.
pub fn string_to_latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Drop a trailing `\n` or `\r\n`.
pub fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// A decoded geographic header record. Values are kept exactly as they sit in
/// the file (padding included), one per entry of `GEO_FIELDS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRecord {
    values: Vec<String>,
}

impl GeoRecord {
    /// A record with every field blank-padded, used to build synthetic lines.
    pub fn blank() -> Self {
        Self {
            values: GEO_FIELDS.iter().map(|f| " ".repeat(f.len)).collect(),
        }
    }

    /// Raw value of `name`, padding included.
    pub fn get(&self, name: &str) -> Option<&str> {
        layout::field_index(name).map(|i| self.values[i].as_str())
    }

    /// Value of `name` with surrounding blanks removed.
    pub fn trimmed(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim)
    }

    /// Set `name`, left-aligned and blank-padded (or truncated) to the field width.
    pub fn set(&mut self, name: &str, value: &str) -> Option<&mut Self> {
        let idx = layout::field_index(name)?;
        let width = GEO_FIELDS[idx].len;
        let mut v: String = value.chars().take(width).collect();
        let pad = width - v.chars().count();
        v.extend(std::iter::repeat(' ').take(pad));
        self.values[idx] = v;
        Some(self)
    }

    pub fn summary_level(&self) -> &str {
        self.value_at(layout::SUMLEV)
    }

    pub fn zcta5(&self) -> &str {
        self.value_at(layout::ZCTA5).trim()
    }

    /// Record-sequence id (the join key) as a number.
    pub fn logrecno(&self) -> Option<u64> {
        self.value_at(layout::LOGRECNO).trim().parse().ok()
    }

    /// `(field, value)` pairs in layout order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static GeoField, &str)> + '_ {
        GEO_FIELDS.iter().zip(self.values.iter().map(String::as_str))
    }

    /// Re-encode as a fixed-width Latin-1 line (no terminator).
    pub fn to_line(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_WIDTH);
        for v in &self.values {
            out.extend(string_to_latin1(v));
        }
        out
    }

    fn value_at(&self, name: &str) -> &str {
        // layout constants are always present in GEO_FIELDS
        self.get(name).unwrap_or_default()
    }
}

/// Decodes one header line into a `GeoRecord` using `GEO_FIELDS`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedWidthDecoder;

impl FixedWidthDecoder {
    /// Decode `line` (line terminator optional). `line_no` is only used for error reporting.
    ///
    /// Lines shorter than `RECORD_WIDTH` are rejected as a whole; nothing is decoded
    /// from a short line. Bytes beyond the record width are ignored.
    pub fn decode(&self, line_no: u64, line: &[u8]) -> Result<GeoRecord> {
        let line = trim_line_end(line);
        if line.len() < RECORD_WIDTH {
            return Err(PipelineError::format(
                line_no,
                format!(
                    "record is {} bytes, layout needs {}",
                    line.len(),
                    RECORD_WIDTH
                ),
            ));
        }
        let values = GEO_FIELDS
            .iter()
            .map(|f| latin1_to_string(&line[f.range()]))
            .collect();
        let record = GeoRecord { values };
        trace!(line_no, logrecno = ?record.logrecno(), "decoded header record");
        Ok(record)
    }

    /// Decode and also require a numeric record-sequence id.
    pub fn decode_keyed(&self, line_no: u64, line: &[u8]) -> Result<(GeoRecord, u64)> {
        let record = self.decode(line_no, line)?;
        match record.logrecno() {
            Some(id) => Ok((record, id)),
            None => Err(PipelineError::format(
                line_no,
                format!(
                    "LOGRECNO `{}` is not numeric",
                    record.get(layout::LOGRECNO).unwrap_or_default()
                ),
            )),
        }
    }

    /// The raw summary-level bytes of `line`, without decoding the rest.
    pub fn summary_level<'a>(&self, line: &'a [u8]) -> Option<&'a [u8]> {
        line.get(layout::field(layout::SUMLEV)?.range())
    }
}

#[cfg(test)]
pub(crate) fn synthetic_line(sumlev: &str, logrecno: u64, zcta5: &str) -> Vec<u8> {
    let mut rec = GeoRecord::blank();
    rec.set("FILEID", "SF1ST");
    rec.set("STUSAB", "US");
    rec.set("SUMLEV", sumlev);
    rec.set("GEOCOMP", "00");
    rec.set("CHARITER", "000");
    rec.set("LOGRECNO", &format!("{:07}", logrecno));
    rec.set("ZCTA5", zcta5);
    rec.set("NAME", &format!("ZCTA5 {}", zcta5));
    rec.to_line()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_positions() {
        let line = synthetic_line("880", 42, "01001");
        let rec = FixedWidthDecoder.decode(1, &line).unwrap();
        assert_eq!(rec.get("FILEID"), Some("SF1ST "));
        assert_eq!(rec.summary_level(), "880");
        assert_eq!(rec.get("LOGRECNO"), Some("0000042"));
        assert_eq!(rec.logrecno(), Some(42));
        assert_eq!(rec.zcta5(), "01001");
        assert_eq!(rec.trimmed("NAME"), Some("ZCTA5 01001"));
    }

    #[test]
    fn short_line_is_a_format_error() {
        let mut line = synthetic_line("880", 1, "01001");
        line.truncate(RECORD_WIDTH - 1);
        let err = FixedWidthDecoder.decode(7, &line).unwrap_err();
        assert!(err.is_per_record());
        assert!(matches!(err, PipelineError::Format { line: 7, .. }));
    }

    #[test]
    fn line_terminators_do_not_count_towards_width() {
        let mut line = synthetic_line("880", 1, "01001");
        line.truncate(RECORD_WIDTH - 1);
        line.extend_from_slice(b"\r\n");
        assert!(FixedWidthDecoder.decode(1, &line).is_err());
    }

    #[test]
    fn latin1_bytes_survive_decoding() {
        let mut rec = GeoRecord::blank();
        rec.set("SUMLEV", "880");
        rec.set("LOGRECNO", "0000001");
        rec.set("NAME", "Cañon City");
        let line = rec.to_line();
        assert!(line.contains(&0xF1));
        let back = FixedWidthDecoder.decode(1, &line).unwrap();
        assert_eq!(back.trimmed("NAME"), Some("Cañon City"));
        assert_eq!(back.to_line(), line);
    }

    #[test]
    fn non_numeric_logrecno_is_rejected_when_keyed() {
        let mut rec = GeoRecord::blank();
        rec.set("LOGRECNO", "12A4567");
        let err = FixedWidthDecoder.decode_keyed(3, &rec.to_line()).unwrap_err();
        assert!(matches!(err, PipelineError::Format { line: 3, .. }));
    }
}
