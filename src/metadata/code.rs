// src/metadata/code.rs

use once_cell::sync::Lazy;
use regex::Regex;

/// `<table letters><table number>[<iteration letters>]<cell number>`, e.g.
/// `P0010001` (table P001, cell 0001) or `PCT012A001` (table PCT012A, cell 001).
static COLUMN_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z]+)(\d{3})([A-Z]*)(\d{3,4})$").expect("column code pattern")
});

/// A table code, possibly without zero padding: `P1`, `P001`, `PCT12G`.
static TABLE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Z]+)0*(\d+)([A-Z]*)$").expect("table code pattern"));

/// Canonical form of a table code: letters, the number zero-padded to three
/// digits, then any iteration suffix. Codes that do not look like a table are
/// returned upper-cased but otherwise unchanged.
pub fn canonical_table_code(code: &str) -> String {
    let code = code.trim().to_ascii_uppercase();
    match TABLE_CODE.captures(&code) {
        Some(c) => match c[2].parse::<u32>() {
            Ok(n) => format!("{}{:03}{}", &c[1], n, &c[3]),
            Err(_) => code,
        },
        None => code,
    }
}

/// Table code a column belongs to: `P0010001 -> P001`, `PCT012A001 -> PCT012A`.
///
/// Anything that does not parse as a column code loses its last three
/// characters and is then canonicalised.
pub fn table_code(column_code: &str) -> String {
    let code = column_code.trim().to_ascii_uppercase();
    if let Some(c) = COLUMN_CODE.captures(&code) {
        return canonical_table_code(&format!("{}{}{}", &c[1], &c[2], &c[3]));
    }
    let cut = code
        .char_indices()
        .rev()
        .nth(2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    canonical_table_code(&code[..cut])
}
