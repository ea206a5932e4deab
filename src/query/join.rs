// src/query/join.rs

use std::fmt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::segment::{is_admin_field, ADMIN_FIELDS, LOGRECNO};
use crate::store::{quote_ident, quote_literal, CensusStore};

/// Geography columns the join carries besides the administrative ones.
pub const GEO_IDENTIFIERS: [&str; 4] = ["STATE", "COUNTY", "ZCTA5", LOGRECNO];

const GEO_ALIAS: &str = "g";

/// Where a joined column came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Geo,
    /// 1-based segment number.
    Segment(usize),
}

impl Source {
    pub fn alias(&self) -> String {
        match self {
            Source::Geo => GEO_ALIAS.to_string(),
            Source::Segment(n) => format!("s{:02}", n),
        }
    }
}

/// A column of the joined result, namespaced by its source table.
///
/// Rendered as `<alias>.<column>` (`g.ZCTA5`, `s03.P0120001`), which is also the
/// output name used in the SELECT list, so same-named columns of different
/// segments can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub source: Source,
    pub name: String,
}

impl ColumnRef {
    pub fn geo(name: impl Into<String>) -> Self {
        Self {
            source: Source::Geo,
            name: name.into(),
        }
    }

    pub fn segment(n: usize, name: impl Into<String>) -> Self {
        Self {
            source: Source::Segment(n),
            name: name.into(),
        }
    }

    /// Parse an output column name produced by `JoinQuery`. Names without a
    /// recognised namespace come back as `None`.
    pub fn parse(qualified: &str) -> Option<Self> {
        let (ns, name) = qualified.split_once('.')?;
        if name.is_empty() {
            return None;
        }
        if ns == GEO_ALIAS {
            return Some(Self::geo(name));
        }
        let n: usize = ns.strip_prefix('s')?.parse().ok()?;
        Some(Self::segment(n, name))
    }

    fn select_item(&self) -> String {
        format!(
            "{}.{} AS {}",
            self.source.alias(),
            quote_ident(&self.name),
            quote_ident(&self.to_string())
        )
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source.alias(), self.name)
    }
}

/// Variable columns of one loaded segment table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSchema {
    pub number: usize,
    pub table: String,
    pub variables: Vec<String>,
}

impl SegmentSchema {
    /// Build from a full column list, dropping the administrative fields and the key.
    pub fn from_columns(number: usize, table: impl Into<String>, columns: &[String]) -> Self {
        let variables = columns
            .iter()
            .filter(|c| !is_admin_field(c) && !c.eq_ignore_ascii_case(LOGRECNO))
            .cloned()
            .collect();
        Self {
            number,
            table: table.into(),
            variables,
        }
    }
}

/// The segment tables a join spans.
#[derive(Debug, Clone, Default)]
pub struct SegmentCatalog {
    pub segments: Vec<SegmentSchema>,
    /// Configured segments left out of the join: table missing or empty.
    pub skipped: Vec<usize>,
}

impl SegmentCatalog {
    /// Ask the store for every configured segment table. Tables that do not
    /// exist or hold no rows are left out, so a segment whose file was missing
    /// contributes no fields at all.
    pub fn discover<S: CensusStore>(store: &S, cfg: &Config) -> Result<Self> {
        let mut catalog = Self::default();
        for n in 1..=cfg.segment_count {
            let table = cfg.segment_table(n);
            let columns = store.table_columns(&table)?;
            if columns.is_empty() {
                warn!(table = %table, "segment table not found; leaving it out of the join");
                catalog.skipped.push(n);
                continue;
            }
            if store.row_count(&table)? == 0 {
                warn!(table = %table, "segment table is empty; leaving it out of the join");
                catalog.skipped.push(n);
                continue;
            }
            catalog.segments.push(SegmentSchema::from_columns(n, table, &columns));
        }
        info!(
            segments = catalog.segments.len(),
            skipped = catalog.skipped.len(),
            variables = catalog.variable_count(),
            "segment catalog"
        );
        Ok(catalog)
    }

    pub fn variable_count(&self) -> usize {
        self.segments.iter().map(|s| s.variables.len()).sum()
    }
}

/// A built join: the SQL text plus the output columns it yields, in order.
#[derive(Debug, Clone)]
pub struct JoinQuery {
    pub sql: String,
    pub count_sql: String,
    pub columns: Vec<ColumnRef>,
}

impl JoinQuery {
    /// One page of the join. Paging is only stable because the query is ordered by the key.
    pub fn paged(&self, limit: usize, offset: u64) -> String {
        format!("{} LIMIT {} OFFSET {}", self.sql, limit, offset)
    }
}

/// Builds the left join of the geography table against every segment table.
#[derive(Debug, Clone)]
pub struct JoinQueryBuilder {
    geo_table: String,
    summary_level: String,
}

impl JoinQueryBuilder {
    pub fn new(geo_table: impl Into<String>, summary_level: impl Into<String>) -> Self {
        Self {
            geo_table: geo_table.into(),
            summary_level: summary_level.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.geo_table(), cfg.summary_level.clone())
    }

    /// Administrative fields are projected once, from the geography table;
    /// each segment contributes only its variable columns.
    pub fn build(&self, catalog: &SegmentCatalog) -> JoinQuery {
        let mut columns: Vec<ColumnRef> = ADMIN_FIELDS
            .iter()
            .chain(GEO_IDENTIFIERS.iter())
            .map(|c| ColumnRef::geo(*c))
            .collect();
        for seg in &catalog.segments {
            columns.extend(
                seg.variables
                    .iter()
                    .map(|v| ColumnRef::segment(seg.number, v.as_str())),
            );
        }

        let key = quote_ident(LOGRECNO);
        let mut from = format!("{} {}", quote_ident(&self.geo_table), GEO_ALIAS);
        // Segment rowids break ties when a segment repeats a key, so every
        // page boundary falls at the same place on every run.
        let mut order = vec![format!("{}.{}", GEO_ALIAS, key), format!("{}.rowid", GEO_ALIAS)];
        for seg in &catalog.segments {
            let alias = Source::Segment(seg.number).alias();
            from.push_str(&format!(
                " LEFT JOIN {table} {alias} ON {g}.{key} = {alias}.{key}",
                table = quote_ident(&seg.table),
                alias = alias,
                g = GEO_ALIAS,
                key = key,
            ));
            order.push(format!("{}.rowid", alias));
        }
        let filter = format!(
            "{}.{} = {}",
            GEO_ALIAS,
            quote_ident("SUMLEV"),
            quote_literal(&self.summary_level)
        );

        let select: Vec<String> = columns.iter().map(ColumnRef::select_item).collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            select.join(", "),
            from,
            filter,
            order.join(", ")
        );
        // Counts joined rows, not geographies: a repeated key in a segment adds rows.
        let count_sql = format!("SELECT count(*) AS n FROM {} WHERE {}", from, filter);
        debug!(columns = columns.len(), joins = catalog.segments.len(), "built join query");

        JoinQuery {
            sql,
            count_sql,
            columns,
        }
    }
}
