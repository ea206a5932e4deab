// src/query/paginate.rs

use std::vec;
use tracing::{debug, info};

use super::join::JoinQuery;
use crate::cancel::CancelToken;
use crate::error::{PipelineError, Result};
use crate::store::{CensusStore, Row};

/// Runs a `JoinQuery` in `LIMIT`/`OFFSET` chunks.
pub struct PaginatedQueryExecutor<'s, S: CensusStore> {
    store: &'s S,
    chunk_size: usize,
    cancel: CancelToken,
}

impl<'s, S: CensusStore> PaginatedQueryExecutor<'s, S> {
    pub fn new(store: &'s S, chunk_size: usize, cancel: CancelToken) -> Self {
        Self {
            store,
            chunk_size,
            cancel,
        }
    }

    /// Number of geography rows the join will produce.
    pub fn estimate_rows(&self, query: &JoinQuery) -> Result<u64> {
        let rows = self.store.query(&query.count_sql)?;
        let n = rows
            .first()
            .and_then(|r| r.iter().next())
            .and_then(|(_, v)| v.as_u64())
            .ok_or_else(|| PipelineError::Store("row count query returned nothing".into()))?;
        Ok(n)
    }

    /// Lazily page through `query`. Only one chunk is held in memory at a time.
    pub fn run<'q>(&self, query: &'q JoinQuery, total_row_estimate: u64) -> Pages<'s, 'q, S> {
        Pages {
            store: self.store,
            query,
            chunk_size: self.chunk_size,
            total: total_row_estimate,
            offset: 0,
            buffer: Vec::new().into_iter(),
            done: self.chunk_size == 0,
            cancel: self.cancel.clone(),
            chunks: 0,
        }
    }
}

/// Iterator over the rows of a paginated query.
///
/// Chunks are fetched while `offset < total`, so the final partial chunk is
/// always read. An empty chunk also ends the sequence.
pub struct Pages<'s, 'q, S: CensusStore> {
    store: &'s S,
    query: &'q JoinQuery,
    chunk_size: usize,
    total: u64,
    offset: u64,
    buffer: vec::IntoIter<Row>,
    done: bool,
    cancel: CancelToken,
    chunks: u64,
}

impl<S: CensusStore> Pages<'_, '_, S> {
    /// Chunks fetched so far.
    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    fn fetch(&mut self) -> Result<()> {
        self.cancel.check()?;
        info!(
            limit = self.chunk_size,
            offset = self.offset,
            total = self.total,
            "running query chunk"
        );
        let rows = self.store.query(&self.query.paged(self.chunk_size, self.offset))?;
        debug!(rows = rows.len(), "chunk fetched");
        self.chunks += 1;
        self.offset += self.chunk_size as u64;
        if rows.is_empty() {
            self.done = true;
        }
        self.buffer = rows.into_iter();
        Ok(())
    }
}

impl<S: CensusStore> Iterator for Pages<'_, '_, S> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.buffer.next() {
                return Some(Ok(row));
            }
            if self.done || self.offset >= self.total {
                return None;
            }
            if let Err(e) = self.fetch() {
                self.done = true;
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::join::{JoinQueryBuilder, SegmentCatalog, SegmentSchema};
    use crate::store::{geo_table_ddl, DuckStore};
    use anyhow::Result;

    /// `n` ZCTA rows plus one row at another summary level, each with a one-variable segment.
    fn seeded_store(n: u64) -> Result<(DuckStore, JoinQuery)> {
        let store = DuckStore::open_in_memory()?;
        store.execute_script(&geo_table_ddl("geo2010"))?;
        store.execute_script(
            "CREATE TABLE sf1_01 (FILEID VARCHAR, STUSAB VARCHAR, CHARITER VARCHAR, \
             CIFSN VARCHAR, LOGRECNO VARCHAR, P0010001 INTEGER);",
        )?;
        let mut sql = String::new();
        for i in 1..=n {
            sql.push_str(&format!(
                "INSERT INTO geo2010 (SUMLEV, LOGRECNO, ZCTA5) VALUES ('880', '{:07}', '{:05}');\
                 INSERT INTO sf1_01 VALUES ('SF1ST', 'US', '000', '01', '{:07}', {});",
                i, i, i, i
            ));
        }
        sql.push_str("INSERT INTO geo2010 (SUMLEV, LOGRECNO) VALUES ('040', '9999999');");
        store.execute_script(&sql)?;

        let catalog = SegmentCatalog {
            segments: vec![SegmentSchema {
                number: 1,
                table: "sf1_01".into(),
                variables: vec!["P0010001".into()],
            }],
            ..Default::default()
        };
        let query = JoinQueryBuilder::new("geo2010", "880").build(&catalog);
        Ok((store, query))
    }

    fn keys(rows: &[Row]) -> Vec<String> {
        rows.iter()
            .map(|r| r.get("g.LOGRECNO").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    fn assert_pages_match_unpaged(n: u64, chunk: usize) -> Result<u64> {
        let (store, query) = seeded_store(n)?;
        let whole = store.query(&query.sql)?;

        let exec = PaginatedQueryExecutor::new(&store, chunk, CancelToken::new());
        let total = exec.estimate_rows(&query)?;
        assert_eq!(total, n);
        let mut pages = exec.run(&query, total);
        let paged = pages.by_ref().collect::<crate::error::Result<Vec<_>>>()?;

        assert_eq!(keys(&paged), keys(&whole));
        assert_eq!(paged, whole);
        Ok(pages.chunks())
    }

    #[test]
    fn exact_chunk_boundary_covers_every_row() -> Result<()> {
        let chunks = assert_pages_match_unpaged(6, 3)?;
        assert_eq!(chunks, 2);
        Ok(())
    }

    #[test]
    fn final_partial_chunk_is_read() -> Result<()> {
        let chunks = assert_pages_match_unpaged(7, 3)?;
        assert_eq!(chunks, 3);
        Ok(())
    }

    #[test]
    fn chunk_larger_than_result() -> Result<()> {
        let chunks = assert_pages_match_unpaged(2, 5000)?;
        assert_eq!(chunks, 1);
        Ok(())
    }

    #[test]
    fn duplicate_segment_key_is_counted_and_paged() -> Result<()> {
        let (store, query) = seeded_store(5)?;
        store.execute_script(
            "INSERT INTO sf1_01 VALUES ('SF1ST', 'US', '000', '01', '0000002', 20);",
        )?;
        let whole = store.query(&query.sql)?;

        let exec = PaginatedQueryExecutor::new(&store, 2, CancelToken::new());
        let total = exec.estimate_rows(&query)?;
        assert_eq!(total, 6);
        let paged = exec
            .run(&query, total)
            .collect::<crate::error::Result<Vec<_>>>()?;

        assert_eq!(paged.len(), 6);
        assert_eq!(paged, whole);
        Ok(())
    }

    #[test]
    fn overestimate_stops_on_empty_chunk() -> Result<()> {
        let (store, query) = seeded_store(4)?;
        let exec = PaginatedQueryExecutor::new(&store, 2, CancelToken::new());
        let mut pages = exec.run(&query, 100);
        let rows = pages.by_ref().collect::<crate::error::Result<Vec<_>>>()?;
        assert_eq!(rows.len(), 4);
        assert_eq!(pages.chunks(), 3);
        Ok(())
    }

    #[test]
    fn rerunning_yields_the_same_rows() -> Result<()> {
        let (store, query) = seeded_store(5)?;
        let exec = PaginatedQueryExecutor::new(&store, 2, CancelToken::new());
        let a = exec.run(&query, 5).collect::<crate::error::Result<Vec<_>>>()?;
        let b = exec.run(&query, 5).collect::<crate::error::Result<Vec<_>>>()?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn cancellation_surfaces_between_chunks() -> Result<()> {
        let (store, query) = seeded_store(4)?;
        let cancel = CancelToken::new();
        let exec = PaginatedQueryExecutor::new(&store, 2, cancel.clone());
        let mut pages = exec.run(&query, 4);
        assert!(pages.next().unwrap().is_ok());
        assert!(pages.next().unwrap().is_ok());
        cancel.cancel();
        assert!(matches!(pages.next(), Some(Err(PipelineError::Cancelled))));
        assert!(pages.next().is_none());
        Ok(())
    }
}
