pub mod join;
pub mod paginate;

pub use join::{
    ColumnRef, JoinQuery, JoinQueryBuilder, SegmentCatalog, SegmentSchema, Source,
    GEO_IDENTIFIERS,
};
pub use paginate::{PaginatedQueryExecutor, Pages};
