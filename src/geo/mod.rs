pub mod decode;
pub mod filter;
pub mod layout;

pub use decode::{FixedWidthDecoder, GeoRecord};
pub use filter::{FilterOutcome, GeoFilter, RecordBounds};
pub use layout::{GeoField, GEO_FIELDS, RECORD_WIDTH};
