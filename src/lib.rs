pub mod archive;
pub mod cancel;
pub mod config;
pub mod error;
pub mod geo;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod segment;
pub mod store;
pub mod utils;

pub use cancel::CancelToken;
pub use config::{Config, SegmentMatch};
pub use error::{PipelineError, Result};
pub use pipeline::{run, RunReport};
