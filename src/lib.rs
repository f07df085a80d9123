pub mod canonical;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod response;
pub mod schema;
pub mod server;
pub mod storage;

pub use error::{ReportingError, Result};
