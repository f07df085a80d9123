/// Media type browsers use when delivering Reporting API batches
pub const REPORTS_MEDIA_TYPE: &str = "application/reports+json";

/// Media type the JSON body parser understands
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Full path of the ingestion endpoint
pub const REPORTING_ROUTE: &str = "/reporting-api/v1/reporting";

/// Name of the request parameter holding the batch of entries
pub const BATCH_PARAM: &str = "data";

/// Upper bound on existing reports fetched to seed a batch's dedup index
pub const DEFAULT_DEDUP_QUERY_LIMIT: usize = 100;

/// Default cap on buffered request bodies (1 MiB)
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "data/reports.db";

