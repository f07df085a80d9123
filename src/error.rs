use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportingError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("HTTP server error: {0}")]
    Server(#[from] hyper::Error),
}

impl From<rusqlite::Error> for ReportingError {
    fn from(err: rusqlite::Error) -> Self {
        ReportingError::Database {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportingError>;
