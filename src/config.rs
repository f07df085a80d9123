use crate::constants::{
    DEFAULT_DB_PATH, DEFAULT_DEDUP_QUERY_LIMIT, DEFAULT_HOST, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT,
};
use crate::error::{ReportingError, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

impl FromStr for StorageBackend {
    type Err = ReportingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(ReportingError::Config(format!(
                "unknown storage backend '{}' (expected 'memory' or 'sqlite')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Upper bound on existing reports fetched to seed a batch's dedup index
    pub dedup_query_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dedup_query_limit: DEFAULT_DEDUP_QUERY_LIMIT,
        }
    }
}

impl Config {
    /// Load `path` if given, otherwise `reporting.toml` when present, then apply env overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("reporting.toml").exists() => Self::from_file(Path::new("reporting.toml"))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReportingError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override settings from `REPORTING_API_*` variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("REPORTING_API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("REPORTING_API_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ReportingError::Config(format!("invalid REPORTING_API_PORT '{}'", port)))?;
        }
        if let Some(backend) = lookup("REPORTING_API_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(db) = lookup("REPORTING_API_DB") {
            self.storage.path = PathBuf::from(db);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                ReportingError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    self.server.host, self.server.port, e
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.ingest.dedup_query_limit, 100);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("REPORTING_API_PORT", "7070"),
            ("REPORTING_API_STORAGE", "memory"),
            ("REPORTING_API_DB", "/tmp/r.db"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.server.port, 7070);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/r.db"));
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_env(|k| (k == "REPORTING_API_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(matches!(err, ReportingError::Config(_)));
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().port(), DEFAULT_PORT);
    }
}
