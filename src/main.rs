use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue};
use clap::{Args, Parser, Subcommand};
use reporting_api::config::{Config, StorageBackend};
use reporting_api::constants::REPORTS_MEDIA_TYPE;
use reporting_api::ingest::ReportIngester;
use reporting_api::normalize::normalize_request;
use reporting_api::server::{accept_batch, start_server, AppState};
use reporting_api::storage::{InMemoryStorage, ReportLogStore, ReportStore, SqliteStorage};
use reporting_api::{logging, metrics, schema};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "reporting_api")]
#[command(about = "Browser Reporting API ingestion endpoint")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct StorageArgs {
    /// Path to a TOML config file (defaults to ./reporting.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage backend: memory or sqlite
    #[arg(long)]
    storage: Option<StorageBackend>,

    /// SQLite database path
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP endpoint
    Serve {
        #[command(flatten)]
        storage: StorageArgs,

        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
    /// Ingest a reports JSON file through the same path as the endpoint
    Ingest {
        /// File holding a JSON array of reports or a {"data": [...]} object
        file: PathBuf,

        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Schema-check a reports payload file
    Validate { file: PathBuf },
    /// Print the generated batch JSON Schema
    Schema,
}

fn load_config(args: &StorageArgs) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(backend) = args.storage {
        config.storage.backend = backend;
    }
    if let Some(db) = &args.db {
        config.storage.path = db.clone();
    }
    Ok(config)
}

fn build_ingester(config: &Config) -> Result<ReportIngester> {
    let (reports, report_logs): (Arc<dyn ReportStore>, Arc<dyn ReportLogStore>) =
        match config.storage.backend {
            StorageBackend::Memory => {
                info!("Using in-memory report storage");
                let store = Arc::new(InMemoryStorage::new());
                (store.clone() as Arc<dyn ReportStore>, store as Arc<dyn ReportLogStore>)
            }
            StorageBackend::Sqlite => {
                info!("Using SQLite report storage at {}", config.storage.path.display());
                let store = Arc::new(SqliteStorage::open(&config.storage.path).with_context(|| {
                    format!("Failed to open database {}", config.storage.path.display())
                })?);
                (store.clone() as Arc<dyn ReportStore>, store as Arc<dyn ReportLogStore>)
            }
        };
    Ok(ReportIngester::new(reports, report_logs).with_dedup_query_limit(config.ingest.dedup_query_limit))
}

fn read_file(path: &PathBuf) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            storage,
            host,
            port,
        } => {
            let mut config = load_config(&storage)?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }

            metrics::init_metrics();
            let ingester = Arc::new(build_ingester(&config)?);
            let addr = config.bind_addr()?;
            start_server(AppState::new(ingester, config.server.max_body_bytes), addr)
                .await
                .context("HTTP server failed")?;
        }
        Commands::Ingest { file, storage } => {
            let config = load_config(&storage)?;
            let ingester = build_ingester(&config)?;

            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(REPORTS_MEDIA_TYPE));
            let normalized = normalize_request(headers, Bytes::from(read_file(&file)?));

            match accept_batch(&ingester, &normalized.headers, normalized.marker, &normalized.body).await {
                Ok(ids) => {
                    info!("Logged {} reports from {}", ids.len(), file.display());
                    println!("{}", serde_json::to_string_pretty(&ids)?);
                }
                Err(err) => {
                    error!("Ingest of {} failed: {}", file.display(), err);
                    eprintln!("{}", serde_json::to_string_pretty(&err.to_error_set())?);
                    std::process::exit(1);
                }
            }
        }
        Commands::Validate { file } => {
            let raw = read_file(&file)?;
            let payload: Value = serde_json::from_slice(&raw)
                .with_context(|| format!("Failed to parse JSON in {}", file.display()))?;
            // Accept the browser's bare array as well as the keyed form
            let payload = match payload {
                Value::Array(items) => serde_json::json!({ "data": items }),
                other => other,
            };

            match schema::parse_payload(payload) {
                Ok(entries) => println!("valid ({} reports)", entries.len()),
                Err(err) => {
                    eprintln!("invalid: {}", err);
                    if let schema::SchemaError::InvalidParam { reasons, .. } = &err {
                        for reason in reasons {
                            eprintln!("- {}", reason);
                        }
                    }
                    std::process::exit(1)
                }
            }
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&schema::batch_schema())?);
        }
    }
    Ok(())
}
