//! Metrics for the report ingestion service
//!
//! Each stage defines its metrics in a dedicated submodule and implements
//! [`PhaseMetrics`] so names and descriptions are registered once at startup.

pub mod ingest;
pub mod registry;

pub use ingest::IngestMetrics;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and register all phase metrics.
///
/// Idempotent. Rendering happens in-process through [`render`], which the
/// HTTP server exposes on `/metrics`.
pub fn init_metrics() -> Option<PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle.clone());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let handle = HANDLE.get_or_init(|| handle).clone();
            registry::register_all_metrics();
            info!("Prometheus recorder installed");
            Some(handle)
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Render the current metrics snapshot in Prometheus text format
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Describe every metric of this phase to the recorder
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Builds metric names following `reporting_{phase}_{name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("reporting_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("reporting_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
