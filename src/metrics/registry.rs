//! Registration of all phase metrics with conflict detection

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::ingest::IngestMetrics>(&mut all_metrics);

    info!("Registered {} total metrics", all_metrics.len());
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, MetricDoc>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if phase_of(doc.name) != phase_name {
            warn!("Metric '{}' does not carry its phase prefix '{}'", doc.name, phase_name);
        }
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' registered twice (phase '{}')",
                doc.name, phase_name
            );
        } else {
            all_metrics.insert(doc.name, doc);
        }
    }
}

/// Extract phase name from metric name (e.g. "reporting_ingest_batches_total" -> "ingest")
pub fn phase_of(metric_name: &str) -> &str {
    metric_name
        .strip_prefix("reporting_")
        .and_then(|rest| rest.split('_').next())
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_of() {
        assert_eq!(phase_of("reporting_ingest_batches_total"), "ingest");
        assert_eq!(phase_of("invalid_metric_name"), "unknown");
    }
}
