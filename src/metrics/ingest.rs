//! Ingest Phase Metrics
//!
//! Batches and entries received, reports created or reused, logs written and
//! per-entry failures.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

/// Metrics collection for the batch ingester
pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_batch_received(entries: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "batches")).increment(1);
        ::metrics::counter!(phase_metric!(counter, "ingest", "entries"))
            .increment(entries as u64);
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "batch_size"))
            .record(entries as f64);
    }

    pub fn record_report_created() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "reports_created")).increment(1);
    }

    /// An entry resolved to a report already in the dedup index
    pub fn record_report_reused() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "reports_reused")).increment(1);
    }

    pub fn record_log_created() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "logs_created")).increment(1);
    }

    pub fn record_entry_error(code: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "ingest", "entry_errors"),
            "code" => code.to_string()
        )
        .increment(1);
    }

    pub fn record_batch_duration(duration_secs: f64) {
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "batch_duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use ::metrics::{describe_counter, describe_histogram};

        for doc in Self::metrics_documentation() {
            match doc.metric_type {
                MetricType::Counter => describe_counter!(doc.name, doc.help),
                MetricType::Histogram => describe_histogram!(doc.name, doc.help),
            }
        }
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "batches"),
                metric_type: MetricType::Counter,
                help: "Total number of report batches received",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "entries"),
                metric_type: MetricType::Counter,
                help: "Total number of report entries received",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "reports_created"),
                metric_type: MetricType::Counter,
                help: "Total number of canonical reports created",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "reports_reused"),
                metric_type: MetricType::Counter,
                help: "Total number of entries deduplicated onto an existing report",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "logs_created"),
                metric_type: MetricType::Counter,
                help: "Total number of report logs written",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "entry_errors"),
                metric_type: MetricType::Counter,
                help: "Total number of entries that failed, by error code",
                labels: vec!["code"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "batch_size"),
                metric_type: MetricType::Histogram,
                help: "Number of entries per batch",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "batch_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent processing a batch",
                labels: vec![],
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_metrics_carry_phase_prefix() {
        for doc in IngestMetrics::metrics_documentation() {
            assert!(doc.name.starts_with("reporting_ingest_"), "{}", doc.name);
        }
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        IngestMetrics::record_batch_received(3);
        IngestMetrics::record_entry_error("empty_report_body");
        IngestMetrics::record_batch_duration(0.01);
    }
}
