//! Object storage gateway metrics.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct StorageMetrics;

impl StorageMetrics {
    pub fn record_download(container: &str, bytes: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "storage", "downloads"),
            "container" => container.to_string()
        )
        .increment(1);
        ::metrics::histogram!(
            phase_metric!(histogram, "storage", "object_bytes"),
            "container" => container.to_string()
        )
        .record(bytes as f64);
    }

    pub fn record_upload(container: &str, bytes: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "storage", "uploads"),
            "container" => container.to_string()
        )
        .increment(1);
        ::metrics::histogram!(
            phase_metric!(histogram, "storage", "object_bytes"),
            "container" => container.to_string()
        )
        .record(bytes as f64);
    }

    /// Upload skipped because identical content was already stored.
    pub fn record_upload_skipped(container: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "storage", "uploads_skipped"),
            "container" => container.to_string()
        )
        .increment(1);
    }

    pub fn record_missing_artifact(container: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "storage", "missing_artifacts"),
            "container" => container.to_string()
        )
        .increment(1);
    }
}

impl PhaseMetrics for StorageMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        describe_counter!(phase_metric!(counter, "storage", "downloads"), "Objects downloaded");
        describe_counter!(phase_metric!(counter, "storage", "uploads"), "Objects uploaded");
        describe_counter!(
            phase_metric!(counter, "storage", "uploads_skipped"),
            "Uploads skipped because identical content was already stored"
        );
        describe_counter!(
            phase_metric!(counter, "storage", "missing_artifacts"),
            "Downloads that found no object"
        );
        describe_histogram!(
            phase_metric!(histogram, "storage", "object_bytes"),
            "Size of transferred objects in bytes"
        );
    }

    fn phase_name() -> &'static str {
        "storage"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "storage", "downloads"),
                metric_type: MetricType::Counter,
                help: "Objects downloaded",
                labels: vec!["container"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "uploads"),
                metric_type: MetricType::Counter,
                help: "Objects uploaded",
                labels: vec!["container"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "uploads_skipped"),
                metric_type: MetricType::Counter,
                help: "Uploads skipped because identical content was already stored",
                labels: vec!["container"],
            },
            MetricDoc {
                name: phase_metric!(counter, "storage", "missing_artifacts"),
                metric_type: MetricType::Counter,
                help: "Downloads that found no object",
                labels: vec!["container"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "storage", "object_bytes"),
                metric_type: MetricType::Histogram,
                help: "Size of transferred objects in bytes",
                labels: vec!["container"],
            },
        ]
    }
}
