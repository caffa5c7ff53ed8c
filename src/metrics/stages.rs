//! Per-stage processing metrics, labelled by stage name.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct StageMetrics;

impl StageMetrics {
    /// One processed message and how it ended: completed, skipped,
    /// superseded, rejected or failed.
    pub fn record_outcome(stage: &str, outcome: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "stage", "messages"),
            "stage" => stage.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }

    pub fn record_duration(stage: &str, duration_secs: f64) {
        ::metrics::histogram!(
            phase_metric!(histogram, "stage", "duration_seconds"),
            "stage" => stage.to_string()
        )
        .record(duration_secs);
    }

    pub fn record_failure(stage: &str, error_kind: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "stage", "failures"),
            "stage" => stage.to_string(),
            "kind" => error_kind.to_string()
        )
        .increment(1);
    }

    /// Entities extracted or written by a stage (classes, vertices, documents).
    pub fn record_entities(stage: &str, entity: &str, count: usize) {
        ::metrics::counter!(
            phase_metric!(counter, "stage", "entities"),
            "stage" => stage.to_string(),
            "entity" => entity.to_string()
        )
        .increment(count as u64);
    }
}

impl PhaseMetrics for StageMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "stage", "messages"),
            "Messages processed by a pipeline stage, by outcome"
        );
        describe_counter!(
            phase_metric!(counter, "stage", "failures"),
            "Stage failures by error kind"
        );
        describe_counter!(
            phase_metric!(counter, "stage", "entities"),
            "Ontology entities handled by a stage"
        );
        describe_histogram!(
            phase_metric!(histogram, "stage", "duration_seconds"),
            "Wall time of one stage run in seconds"
        );
    }

    fn phase_name() -> &'static str {
        "stage"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "stage", "messages"),
                metric_type: MetricType::Counter,
                help: "Messages processed by a pipeline stage, by outcome",
                labels: vec!["stage", "outcome"],
            },
            MetricDoc {
                name: phase_metric!(counter, "stage", "failures"),
                metric_type: MetricType::Counter,
                help: "Stage failures by error kind",
                labels: vec!["stage", "kind"],
            },
            MetricDoc {
                name: phase_metric!(counter, "stage", "entities"),
                metric_type: MetricType::Counter,
                help: "Ontology entities handled by a stage",
                labels: vec!["stage", "entity"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "stage", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of one stage run in seconds",
                labels: vec!["stage"],
            },
        ]
    }
}
