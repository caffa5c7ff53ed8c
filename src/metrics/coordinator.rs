//! Pipeline coordinator metrics.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct CoordinatorMetrics;

impl CoordinatorMetrics {
    pub fn record_run(success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "failure" };
        ::metrics::counter!(phase_metric!(counter, "coordinator", "runs"), "result" => result).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "coordinator", "run_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_consistency_wait(duration_secs: f64) {
        ::metrics::histogram!(phase_metric!(histogram, "coordinator", "consistency_wait_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for CoordinatorMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "coordinator", "runs"),
            "Synchronous pipeline runs by result"
        );
        describe_histogram!(
            phase_metric!(histogram, "coordinator", "run_duration_seconds"),
            "Duration of a full synchronous run in seconds"
        );
        describe_histogram!(
            phase_metric!(histogram, "coordinator", "consistency_wait_seconds"),
            "Time spent waiting for the next stage input to become visible"
        );
    }

    fn phase_name() -> &'static str {
        "coordinator"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "coordinator", "runs"),
                metric_type: MetricType::Counter,
                help: "Synchronous pipeline runs by result",
                labels: vec!["result"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "coordinator", "run_duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Duration of a full synchronous run in seconds",
                labels: vec![],
            },
            MetricDoc {
                name: phase_metric!(histogram, "coordinator", "consistency_wait_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent waiting for the next stage input to become visible",
                labels: vec![],
            },
        ]
    }
}
