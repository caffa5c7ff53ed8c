//! Message bus and consumer metrics.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct BusMetrics;

impl BusMetrics {
    pub fn record_published(channel: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "bus", "published"),
            "channel" => channel.to_string()
        )
        .increment(1);
    }

    pub fn record_delivered(channel: &str, consumer: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "bus", "delivered"),
            "channel" => channel.to_string(),
            "consumer" => consumer.to_string()
        )
        .increment(1);
    }

    pub fn record_retried(consumer: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "bus", "retried"),
            "consumer" => consumer.to_string()
        )
        .increment(1);
    }

    pub fn record_dead_lettered(consumer: &str) {
        ::metrics::counter!(
            phase_metric!(counter, "bus", "dead_lettered"),
            "consumer" => consumer.to_string()
        )
        .increment(1);
    }
}

impl PhaseMetrics for BusMetrics {
    fn register_metrics() {
        use metrics::describe_counter;

        describe_counter!(phase_metric!(counter, "bus", "published"), "Messages published");
        describe_counter!(phase_metric!(counter, "bus", "delivered"), "Messages delivered to a consumer");
        describe_counter!(phase_metric!(counter, "bus", "retried"), "Redelivery attempts after a transient failure");
        describe_counter!(phase_metric!(counter, "bus", "dead_lettered"), "Messages moved to the dead-letter channel");
    }

    fn phase_name() -> &'static str {
        "bus"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "bus", "published"),
                metric_type: MetricType::Counter,
                help: "Messages published",
                labels: vec!["channel"],
            },
            MetricDoc {
                name: phase_metric!(counter, "bus", "delivered"),
                metric_type: MetricType::Counter,
                help: "Messages delivered to a consumer",
                labels: vec!["channel", "consumer"],
            },
            MetricDoc {
                name: phase_metric!(counter, "bus", "retried"),
                metric_type: MetricType::Counter,
                help: "Redelivery attempts after a transient failure",
                labels: vec!["consumer"],
            },
            MetricDoc {
                name: phase_metric!(counter, "bus", "dead_lettered"),
                metric_type: MetricType::Counter,
                help: "Messages moved to the dead-letter channel",
                labels: vec!["consumer"],
            },
        ]
    }
}
