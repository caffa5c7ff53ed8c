//! Registration of every metrics group with conflict detection.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::HashMap;
use tracing::{info, warn};

pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::stages::StageMetrics>(&mut all_metrics);
    register_phase_metrics::<super::storage::StorageMetrics>(&mut all_metrics);
    register_phase_metrics::<super::bus::BusMetrics>(&mut all_metrics);
    register_phase_metrics::<super::coordinator::CoordinatorMetrics>(&mut all_metrics);

    info!("Registered {} total metrics", all_metrics.len());

    if std::env::var("ONTOPOP_METRICS_DEBUG").is_ok() {
        log_metrics_summary(&all_metrics);
    }
}

fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, (&'static str, MetricDoc)>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if let Some((owner, _)) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict: '{}' is defined by both '{}' and '{}'",
                doc.name, owner, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), (phase_name, doc));
        }
    }
}

fn log_metrics_summary(all_metrics: &HashMap<String, (&'static str, MetricDoc)>) {
    let mut by_phase: HashMap<&str, Vec<&MetricDoc>> = HashMap::new();
    for doc in all_metrics.values() {
        by_phase
            .entry(extract_phase_from_metric_name(doc.1.name))
            .or_default()
            .push(&doc.1);
    }
    for (phase, metrics) in by_phase {
        info!("Phase '{}': {} metrics", phase, metrics.len());
        for metric in metrics {
            info!("  - {} ({:?}): {}", metric.name, metric.metric_type, metric.help);
        }
    }
}

/// "ontopop_stage_messages_total" -> "stage"
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("ontopop_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BusMetrics, CoordinatorMetrics, StageMetrics, StorageMetrics};

    #[test]
    fn test_extract_phase_from_metric_name() {
        assert_eq!(extract_phase_from_metric_name("ontopop_stage_messages_total"), "stage");
        assert_eq!(extract_phase_from_metric_name("ontopop_bus_published_total"), "bus");
        assert_eq!(extract_phase_from_metric_name("invalid_metric_name"), "unknown");
    }

    #[test]
    fn documented_names_match_their_phase() {
        let groups = [
            (StageMetrics::phase_name(), StageMetrics::metrics_documentation()),
            (StorageMetrics::phase_name(), StorageMetrics::metrics_documentation()),
            (BusMetrics::phase_name(), BusMetrics::metrics_documentation()),
            (CoordinatorMetrics::phase_name(), CoordinatorMetrics::metrics_documentation()),
        ];
        let mut seen = std::collections::HashSet::new();
        for (phase, docs) in groups {
            for doc in docs {
                assert_eq!(extract_phase_from_metric_name(doc.name), phase);
                assert!(seen.insert(doc.name), "duplicate metric {}", doc.name);
            }
        }
    }
}
