//! Prometheus metrics for the ontology pipeline.
//!
//! Each concern (stages, object storage, message bus, coordinator) owns its
//! metric names in a dedicated submodule and registers them at startup.

pub mod bus;
pub mod coordinator;
pub mod registry;
pub mod stages;
pub mod storage;

pub use bus::BusMetrics;
pub use coordinator::CoordinatorMetrics;
pub use stages::StageMetrics;
pub use storage::StorageMetrics;

use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus recorder and register every metric. Idempotent.
///
/// The HTTP exporter only starts when `ONTOPOP_METRICS_ADDR` is set; without
/// it metrics are still recorded in-process.
pub fn init_metrics() {
    INIT.call_once(|| {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let installed = match std::env::var("ONTOPOP_METRICS_ADDR").ok() {
            Some(addr_str) => match addr_str.parse::<std::net::SocketAddr>() {
                Ok(addr) => {
                    let result = builder.with_http_listener(addr).install();
                    if result.is_ok() {
                        info!("Prometheus HTTP exporter started at http://{}/metrics", addr);
                    }
                    result.map(|_| ())
                }
                Err(_) => {
                    warn!("Invalid metrics addr '{}', exporter disabled", addr_str);
                    metrics_exporter_prometheus::PrometheusBuilder::new()
                        .install_recorder()
                        .map(|_| ())
                }
            },
            None => builder.install_recorder().map(|_| ()),
        };

        match installed {
            Ok(()) => {
                registry::register_all_metrics();
                info!("All pipeline metrics registered");
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

/// Implemented by every metrics group so the registry can describe its
/// metrics and detect name clashes.
pub trait PhaseMetrics {
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    #[allow(dead_code)]
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Metric names follow `ontopop_{phase}_{name}` with a `_total` suffix on
/// counters.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("ontopop_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("ontopop_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("ontopop_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_naming_convention() {
        assert_eq!(
            phase_metric!(counter, "stage", "messages"),
            "ontopop_stage_messages_total"
        );
        assert_eq!(
            phase_metric!(histogram, "stage", "duration_seconds"),
            "ontopop_stage_duration_seconds"
        );
        assert_eq!(
            phase_metric!(gauge, "coordinator", "runs_in_flight"),
            "ontopop_coordinator_runs_in_flight"
        );
    }
}
