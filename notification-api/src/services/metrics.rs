//! Metrics collection for notification-api.
//!
//! Counters go through the `metrics` facade; `/metrics` renders them in
//! Prometheus text format.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use service_core::error::AppError;
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.
pub fn init_metrics() -> Result<(), AppError> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("failed to install Prometheus recorder: {}", e))
    })?;

    METRICS_HANDLE.set(handle).map_err(|_| {
        AppError::ConfigError(anyhow::anyhow!("metrics handle already initialized"))
    })
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_notifications_listed(count: usize) {
    metrics::counter!("notifications_list_requests_total").increment(1);
    metrics::histogram!("notifications_listed_per_request").record(count as f64);
}

pub fn record_notification_acknowledged(found: bool) {
    let outcome = if found { "read" } else { "not_found" };
    metrics::counter!("notifications_acknowledged_total", "outcome" => outcome).increment(1);
}
