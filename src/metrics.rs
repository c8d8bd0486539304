//! Prometheus metrics

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::models::ModelFamily;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a model load
pub fn record_model_loaded(family: ModelFamily, variant: &str) {
    metrics::counter!("scribe_manager_models_loaded_total",
        "family" => family.to_string(),
        "variant" => variant.to_string()
    )
    .increment(1);
}

/// Record a model eviction
pub fn record_model_evicted(family: ModelFamily) {
    metrics::counter!("scribe_manager_models_evicted_total",
        "family" => family.to_string()
    )
    .increment(1);
}

/// Update resident model count gauge
pub fn update_resident_count(count: usize) {
    metrics::gauge!("scribe_manager_models_resident").set(count as f64);
}

/// Record an accepted batch and its job count
pub fn record_batch(jobs: usize) {
    metrics::counter!("scribe_manager_batches_total").increment(1);
    metrics::counter!("scribe_manager_jobs_total").increment(jobs as u64);
}

/// Record one failed job
pub fn record_job_failure() {
    metrics::counter!("scribe_manager_job_failures_total").increment(1);
}
