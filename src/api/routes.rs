//! API route definitions

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use crate::audio::AudioProbe;
use crate::device::DeviceKind;
use crate::models::ModelRegistry;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub probe: Arc<dyn AudioProbe>,
    pub device: DeviceKind,
    /// One batch at a time; concurrent requests queue here
    pub pipeline_lock: Arc<tokio::sync::Mutex<()>>,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Create the main API router
pub fn create_router(state: AppState, max_upload_mb: usize) -> Router {
    Router::new()
        // Health and status
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/device", get(handlers::device))
        // Model residency
        .route("/models", get(handlers::list_models))
        // Batch transcription
        .route("/transcribe-files", post(handlers::transcribe_files))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024)),
        )
}
