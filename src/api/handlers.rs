//! API request handlers

use axum::{
    Json,
    extract::{Multipart, State},
    http::StatusCode,
};
use std::collections::BTreeMap;
use tokio::io::AsyncWriteExt;

use super::models::{DeviceResponse, HealthResponse, TranscribeForm};
use super::routes::AppState;
use crate::error::ScribeError;
use crate::models::ResidentModel;
use crate::pipeline::{JobInput, JobOutcome, Pipeline};

/// GET /health - Manager health check
pub async fn health() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// GET /device - Active compute device
pub async fn device(State(state): State<AppState>) -> Json<DeviceResponse> {
    Json(DeviceResponse {
        device: state.device.to_string(),
        compute_type: state.device.compute_type().to_string(),
    })
}

/// GET /models - Currently resident models
pub async fn list_models(State(state): State<AppState>) -> Json<Vec<ResidentModel>> {
    let resident = state.registry.resident().await;
    crate::metrics::update_resident_count(resident.len());
    Json(resident)
}

/// POST /transcribe-files - Run one batch of uploads through the pipeline
pub async fn transcribe_files(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<BTreeMap<usize, JobOutcome>>, ScribeError> {
    // Spool uploads to disk first; the tempdir lives until the batch is done
    let spool = tempfile::tempdir()
        .map_err(|e| anyhow::anyhow!("Failed to create upload directory: {e}"))?;
    let (options, jobs) = collect_batch(multipart, spool.path()).await?;

    tracing::info!(jobs = jobs.len(), "Batch accepted");
    crate::metrics::record_batch(jobs.len());

    // Model residency is global state; one batch mutates it at a time
    let _guard = state.pipeline_lock.lock().await;

    let pipeline = Pipeline::new(state.registry.clone(), state.probe.clone(), state.device);
    let outcomes = pipeline.run(&options, &jobs).await?;

    Ok(Json(outcomes))
}

async fn collect_batch(
    mut multipart: Multipart,
    spool: &std::path::Path,
) -> Result<(crate::pipeline::BatchOptions, Vec<JobInput>), ScribeError> {
    let mut form = TranscribeForm::default();
    let mut jobs = Vec::new();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ScribeError::Configuration(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "files" {
            let filename = field
                .file_name()
                .map(sanitize_filename)
                .filter(|f| !f.is_empty())
                .ok_or_else(|| {
                    ScribeError::Configuration("Uploaded file is missing a filename".to_string())
                })?;

            let path = spool.join(format!("{}-{filename}", jobs.len()));
            let mut file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to spool upload: {e}"))?;
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| ScribeError::Configuration(format!("Upload truncated: {e}")))?
            {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to spool upload: {e}"))?;
            }
            file.flush()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to spool upload: {e}"))?;

            jobs.push(JobInput { filename, path });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| ScribeError::Configuration(format!("Malformed form field: {e}")))?;
            form.set(&name, value)?;
        }
    }

    Ok((form.into_options()?, jobs))
}

/// Strip any client-supplied directory components
fn sanitize_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw).to_string()
}
