//! Error types for batch-level and per-job failures

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::ModelFamily;

pub type ScribeResult<T> = Result<T, ScribeError>;

/// Batch-level errors. These abort the whole request before any per-job
/// state is produced.
#[derive(Debug, Error)]
pub enum ScribeError {
    /// Invalid or incompatible request options, detected before any load.
    #[error("{0}")]
    Configuration(String),

    /// A model constructor failed. Fatal to the batch: no job can proceed
    /// without the model.
    #[error("Failed to load {family} model: {message}")]
    ModelLoad {
        family: ModelFamily,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ScribeError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ScribeError::Configuration(msg) => (StatusCode::BAD_REQUEST, msg),
            ScribeError::ModelLoad { family, message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to load {family} model: {message}"),
            ),
            ScribeError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

/// Per-job errors. Isolated to one job's result entry and never abort the
/// batch or affect sibling jobs.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Error transcribing audio: {0}")]
    Transcription(String),

    #[error("Error diarising audio: {0}")]
    Diarisation(String),

    #[error("Diarisation cannot be performed on stereo audio.")]
    StereoAudio,

    #[error("Error auditing transcript: {0}")]
    Audit(String),

    #[error("Error reading audio file: {0}")]
    Io(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}
