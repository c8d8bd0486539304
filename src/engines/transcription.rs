//! Transcription engine adapters

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use super::runner::ModelRunner;
use crate::error::JobError;
use crate::models::{Transcriber, Transcript};

/// Plain Whisper runner: transcription only, no alignment pass
pub struct WhisperEngine {
    runner: Arc<ModelRunner>,
}

impl WhisperEngine {
    pub fn new(runner: Arc<ModelRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Transcriber for WhisperEngine {
    async fn transcribe(&self, path: &Path) -> Result<Transcript, JobError> {
        let request = json!({"op": "transcribe", "path": path});
        let response = self
            .runner
            .call(&request)
            .await
            .map_err(|e| JobError::Transcription(e.to_string()))?;

        parse_transcript(&response)
    }
}

/// WhisperX runner: batched transcription with word alignment
pub struct WhisperXEngine {
    runner: Arc<ModelRunner>,
    batch_size: u32,
}

impl WhisperXEngine {
    pub fn new(runner: Arc<ModelRunner>, batch_size: u32) -> Self {
        Self { runner, batch_size }
    }
}

#[async_trait]
impl Transcriber for WhisperXEngine {
    async fn transcribe(&self, path: &Path) -> Result<Transcript, JobError> {
        let request = json!({
            "op": "transcribe",
            "path": path,
            "batch_size": self.batch_size,
            "align": true,
        });
        let response = self
            .runner
            .call(&request)
            .await
            .map_err(|e| JobError::Transcription(e.to_string()))?;

        parse_transcript(&response)
    }
}

fn parse_transcript(response: &Value) -> Result<Transcript, JobError> {
    if response.get("ok").and_then(Value::as_bool) == Some(false) {
        return Err(JobError::Transcription(error_message(response)));
    }

    serde_json::from_value(response.get("transcript").cloned().unwrap_or(Value::Null))
        .map_err(|e| JobError::Transcription(format!("malformed runner response: {e}")))
}

pub(super) fn error_message(response: &Value) -> String {
    response
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown runner error")
        .to_string()
}
