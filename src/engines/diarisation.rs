//! Diarisation engine adapters
//!
//! Both strategies return speaker-tagged segments. A runner may signal
//! failure as a bare `false` or `{"ok": false}`; either becomes a
//! [`JobError`], never an empty success.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use super::runner::ModelRunner;
use super::transcription::error_message;
use crate::error::JobError;
use crate::models::{Diariser, Segment};

/// Speaker-embedding + agglomerative-clustering strategy
pub struct ClusteringEngine {
    runner: Arc<ModelRunner>,
}

impl ClusteringEngine {
    pub fn new(runner: Arc<ModelRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Diariser for ClusteringEngine {
    async fn diarise(
        &self,
        path: &Path,
        segments: &[Segment],
        num_speakers: u32,
    ) -> Result<Vec<Segment>, JobError> {
        let request = json!({
            "op": "diarise",
            "path": path,
            "segments": segments,
            "num_speakers": num_speakers,
        });
        let response = self
            .runner
            .call(&request)
            .await
            .map_err(|e| JobError::Diarisation(e.to_string()))?;

        parse_segments(&response)
    }
}

/// End-to-end diarisation pipeline strategy
pub struct PipelineEngine {
    runner: Arc<ModelRunner>,
}

impl PipelineEngine {
    pub fn new(runner: Arc<ModelRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Diariser for PipelineEngine {
    async fn diarise(
        &self,
        path: &Path,
        segments: &[Segment],
        num_speakers: u32,
    ) -> Result<Vec<Segment>, JobError> {
        // The pipeline runs on the audio itself; min and max speakers are
        // pinned to the requested count.
        let request = json!({
            "op": "diarise",
            "path": path,
            "segments": segments,
            "min_speakers": num_speakers,
            "max_speakers": num_speakers,
        });
        let response = self
            .runner
            .call(&request)
            .await
            .map_err(|e| JobError::Diarisation(e.to_string()))?;

        parse_segments(&response)
    }
}

fn parse_segments(response: &Value) -> Result<Vec<Segment>, JobError> {
    if response.as_bool() == Some(false)
        || response.get("ok").and_then(Value::as_bool) == Some(false)
    {
        return Err(JobError::Diarisation(error_message(response)));
    }

    serde_json::from_value(response.get("segments").cloned().unwrap_or(Value::Null))
        .map_err(|e| JobError::Diarisation(format!("malformed runner response: {e}")))
}
