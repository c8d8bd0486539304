//! Capability contracts for the external model collaborators
//!
//! The transcription, diarisation and audit engines are opaque: the core
//! only sees these traits. Production implementations live in
//! [`crate::engines`]; tests substitute their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::error::JobError;

/// One timed span of transcribed speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// Assigned by diarisation; serialized as null when absent, matching
    /// the response shape clients already consume.
    #[serde(default)]
    pub speaker: Option<String>,
}

/// Transcription output for one audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<Segment>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<Transcript, JobError>;
}

#[async_trait]
pub trait Diariser: Send + Sync {
    /// Assign speakers to transcribed segments. Implementations must
    /// surface engine failure as an error, never as an empty segment list.
    async fn diarise(
        &self,
        path: &Path,
        segments: &[Segment],
        num_speakers: u32,
    ) -> Result<Vec<Segment>, JobError>;
}

#[async_trait]
pub trait Auditor: Send + Sync {
    async fn audit(&self, transcript: &str, criteria: &str) -> Result<String, JobError>;
}

/// Handle to one loaded model, tagged by capability
#[derive(Clone)]
pub enum ModelHandle {
    Transcriber(Arc<dyn Transcriber>),
    Diariser(Arc<dyn Diariser>),
    Auditor(Arc<dyn Auditor>),
}

impl ModelHandle {
    pub fn as_transcriber(&self) -> Option<Arc<dyn Transcriber>> {
        match self {
            Self::Transcriber(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn as_diariser(&self) -> Option<Arc<dyn Diariser>> {
        match self {
            Self::Diariser(d) => Some(d.clone()),
            _ => None,
        }
    }

    pub fn as_auditor(&self) -> Option<Arc<dyn Auditor>> {
        match self {
            Self::Auditor(a) => Some(a.clone()),
            _ => None,
        }
    }

    fn capability(&self) -> &'static str {
        match self {
            Self::Transcriber(_) => "transcriber",
            Self::Diariser(_) => "diariser",
            Self::Auditor(_) => "auditor",
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModelHandle").field(&self.capability()).finish()
    }
}
