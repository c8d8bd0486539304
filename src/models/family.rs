//! Model family and variant identity

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Logical model family. At most one variant of each family may be
/// resident at a time, and families whose memory footprints cannot
/// coexist never share the device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Plain Whisper transcription
    Whisper,
    /// Batched WhisperX transcription with alignment
    WhisperX,
    /// Embedding + agglomerative clustering diarisation
    Clustering,
    /// WhisperX diarisation pipeline
    DiarisationPipeline,
    /// LLM used for transcript auditing
    AuditLlm,
}

impl ModelFamily {
    /// The two transcription engines
    pub const TRANSCRIPTION: [ModelFamily; 2] = [Self::Whisper, Self::WhisperX];

    /// The two diarisation strategies
    pub const DIARISATION: [ModelFamily; 2] = [Self::Clustering, Self::DiarisationPipeline];

    /// Families that cannot share the device with this one. The audit LLM
    /// is assumed to need the whole memory budget, so it conflicts with
    /// every other family.
    pub fn conflicts_with(self) -> &'static [ModelFamily] {
        match self {
            Self::Whisper => &[Self::WhisperX, Self::AuditLlm],
            Self::WhisperX => &[Self::Whisper, Self::AuditLlm],
            Self::Clustering => &[Self::DiarisationPipeline, Self::AuditLlm],
            Self::DiarisationPipeline => &[Self::Clustering, Self::AuditLlm],
            Self::AuditLlm => &[
                Self::Whisper,
                Self::WhisperX,
                Self::Clustering,
                Self::DiarisationPipeline,
            ],
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whisper => write!(f, "whisper"),
            Self::WhisperX => write!(f, "whisper_x"),
            Self::Clustering => write!(f, "clustering"),
            Self::DiarisationPipeline => write!(f, "diarisation_pipeline"),
            Self::AuditLlm => write!(f, "audit_llm"),
        }
    }
}

/// Size variant of a transcription model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSize {
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(Self::Base),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            other => Err(format!("unknown model size '{other}'")),
        }
    }
}
