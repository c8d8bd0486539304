//! Batch pipeline
//!
//! Phase-ordered orchestration of one batch: transcription setup,
//! diarisation setup, per-job execution, optional audit. Phases never run
//! backwards within a batch, and each phase leaves only the models it
//! needs resident.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::audio::AudioProbe;
use crate::device::DeviceKind;
use crate::error::{JobError, ScribeError};
use crate::models::{
    Diariser, LoadSpec, ModelFamily, ModelRegistry, ModelSize, Segment, Transcriber,
};

/// Which transcription engine a request selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionMethod {
    Whisper,
    WhisperX,
}

impl TranscriptionMethod {
    pub fn family(self) -> ModelFamily {
        match self {
            Self::Whisper => ModelFamily::Whisper,
            Self::WhisperX => ModelFamily::WhisperX,
        }
    }

    /// The transcription family this request does not use
    pub fn unused_family(self) -> ModelFamily {
        match self {
            Self::Whisper => ModelFamily::WhisperX,
            Self::WhisperX => ModelFamily::Whisper,
        }
    }
}

impl FromStr for TranscriptionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "whisper" => Ok(Self::Whisper),
            "whisperx" | "whisper_x" => Ok(Self::WhisperX),
            other => Err(format!("unknown transcription method '{other}'")),
        }
    }
}

/// Which diarisation strategy a request selects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiarisationMethod {
    Clustering,
    Pipeline,
}

impl DiarisationMethod {
    pub fn family(self) -> ModelFamily {
        match self {
            Self::Clustering => ModelFamily::Clustering,
            Self::Pipeline => ModelFamily::DiarisationPipeline,
        }
    }

    pub fn unused_family(self) -> ModelFamily {
        match self {
            Self::Clustering => ModelFamily::DiarisationPipeline,
            Self::Pipeline => ModelFamily::Clustering,
        }
    }
}

impl FromStr for DiarisationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "clustering" => Ok(Self::Clustering),
            "pipeline" | "whisperx_pipeline" => Ok(Self::Pipeline),
            other => Err(format!("unknown diarisation method '{other}'")),
        }
    }
}

/// Transcription/diarisation combinations that cannot run together:
/// the diarisation pipeline needs WhisperX's aligned output.
const INCOMPATIBLE: &[(TranscriptionMethod, DiarisationMethod)] =
    &[(TranscriptionMethod::Whisper, DiarisationMethod::Pipeline)];

/// Options shared by every job in a batch
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub model_size: ModelSize,
    pub transcription_method: TranscriptionMethod,
    pub diarisation: bool,
    pub diarisation_method: DiarisationMethod,
    pub num_speakers: u32,
    pub audit: bool,
    pub criteria: String,
}

/// One uploaded audio file, spooled to disk
#[derive(Debug, Clone)]
pub struct JobInput {
    pub filename: String,
    pub path: PathBuf,
}

/// Audit verdict attached to a successful job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AuditOutcome {
    Text(String),
    Error { error: String },
}

/// Result entry for one job
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JobOutcome {
    Success {
        filename: String,
        language: String,
        segments: Vec<Segment>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<AuditOutcome>,
    },
    Failure {
        filename: String,
        error: String,
    },
}

/// Orchestrates one batch at a time against the shared registry
pub struct Pipeline {
    registry: Arc<ModelRegistry>,
    probe: Arc<dyn AudioProbe>,
    device: DeviceKind,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ModelRegistry>,
        probe: Arc<dyn AudioProbe>,
        device: DeviceKind,
    ) -> Self {
        Self {
            registry,
            probe,
            device,
        }
    }

    /// Run one batch through the phase sequence. Output keys are 1-based
    /// job indices in upload order.
    pub async fn run(
        &self,
        options: &BatchOptions,
        jobs: &[JobInput],
    ) -> Result<BTreeMap<usize, JobOutcome>, ScribeError> {
        validate(options, jobs)?;

        let transcriber = self.setup_transcription(options).await?;
        let diariser = self.setup_diarisation(options).await?;

        let mut outcomes = BTreeMap::new();
        for (index, job) in jobs.iter().enumerate() {
            let outcome = match self
                .run_job(options, job, &transcriber, diariser.as_ref())
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(
                        job = index + 1,
                        filename = %job.filename,
                        error = %e,
                        "Job failed"
                    );
                    crate::metrics::record_job_failure();
                    JobOutcome::Failure {
                        filename: job.filename.clone(),
                        error: e.to_string(),
                    }
                }
            };
            outcomes.insert(index + 1, outcome);
        }

        // These clones keep their runner processes alive even after the
        // registry evicts the entries; the audit model cannot load while
        // they exist.
        drop(transcriber);
        drop(diariser);

        if options.audit {
            self.run_audit(options, &mut outcomes).await?;
        }

        Ok(outcomes)
    }

    async fn setup_transcription(
        &self,
        options: &BatchOptions,
    ) -> Result<Arc<dyn Transcriber>, ScribeError> {
        let family = options.transcription_method.family();

        self.registry
            .evict(&[options.transcription_method.unused_family()])
            .await;

        let handle = self
            .registry
            .load(LoadSpec {
                family,
                size: Some(options.model_size),
                device: self.device,
            })
            .await?;

        handle.as_transcriber().ok_or_else(|| ScribeError::ModelLoad {
            family,
            message: "loaded model does not transcribe".to_string(),
        })
    }

    async fn setup_diarisation(
        &self,
        options: &BatchOptions,
    ) -> Result<Option<Arc<dyn Diariser>>, ScribeError> {
        if !options.diarisation {
            // Stale diarisation models must not linger across requests
            self.registry.evict(&ModelFamily::DIARISATION).await;
            return Ok(None);
        }

        let family = options.diarisation_method.family();

        self.registry
            .evict(&[options.diarisation_method.unused_family()])
            .await;

        let handle = self
            .registry
            .load(LoadSpec {
                family,
                size: None,
                device: self.device,
            })
            .await?;

        let diariser = handle.as_diariser().ok_or_else(|| ScribeError::ModelLoad {
            family,
            message: "loaded model does not diarise".to_string(),
        })?;

        Ok(Some(diariser))
    }

    async fn run_job(
        &self,
        options: &BatchOptions,
        job: &JobInput,
        transcriber: &Arc<dyn Transcriber>,
        diariser: Option<&Arc<dyn Diariser>>,
    ) -> Result<JobOutcome, JobError> {
        if options.diarisation && self.probe.is_stereo(&job.path).await {
            return Err(JobError::StereoAudio);
        }

        let transcript = transcriber.transcribe(&job.path).await?;

        let segments = match diariser {
            Some(diariser) => {
                diariser
                    .diarise(&job.path, &transcript.segments, options.num_speakers)
                    .await?
            }
            None => transcript.segments,
        };

        Ok(JobOutcome::Success {
            filename: job.filename.clone(),
            language: transcript.language,
            segments,
            result: None,
        })
    }

    /// Audit phase: the LLM is assumed to need the whole memory budget, so
    /// everything else is evicted before it loads, and it is evicted again
    /// once the batch is audited.
    async fn run_audit(
        &self,
        options: &BatchOptions,
        outcomes: &mut BTreeMap<usize, JobOutcome>,
    ) -> Result<(), ScribeError> {
        self.registry.evict_all().await;

        let handle = self
            .registry
            .load(LoadSpec {
                family: ModelFamily::AuditLlm,
                size: None,
                device: self.device,
            })
            .await?;
        let auditor = handle.as_auditor().ok_or_else(|| ScribeError::ModelLoad {
            family: ModelFamily::AuditLlm,
            message: "loaded model does not audit".to_string(),
        })?;

        for (index, outcome) in outcomes.iter_mut() {
            let JobOutcome::Success {
                segments, result, ..
            } = outcome
            else {
                continue;
            };

            let formatted = format_transcript(segments);
            *result = Some(match auditor.audit(&formatted, &options.criteria).await {
                Ok(text) => AuditOutcome::Text(text),
                Err(e) => {
                    tracing::warn!(job = *index, error = %e, "Audit failed");
                    crate::metrics::record_job_failure();
                    AuditOutcome::Error {
                        error: e.to_string(),
                    }
                }
            });
        }

        self.registry.evict(&[ModelFamily::AuditLlm]).await;
        Ok(())
    }
}

fn validate(options: &BatchOptions, jobs: &[JobInput]) -> Result<(), ScribeError> {
    if jobs.is_empty() {
        return Err(ScribeError::Configuration("No files uploaded".to_string()));
    }

    if options.diarisation
        && INCOMPATIBLE.contains(&(options.transcription_method, options.diarisation_method))
    {
        return Err(ScribeError::Configuration(
            "The diarisation pipeline cannot be used with the whisper model. \
             Please use a different transcription and diarisation configuration"
                .to_string(),
        ));
    }

    if options.audit && options.criteria.trim().is_empty() {
        return Err(ScribeError::Configuration(
            "Audit requested without criteria".to_string(),
        ));
    }

    Ok(())
}

/// "SPEAKER_00: text" lines fed to the auditor
fn format_transcript(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|segment| {
            format!(
                "{}: {}",
                segment.speaker.as_deref().unwrap_or("UNKNOWN"),
                segment.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> BatchOptions {
        BatchOptions {
            model_size: ModelSize::Base,
            transcription_method: TranscriptionMethod::WhisperX,
            diarisation: false,
            diarisation_method: DiarisationMethod::Clustering,
            num_speakers: 2,
            audit: false,
            criteria: String::new(),
        }
    }

    fn job(name: &str) -> JobInput {
        JobInput {
            filename: name.to_string(),
            path: PathBuf::from(format!("/tmp/{name}")),
        }
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = validate(&options(), &[]).unwrap_err();
        assert!(matches!(err, ScribeError::Configuration(_)));
    }

    #[test]
    fn test_incompatible_combination_rejected() {
        let opts = BatchOptions {
            transcription_method: TranscriptionMethod::Whisper,
            diarisation: true,
            diarisation_method: DiarisationMethod::Pipeline,
            ..options()
        };
        let err = validate(&opts, &[job("a.wav")]).unwrap_err();
        assert!(matches!(err, ScribeError::Configuration(_)));
    }

    #[test]
    fn test_incompatible_combination_allowed_without_diarisation() {
        // The combination only matters when diarisation actually runs
        let opts = BatchOptions {
            transcription_method: TranscriptionMethod::Whisper,
            diarisation: false,
            diarisation_method: DiarisationMethod::Pipeline,
            ..options()
        };
        assert!(validate(&opts, &[job("a.wav")]).is_ok());
    }

    #[test]
    fn test_audit_without_criteria_rejected() {
        let opts = BatchOptions {
            audit: true,
            criteria: "  ".to_string(),
            ..options()
        };
        assert!(validate(&opts, &[job("a.wav")]).is_err());
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(
            "whisperx".parse::<TranscriptionMethod>(),
            Ok(TranscriptionMethod::WhisperX)
        );
        assert_eq!(
            "whisperX_pipeline".parse::<DiarisationMethod>(),
            Ok(DiarisationMethod::Pipeline)
        );
        assert!("pyannote".parse::<DiarisationMethod>().is_err());
    }

    #[test]
    fn test_format_transcript() {
        let segments = vec![
            Segment {
                start: 0.0,
                end: 1.0,
                text: " hello ".to_string(),
                speaker: Some("SPEAKER_00".to_string()),
            },
            Segment {
                start: 1.0,
                end: 2.0,
                text: "hi".to_string(),
                speaker: None,
            },
        ];

        assert_eq!(format_transcript(&segments), "SPEAKER_00: hello\nUNKNOWN: hi");
    }

    #[test]
    fn test_failure_outcome_serialization() {
        let outcome = JobOutcome::Failure {
            filename: "a.wav".to_string(),
            error: "Error transcribing audio: boom".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["filename"], "a.wav");
        assert!(json.get("segments").is_none());
    }

    #[test]
    fn test_success_outcome_skips_absent_result() {
        let outcome = JobOutcome::Success {
            filename: "a.wav".to_string(),
            language: "en".to_string(),
            segments: Vec::new(),
            result: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert!(json.get("result").is_none());

        let audited = JobOutcome::Success {
            filename: "a.wav".to_string(),
            language: "en".to_string(),
            segments: Vec::new(),
            result: Some(AuditOutcome::Error {
                error: "llm timed out".to_string(),
            }),
        };
        let json = serde_json::to_value(&audited).unwrap();
        assert_eq!(json["result"]["error"], "llm timed out");
    }
}
