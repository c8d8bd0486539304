//! Integration tests for the batch pipeline
//!
//! The registry and pipeline are exercised against stub engines injected
//! through the public factory and probe traits, so model residency and
//! phase ordering are observable without any runner binaries.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use scribe_manager::audio::AudioProbe;
use scribe_manager::error::JobError;
use scribe_manager::models::{
    Auditor, Diariser, ModelEvent, ModelFamily, Segment, Transcriber, Transcript,
};
use scribe_manager::pipeline::{
    AuditOutcome, DiarisationMethod, JobOutcome, TranscriptionMethod,
};
use scribe_manager::{
    BatchOptions, DeviceKind, JobInput, LoadSpec, MemoryReclaimer, ModelFactory, ModelHandle,
    ModelRegistry, ModelSize, Pipeline, ScribeError,
};

/// Transcriber that fails for paths whose filename contains "bad"
struct StubTranscriber;

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, path: &Path) -> Result<Transcript, JobError> {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        if name.contains("bad") {
            return Err(JobError::Transcription("decode failed".to_string()));
        }
        Ok(Transcript {
            language: "en".to_string(),
            segments: vec![Segment {
                start: 0.0,
                end: 1.0,
                text: format!("words from {name}"),
                speaker: None,
            }],
        })
    }
}

struct StubDiariser {
    fail: bool,
}

#[async_trait]
impl Diariser for StubDiariser {
    async fn diarise(
        &self,
        _path: &Path,
        segments: &[Segment],
        _num_speakers: u32,
    ) -> Result<Vec<Segment>, JobError> {
        if self.fail {
            return Err(JobError::Diarisation("clustering failed".to_string()));
        }
        Ok(segments
            .iter()
            .cloned()
            .map(|mut segment| {
                segment.speaker = Some("SPEAKER_00".to_string());
                segment
            })
            .collect())
    }
}

struct StubAuditor;

#[async_trait]
impl Auditor for StubAuditor {
    async fn audit(&self, transcript: &str, _criteria: &str) -> Result<String, JobError> {
        if transcript.is_empty() {
            return Err(JobError::Audit("empty transcript".to_string()));
        }
        Ok("1. Pass".to_string())
    }
}

/// Factory producing the stubs above, counting constructions per family
struct StubFactory {
    builds: Mutex<Vec<ModelFamily>>,
    fail_diariser_calls: bool,
}

impl StubFactory {
    fn new() -> Self {
        Self {
            builds: Mutex::new(Vec::new()),
            fail_diariser_calls: false,
        }
    }

    fn with_failing_diariser() -> Self {
        Self {
            builds: Mutex::new(Vec::new()),
            fail_diariser_calls: true,
        }
    }

    fn build_count(&self) -> usize {
        self.builds.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelFactory for StubFactory {
    async fn build(&self, spec: &LoadSpec) -> anyhow::Result<ModelHandle> {
        self.builds.lock().unwrap().push(spec.family);
        Ok(match spec.family {
            ModelFamily::Whisper | ModelFamily::WhisperX => {
                ModelHandle::Transcriber(Arc::new(StubTranscriber))
            }
            ModelFamily::Clustering | ModelFamily::DiarisationPipeline => {
                ModelHandle::Diariser(Arc::new(StubDiariser {
                    fail: self.fail_diariser_calls,
                }))
            }
            ModelFamily::AuditLlm => ModelHandle::Auditor(Arc::new(StubAuditor)),
        })
    }
}

/// Transcriber that records its own drop, so handle lifetime is
/// observable alongside the factory's construction log
struct TrackedTranscriber {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transcriber for TrackedTranscriber {
    async fn transcribe(&self, _path: &Path) -> Result<Transcript, JobError> {
        Ok(Transcript {
            language: "en".to_string(),
            segments: vec![Segment {
                start: 0.0,
                end: 1.0,
                text: "words".to_string(),
                speaker: None,
            }],
        })
    }
}

impl Drop for TrackedTranscriber {
    fn drop(&mut self) {
        self.log.lock().unwrap().push("drop:transcriber".to_string());
    }
}

struct LoggingFactory {
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ModelFactory for LoggingFactory {
    async fn build(&self, spec: &LoadSpec) -> anyhow::Result<ModelHandle> {
        self.log
            .lock()
            .unwrap()
            .push(format!("build:{}", spec.family));
        Ok(match spec.family {
            ModelFamily::Whisper | ModelFamily::WhisperX => {
                ModelHandle::Transcriber(Arc::new(TrackedTranscriber {
                    log: self.log.clone(),
                }))
            }
            ModelFamily::Clustering | ModelFamily::DiarisationPipeline => {
                ModelHandle::Diariser(Arc::new(StubDiariser { fail: false }))
            }
            ModelFamily::AuditLlm => ModelHandle::Auditor(Arc::new(StubAuditor)),
        })
    }
}

struct NullReclaimer {
    passes: AtomicUsize,
}

impl MemoryReclaimer for NullReclaimer {
    fn reclaim(&self) {
        self.passes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Probe that reports stereo for filenames containing "stereo"
struct NameProbe;

#[async_trait]
impl AudioProbe for NameProbe {
    async fn is_stereo(&self, path: &Path) -> bool {
        path.file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .contains("stereo")
    }
}

fn harness(factory: StubFactory) -> (Pipeline, Arc<ModelRegistry>, Arc<StubFactory>) {
    let factory = Arc::new(factory);
    let registry = Arc::new(ModelRegistry::new(
        factory.clone(),
        Arc::new(NullReclaimer {
            passes: AtomicUsize::new(0),
        }),
    ));
    let pipeline = Pipeline::new(registry.clone(), Arc::new(NameProbe), DeviceKind::Cpu);
    (pipeline, registry, factory)
}

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

#[tokio::test]
async fn test_failed_job_does_not_poison_siblings() {
    let (pipeline, _, _) = harness(StubFactory::new());

    let jobs = vec![job("a.wav"), job("bad.wav"), job("c.wav")];
    let outcomes = pipeline.run(&options(), &jobs).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(outcomes[&1], JobOutcome::Success { .. }));
    match &outcomes[&2] {
        JobOutcome::Failure { filename, error } => {
            assert_eq!(filename, "bad.wav");
            assert_eq!(error, "Error transcribing audio: decode failed");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(outcomes[&3], JobOutcome::Success { .. }));
}

#[tokio::test]
async fn test_incompatible_configuration_loads_nothing() {
    let (pipeline, _, factory) = harness(StubFactory::new());

    let opts = BatchOptions {
        transcription_method: TranscriptionMethod::Whisper,
        diarisation: true,
        diarisation_method: DiarisationMethod::Pipeline,
        ..options()
    };

    let err = pipeline.run(&opts, &[job("a.wav")]).await.unwrap_err();
    assert!(matches!(err, ScribeError::Configuration(_)));
    assert_eq!(factory.build_count(), 0);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let (pipeline, _, factory) = harness(StubFactory::new());

    let err = pipeline.run(&options(), &[]).await.unwrap_err();
    assert!(matches!(err, ScribeError::Configuration(_)));
    assert_eq!(factory.build_count(), 0);
}

#[tokio::test]
async fn test_stereo_audio_fails_only_when_diarising() {
    let (pipeline, _, _) = harness(StubFactory::new());

    let opts = BatchOptions {
        diarisation: true,
        ..options()
    };
    let jobs = vec![job("stereo.wav"), job("mono.wav")];
    let outcomes = pipeline.run(&opts, &jobs).await.unwrap();

    match &outcomes[&1] {
        JobOutcome::Failure { error, .. } => {
            assert_eq!(error, "Diarisation cannot be performed on stereo audio.");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(matches!(outcomes[&2], JobOutcome::Success { .. }));

    // Without diarisation the same file transcribes fine
    let outcomes = pipeline
        .run(&options(), &[job("stereo.wav")])
        .await
        .unwrap();
    assert!(matches!(outcomes[&1], JobOutcome::Success { .. }));
}

#[tokio::test]
async fn test_diariser_failure_surfaces_as_job_error() {
    let (pipeline, _, _) = harness(StubFactory::with_failing_diariser());

    let opts = BatchOptions {
        diarisation: true,
        ..options()
    };
    let outcomes = pipeline.run(&opts, &[job("a.wav")]).await.unwrap();

    match &outcomes[&1] {
        JobOutcome::Failure { error, .. } => {
            assert_eq!(error, "Error diarising audio: clustering failed");
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_diarisation_applies_speakers() {
    let (pipeline, _, _) = harness(StubFactory::new());

    let opts = BatchOptions {
        diarisation: true,
        ..options()
    };
    let outcomes = pipeline.run(&opts, &[job("a.wav")]).await.unwrap();

    match &outcomes[&1] {
        JobOutcome::Success { segments, .. } => {
            assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disabling_diarisation_evicts_stale_diariser() {
    let (pipeline, registry, _) = harness(StubFactory::new());

    let opts = BatchOptions {
        diarisation: true,
        ..options()
    };
    pipeline.run(&opts, &[job("a.wav")]).await.unwrap();
    assert!(registry.get(ModelFamily::Clustering).await.is_some());

    pipeline.run(&options(), &[job("b.wav")]).await.unwrap();
    assert!(registry.get(ModelFamily::Clustering).await.is_none());
    assert!(registry.get(ModelFamily::WhisperX).await.is_some());
}

#[tokio::test]
async fn test_warm_reuse_across_batches() {
    let (pipeline, _, factory) = harness(StubFactory::new());

    pipeline.run(&options(), &[job("a.wav")]).await.unwrap();
    pipeline.run(&options(), &[job("b.wav")]).await.unwrap();

    assert_eq!(factory.build_count(), 1);
}

#[tokio::test]
async fn test_audit_phase_swaps_models_and_attaches_results() {
    let (pipeline, registry, _) = harness(StubFactory::new());
    let mut events = registry.subscribe_events();

    let opts = BatchOptions {
        audit: true,
        criteria: "1. A greeting was given".to_string(),
        ..options()
    };
    let outcomes = pipeline.run(&opts, &[job("a.wav")]).await.unwrap();

    match &outcomes[&1] {
        JobOutcome::Success { result, .. } => {
            assert_eq!(result, &Some(AuditOutcome::Text("1. Pass".to_string())));
        }
        other => panic!("expected success, got {other:?}"),
    }

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    // The transcriber leaves before the LLM arrives, and the LLM leaves
    // once the batch is audited.
    let transcriber_evicted = seen
        .iter()
        .position(|e| *e == ModelEvent::Evicted(ModelFamily::WhisperX))
        .expect("transcriber never evicted");
    let llm_loaded = seen
        .iter()
        .position(|e| *e == ModelEvent::Loaded(ModelFamily::AuditLlm))
        .expect("audit llm never loaded");
    assert!(transcriber_evicted < llm_loaded);
    assert_eq!(
        seen.last(),
        Some(&ModelEvent::Evicted(ModelFamily::AuditLlm))
    );
    assert_eq!(registry.count().await, 0);
}

#[tokio::test]
async fn test_transcriber_handle_dropped_before_audit_llm_builds() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(ModelRegistry::new(
        Arc::new(LoggingFactory { log: log.clone() }),
        Arc::new(NullReclaimer {
            passes: AtomicUsize::new(0),
        }),
    ));
    let pipeline = Pipeline::new(registry, Arc::new(NameProbe), DeviceKind::Cpu);

    let opts = BatchOptions {
        audit: true,
        criteria: "1. A greeting was given".to_string(),
        ..options()
    };
    pipeline.run(&opts, &[job("a.wav")]).await.unwrap();

    // Evicting the registry entry is not enough: the transcriber handle
    // itself must be gone before the audit model is constructed, since
    // the handle is what keeps the runner process (and its memory) alive.
    let log = log.lock().unwrap().clone();
    let dropped = log
        .iter()
        .position(|entry| entry == "drop:transcriber")
        .expect("transcriber never dropped");
    let llm_built = log
        .iter()
        .position(|entry| entry == "build:audit_llm")
        .expect("audit llm never built");
    assert!(
        dropped < llm_built,
        "transcriber outlived the audit model construction: {log:?}"
    );
}

#[tokio::test]
async fn test_audit_skips_failed_jobs() {
    let (pipeline, _, _) = harness(StubFactory::new());

    let opts = BatchOptions {
        audit: true,
        criteria: "1. A greeting was given".to_string(),
        ..options()
    };
    let jobs = vec![job("bad.wav"), job("good.wav")];
    let outcomes = pipeline.run(&opts, &jobs).await.unwrap();

    assert!(matches!(outcomes[&1], JobOutcome::Failure { .. }));
    match &outcomes[&2] {
        JobOutcome::Success { result, .. } => assert!(result.is_some()),
        other => panic!("expected success, got {other:?}"),
    }
}
