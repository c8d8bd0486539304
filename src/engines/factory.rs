//! Runner construction per model family

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::audit::LlamaAuditor;
use super::diarisation::{ClusteringEngine, PipelineEngine};
use super::runner::{ModelRunner, RunnerSpec};
use super::transcription::{WhisperEngine, WhisperXEngine};
use crate::config::RunnerConfig;
use crate::device::DeviceKind;
use crate::models::{LoadSpec, ModelFactory, ModelFamily, ModelHandle, ModelSize};

/// Builds capability handles by spawning the configured runner binaries.
/// Spawn or handshake failure is a model load failure.
pub struct EngineFactory {
    runners: RunnerConfig,
    batch_size: u32,
}

impl EngineFactory {
    pub fn new(runners: RunnerConfig, batch_size: u32) -> Self {
        Self {
            runners,
            batch_size,
        }
    }

    fn runner_spec(&self, spec: &LoadSpec) -> Result<RunnerSpec> {
        let mut args = vec!["--device".to_string(), spec.device.to_string()];
        let mut envs = Vec::new();

        let binary = match spec.family {
            ModelFamily::Whisper => {
                args.extend(["--model".to_string(), transcription_size(spec)?.to_string()]);
                &self.runners.whisper_bin
            }
            ModelFamily::WhisperX => {
                args.extend([
                    "--model".to_string(),
                    transcription_size(spec)?.to_string(),
                    "--compute-type".to_string(),
                    spec.device.compute_type().to_string(),
                ]);
                &self.runners.whisperx_bin
            }
            ModelFamily::Clustering => &self.runners.clustering_bin,
            ModelFamily::DiarisationPipeline => {
                let token = self
                    .runners
                    .hf_auth_token
                    .as_ref()
                    .context("diarisation pipeline requires runners.hf_auth_token")?;
                envs.push(("HF_TOKEN".to_string(), token.clone()));
                &self.runners.diarisation_bin
            }
            ModelFamily::AuditLlm => {
                args.extend([
                    "--model-path".to_string(),
                    self.runners.audit_model_path.display().to_string(),
                ]);
                if spec.device == DeviceKind::Cuda {
                    args.extend([
                        "--n-gpu-layers".to_string(),
                        "32".to_string(),
                        "--n-batch".to_string(),
                        "512".to_string(),
                    ]);
                }
                &self.runners.audit_bin
            }
        };

        Ok(RunnerSpec {
            name: spec.family.to_string(),
            binary: binary.clone(),
            args,
            envs,
            ready_timeout: Duration::from_secs(self.runners.load_timeout_secs),
            call_timeout: Duration::from_secs(self.runners.call_timeout_secs),
        })
    }
}

fn transcription_size(spec: &LoadSpec) -> Result<ModelSize> {
    spec.size
        .with_context(|| format!("{} load is missing a model size", spec.family))
}

#[async_trait]
impl ModelFactory for EngineFactory {
    async fn build(&self, spec: &LoadSpec) -> Result<ModelHandle> {
        let runner = Arc::new(ModelRunner::spawn(self.runner_spec(spec)?).await?);

        Ok(match spec.family {
            ModelFamily::Whisper => ModelHandle::Transcriber(Arc::new(WhisperEngine::new(runner))),
            ModelFamily::WhisperX => ModelHandle::Transcriber(Arc::new(WhisperXEngine::new(
                runner,
                self.batch_size,
            ))),
            ModelFamily::Clustering => {
                ModelHandle::Diariser(Arc::new(ClusteringEngine::new(runner)))
            }
            ModelFamily::DiarisationPipeline => {
                ModelHandle::Diariser(Arc::new(PipelineEngine::new(runner)))
            }
            ModelFamily::AuditLlm => ModelHandle::Auditor(Arc::new(LlamaAuditor::new(runner))),
        })
    }
}
