//! Configuration structures and loading logic

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::device::DeviceKind;

/// Main manager configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerConfig {
    pub api_port: u16,
    pub device: DevicePreference,
    pub batch_size: u32,
    pub max_upload_mb: usize,
    pub runners: RunnerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            device: DevicePreference::Auto,
            batch_size: default_batch_size(),
            max_upload_mb: default_max_upload_mb(),
            runners: RunnerConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(port) = std::env::var("SCRIBE_MANAGER_API_PORT") {
            config.api_port = port
                .parse()
                .context("Invalid SCRIBE_MANAGER_API_PORT value")?;
        }
        if let Ok(device) = std::env::var("SCRIBE_MANAGER_DEVICE") {
            config.device = device
                .parse()
                .map_err(|e: String| anyhow::anyhow!("Invalid SCRIBE_MANAGER_DEVICE value: {e}"))?;
        }
        if let Ok(token) = std::env::var("SCRIBE_MANAGER_HF_TOKEN") {
            config.runners.hf_auth_token = Some(token);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_port < 1024 {
            anyhow::bail!("API port must be >= 1024 (got {})", self.api_port);
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be >= 1");
        }
        if self.max_upload_mb == 0 {
            anyhow::bail!("max_upload_mb must be >= 1");
        }
        if self.runners.load_timeout_secs == 0 || self.runners.call_timeout_secs == 0 {
            anyhow::bail!("runner timeouts must be >= 1 second");
        }
        Ok(())
    }
}

/// Requested compute device; `auto` probes for a GPU at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    Auto,
    Cuda,
    Cpu,
}

impl DevicePreference {
    pub fn resolve(self) -> DeviceKind {
        match self {
            Self::Auto => crate::device::detect(),
            Self::Cuda => DeviceKind::Cuda,
            Self::Cpu => DeviceKind::Cpu,
        }
    }
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cuda" => Ok(Self::Cuda),
            "cpu" => Ok(Self::Cpu),
            other => Err(format!("expected auto, cuda or cpu (got '{other}')")),
        }
    }
}

/// Runner binaries and their shared settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub whisper_bin: String,
    pub whisperx_bin: String,
    pub clustering_bin: String,
    pub diarisation_bin: String,
    pub audit_bin: String,
    pub audit_model_path: PathBuf,

    /// Required by the diarisation pipeline runner
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hf_auth_token: Option<String>,

    pub load_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            whisper_bin: "whisper-runner".to_string(),
            whisperx_bin: "whisperx-runner".to_string(),
            clustering_bin: "clustering-runner".to_string(),
            diarisation_bin: "diarisation-runner".to_string(),
            audit_bin: "llama-runner".to_string(),
            audit_model_path: default_audit_model_path(),
            hf_auth_token: None,
            load_timeout_secs: default_load_timeout(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

// Default functions
fn default_api_port() -> u16 {
    8000
}
fn default_batch_size() -> u32 {
    16
}
fn default_max_upload_mb() -> usize {
    512
}
fn default_audit_model_path() -> PathBuf {
    PathBuf::from("/models/mistral-7b-instruct.Q4_K_M.gguf")
}
fn default_load_timeout() -> u64 {
    300
}
fn default_call_timeout() -> u64 {
    600
}
