//! Device detection and best-effort memory reclamation
//!
//! Detects CUDA availability via nvidia-smi. The detected device is passed
//! around as a value rather than held in a process-global, so tests can
//! pin it.

use serde::{Deserialize, Serialize};
use std::process::Command;

/// Compute device models are placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cuda,
    Cpu,
}

impl DeviceKind {
    /// Precision the runners are asked to use on this device
    pub fn compute_type(self) -> &'static str {
        match self {
            Self::Cuda => "float16",
            Self::Cpu => "int8",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cuda => "cuda",
            Self::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the device using nvidia-smi
///
/// Falls back to CPU when nvidia-smi is missing or fails, which is also
/// what happens in containers without GPU access.
pub fn detect() -> DeviceKind {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=index", "--format=csv,noheader"])
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let gpu_count = stdout.lines().filter(|line| !line.trim().is_empty()).count();

            if gpu_count > 0 {
                tracing::info!(gpu_count, "Detected CUDA device");
                DeviceKind::Cuda
            } else {
                tracing::info!("nvidia-smi reported no GPUs, using CPU");
                DeviceKind::Cpu
            }
        }
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(stderr = %stderr, "nvidia-smi failed, using CPU");
            DeviceKind::Cpu
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to run nvidia-smi, using CPU");
            DeviceKind::Cpu
        }
    }
}

/// Best-effort release of device memory after model references drop
///
/// Never fails: reclamation problems are logged, not raised.
pub trait MemoryReclaimer: Send + Sync {
    fn reclaim(&self);
}

/// Production reclaimer
///
/// Dropping a model handle ends its runner process, which returns the
/// device allocation to the OS driver; this pass is only the hint that a
/// drop just happened, mirrored into the logs.
pub struct DeviceReclaimer {
    kind: DeviceKind,
}

impl DeviceReclaimer {
    pub fn new(kind: DeviceKind) -> Self {
        Self { kind }
    }
}

impl MemoryReclaimer for DeviceReclaimer {
    fn reclaim(&self) {
        tracing::debug!(device = %self.kind, "Memory reclamation pass");
    }
}
