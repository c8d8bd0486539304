//! Scribe Manager - transcription, diarisation and audit orchestration
//!
//! A lightweight Rust service that coordinates several heavyweight speech
//! models on a single memory-limited device, swapping them in and out so
//! that at most one variant of each model family is ever resident.

pub mod api;
pub mod audio;
pub mod config;
pub mod device;
pub mod engines;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;

pub use config::{ManagerConfig, RunnerConfig};
pub use device::{DeviceKind, DeviceReclaimer, MemoryReclaimer};
pub use error::{JobError, ScribeError, ScribeResult};
pub use models::{LoadSpec, ModelFactory, ModelFamily, ModelHandle, ModelRegistry, ModelSize};
pub use pipeline::{BatchOptions, JobInput, JobOutcome, Pipeline};
