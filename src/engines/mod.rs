//! External model collaborators, hosted in runner subprocesses
//!
//! The actual transcription/diarisation/audit algorithms are someone
//! else's library; this module only adapts their runner processes to the
//! capability traits in [`crate::models`].

pub mod audit;
pub mod diarisation;
pub mod factory;
pub mod runner;
pub mod transcription;

pub use audit::LlamaAuditor;
pub use diarisation::{ClusteringEngine, PipelineEngine};
pub use factory::EngineFactory;
pub use runner::{ModelRunner, RunnerSpec};
pub use transcription::{WhisperEngine, WhisperXEngine};
