//! Model identity, capability contracts and the lifecycle registry

pub mod capability;
pub mod family;
pub mod registry;

pub use capability::{Auditor, Diariser, ModelHandle, Segment, Transcriber, Transcript};
pub use family::{ModelFamily, ModelSize};
pub use registry::{LoadSpec, LoadedModel, ModelEvent, ModelFactory, ModelRegistry, ResidentModel};
