//! Capture pipeline: the gated classification workflow and the repository
//! façade the presentation layer talks to.

pub mod repository;
pub mod workflow;

pub use repository::{FrameThrottle, InferenceRepository};
pub use workflow::{CaptureStage, StageLogits, classify_specimen, crop_region, single_detection};
