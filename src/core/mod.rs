//! Core infrastructure: errors, configuration, the ONNX inference engine,
//! and the per-model worker threads.

pub mod config;
pub mod errors;
pub mod inference;
pub mod worker;

pub use config::{
    ClassifierConfig, DetectorConfig, IdReaderConfig, OrtExecutionProvider,
    OrtGraphOptimizationLevel, OrtSessionConfig, PipelineConfig,
};
pub use errors::{ProcessingStage, SimpleError, VisionError, VisionResult};
pub use inference::{OrtInfer, Tensor2D, Tensor3D, Tensor4D};
pub use worker::ModelWorker;
