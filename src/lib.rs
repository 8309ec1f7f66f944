//! # culiscan
//!
//! On-device mosquito specimen inference for entomological surveillance.
//! Runs a detection model, a cascade of species / sex / abdomen-status
//! classifiers, and a printed-label ID reader over ONNX models, each behind
//! its own serialized worker thread.
//!
//! ## Pipeline
//!
//! 1. **Detection**: the camera frame is letterboxed, run through the
//!    detector, and decoded with confidence thresholding and greedy NMS;
//!    boxes are mapped back into frame-normalized coordinates.
//! 2. **Classification cascade**: exactly one accepted detection is cropped
//!    and classified for species; non-mosquito stops the cascade, otherwise
//!    sex runs, and abdomen status runs only for non-male specimens.
//! 3. **ID reading**: the printed specimen label is recognized with a CTC
//!    greedy decoder.
//!
//! Model failures never cross the worker boundary as errors: callers get
//! empty detections, `None` logits, or a named
//! [`CaptureCondition`](domain::CaptureCondition).
//!
//! ## Modules
//!
//! * [`core`] - Errors, configuration, ONNX Runtime sessions, model workers
//! * [`domain`] - Labels, result entities, capture conditions
//! * [`models`] - Detector, stage classifiers, specimen-ID reader
//! * [`pipeline`] - Classification workflow and the repository façade
//! * [`processors`] - Resizing, normalization, detection decode, CTC decode
//! * [`utils`] - Image loading helpers
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use culiscan::prelude::*;
//! use std::path::Path;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_json_file(Path::new("pipeline.json"))?;
//! let repository = InferenceRepository::new(config);
//!
//! let frame = load_image(Path::new("frame.jpg"))?;
//! let detections = repository.detect_specimen(&frame).await;
//! match repository.classify_specimen(&frame, &detections).await {
//!     Ok(specimen) => println!("{:?} {:?}", specimen.species, specimen.sex),
//!     Err(condition) => println!("{condition}"),
//! }
//!
//! repository.close_resources();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod domain;
pub mod models;
pub mod pipeline;
pub mod processors;
pub mod utils;

/// Prelude for the common capture-flow imports.
pub mod prelude {
    pub use crate::core::{PipelineConfig, VisionError, VisionResult};
    pub use crate::domain::{
        AbdomenStatusLabel, CaptureCondition, ClassifiedSpecimen, InferenceResult, SexLabel,
        SpeciesLabel,
    };
    pub use crate::pipeline::InferenceRepository;
    pub use crate::utils::load_image;
}
