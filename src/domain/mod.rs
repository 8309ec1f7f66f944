//! Domain types: label enumerations, detection results, persisted entities,
//! and the named condition set surfaced to the presentation layer.

pub mod labels;
pub mod results;

pub use labels::{AbdomenStatusLabel, SexLabel, SpeciesLabel, check_output_classes};
pub use results::{
    BoundingBox, CaptureCondition, ClassifiedSpecimen, InferenceResult, NormalizedBox, Specimen,
    UploadStatus,
};
