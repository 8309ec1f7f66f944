//! Model wrappers: detector, stage classifiers, and the specimen-ID reader.
//!
//! Each model owns a dedicated worker thread and loads its session
//! asynchronously; calls made before the load finishes or after a failed
//! load return empty/`None` sentinels instead of errors.

pub mod classifier;
pub mod common;
pub mod detector;
pub mod id_reader;

pub use classifier::StageClassifier;
pub use common::ModelSlot;
pub use detector::SpecimenDetector;
pub use id_reader::SpecimenIdReader;
