//! Result and entity types produced by the inference pipeline.

use crate::domain::labels::{AbdomenStatusLabel, SexLabel, SpeciesLabel};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An axis-aligned box in [0,1] normalized coordinates relative to the
/// source frame, stored as top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    /// Top-left x, clamped to be never negative.
    pub x: f32,
    /// Top-left y, clamped to be never negative.
    pub y: f32,
    /// Box width.
    pub width: f32,
    /// Box height.
    pub height: f32,
}

impl NormalizedBox {
    /// Creates a box, clamping the top-left corner at 0 and trimming the
    /// size so the box stays within the unit square.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        let x = x.max(0.0);
        let y = y.max(0.0);
        Self {
            x,
            y,
            width: width.min(1.0 - x).max(0.0),
            height: height.min(1.0 - y).max(0.0),
        }
    }

    /// Converts to an absolute pixel rectangle `(x, y, w, h)` within a frame
    /// of the given dimensions, clamped to frame bounds with a minimum size
    /// of 1x1.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> (u32, u32, u32, u32) {
        let fw = frame_width as f32;
        let fh = frame_height as f32;
        let x = (self.x * fw).floor().clamp(0.0, fw - 1.0) as u32;
        let y = (self.y * fh).floor().clamp(0.0, fh - 1.0) as u32;
        let w = ((self.width * fw).ceil() as u32)
            .max(1)
            .min(frame_width - x);
        let h = ((self.height * fh).ceil() as u32)
            .max(1)
            .min(frame_height - y);
        (x, y, w.max(1), h.max(1))
    }
}

/// One detected specimen instance, optionally enriched by the
/// classification stages.
///
/// Logits are `None` until the corresponding stage has run; a stage skipped
/// by the gating cascade leaves them `None` permanently.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    /// Normalized bounding box of the detection.
    pub bbox: NormalizedBox,
    /// Detection confidence as decoded, unchanged by suppression.
    pub confidence: f32,
    /// Detector class id as decoded.
    pub class_id: usize,
    /// Raw species logits, once the species stage has run.
    pub species_logits: Option<Vec<f32>>,
    /// Raw sex logits, once the sex stage has run.
    pub sex_logits: Option<Vec<f32>>,
    /// Raw abdomen-status logits, once the abdomen stage has run.
    pub abdomen_logits: Option<Vec<f32>>,
    /// Wall-clock duration of the species stage.
    pub species_duration: Option<Duration>,
    /// Wall-clock duration of the sex stage.
    pub sex_duration: Option<Duration>,
    /// Wall-clock duration of the abdomen stage.
    pub abdomen_duration: Option<Duration>,
}

impl InferenceResult {
    /// Creates a detection-only result with no classification stages run.
    pub fn detection(bbox: NormalizedBox, confidence: f32, class_id: usize) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            species_logits: None,
            sex_logits: None,
            abdomen_logits: None,
            species_duration: None,
            sex_duration: None,
            abdomen_duration: None,
        }
    }
}

/// Persisted geometric portion of an [`InferenceResult`], owned 1:1 by a
/// [`Specimen`] row. Created at capture time; updated only during
/// remote-sync reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Normalized top-left x.
    pub top_left_x: f32,
    /// Normalized top-left y.
    pub top_left_y: f32,
    /// Normalized width.
    pub width: f32,
    /// Normalized height.
    pub height: f32,
    /// Detection confidence.
    pub confidence: f32,
    /// Detector class id.
    pub class_id: usize,
}

impl From<&InferenceResult> for BoundingBox {
    fn from(result: &InferenceResult) -> Self {
        Self {
            top_left_x: result.bbox.x,
            top_left_y: result.bbox.y,
            width: result.bbox.width,
            height: result.bbox.height,
            confidence: result.confidence,
            class_id: result.class_id,
        }
    }
}

/// Upload state of one persisted artifact (metadata row or image file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Not yet queued for upload.
    Pending,
    /// Upload in flight.
    InProgress,
    /// Upload acknowledged by the backend.
    Uploaded,
    /// Upload failed; will be retried by the sync layer.
    Failed,
}

/// One physical mosquito capture event.
///
/// Created when a frame with exactly one accepted detection is confirmed by
/// the operator; label fields fill progressively as stages run or the
/// operator corrects them. After a session is submitted only the
/// upload-status fields may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specimen {
    /// Specimen id, usually read from the on-specimen label.
    pub id: String,
    /// Species label string, if classified or corrected.
    pub species: Option<String>,
    /// Sex label string, if classified or corrected.
    pub sex: Option<String>,
    /// Abdomen-status label string, if classified or corrected.
    pub abdomen_status: Option<String>,
    /// Reference to the captured image (path or content id).
    pub image_ref: String,
    /// Upload state of the metadata row.
    pub metadata_upload: UploadStatus,
    /// Upload state of the image file.
    pub image_upload: UploadStatus,
    /// Capture timestamp, epoch milliseconds.
    pub captured_at_ms: u64,
    /// Geometric detection record for this capture.
    pub bounding_box: BoundingBox,
}

/// Outcome of the full single-specimen classification cascade.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedSpecimen {
    /// The detection enriched with whatever stage logits were produced.
    pub result: InferenceResult,
    /// Resolved species label, if the species stage produced one.
    pub species: Option<SpeciesLabel>,
    /// Resolved sex label; `None` when gated off or not run.
    pub sex: Option<SexLabel>,
    /// Resolved abdomen-status label; `None` when gated off or not run.
    pub abdomen_status: Option<AbdomenStatusLabel>,
}

/// Closed set of named conditions surfaced to the presentation layer.
///
/// Low-level failures never cross the worker boundary as errors; the
/// workflow layer maps their empty/`None` sentinels into these conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureCondition {
    /// Frame detection yielded zero boxes.
    NoSpecimenFound,
    /// Frame detection yielded more than one box.
    MultipleSpecimensFound,
    /// A model failed to initialize and is permanently not ready.
    ModelInitializationFailed,
    /// An accelerator execution provider failed to initialize.
    GpuDelegateInitializationFailed,
    /// Input did not match the model's expected tensor shape.
    InvalidInputShape,
    /// Inference failed for an unclassified reason.
    UnknownInferenceError,
    /// Camera capture failed.
    CaptureError,
    /// Persisting a capture failed.
    SaveError,
    /// Image processing failed before inference.
    ProcessingError,
}

impl std::fmt::Display for CaptureCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CaptureCondition::NoSpecimenFound => "no specimen found",
            CaptureCondition::MultipleSpecimensFound => "multiple specimens found",
            CaptureCondition::ModelInitializationFailed => "model initialization failed",
            CaptureCondition::GpuDelegateInitializationFailed => {
                "GPU delegate initialization failed"
            }
            CaptureCondition::InvalidInputShape => "invalid input shape",
            CaptureCondition::UnknownInferenceError => "unknown inference error",
            CaptureCondition::CaptureError => "capture error",
            CaptureCondition::SaveError => "save error",
            CaptureCondition::ProcessingError => "processing error",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_box_clamps_negative_top_left() {
        let bbox = NormalizedBox::new(-0.05, -0.1, 0.4, 0.5);
        assert_eq!(bbox.x, 0.0);
        assert_eq!(bbox.y, 0.0);
        assert_eq!(bbox.width, 0.4);
        assert_eq!(bbox.height, 0.5);
    }

    #[test]
    fn test_normalized_box_stays_within_unit_square() {
        let bbox = NormalizedBox::new(0.8, 0.9, 0.5, 0.5);
        assert!(bbox.x + bbox.width <= 1.0);
        assert!(bbox.y + bbox.height <= 1.0);
    }

    #[test]
    fn test_pixel_rect_minimum_one_by_one() {
        let bbox = NormalizedBox::new(0.5, 0.5, 0.0, 0.0);
        let (_, _, w, h) = bbox.to_pixel_rect(640, 480);
        assert_eq!((w, h), (1, 1));
    }

    #[test]
    fn test_pixel_rect_clamped_to_frame() {
        let bbox = NormalizedBox::new(0.9, 0.9, 0.2, 0.2);
        let (x, y, w, h) = bbox.to_pixel_rect(100, 100);
        assert!(x + w <= 100);
        assert!(y + h <= 100);
    }

    #[test]
    fn test_bounding_box_from_inference_result() {
        let result =
            InferenceResult::detection(NormalizedBox::new(0.1, 0.2, 0.3, 0.4), 0.95, 0);
        let persisted = BoundingBox::from(&result);
        assert_eq!(persisted.top_left_x, 0.1);
        assert_eq!(persisted.confidence, 0.95);
        assert_eq!(persisted.class_id, 0);
    }
}
