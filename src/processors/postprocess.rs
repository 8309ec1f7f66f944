//! Detection postprocessing: candidate decoding, confidence thresholding,
//! greedy non-max suppression, and inverse-letterbox coordinate correction.

use crate::core::Tensor3D;
use crate::domain::{InferenceResult, NormalizedBox};
use crate::processors::resize::LetterboxInfo;
use ndarray::Axis;
use tracing::debug;

/// A candidate detection in letterboxed normalized coordinates,
/// center-size form as decoded from the model output row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Center x in letterboxed [0,1] space.
    pub cx: f32,
    /// Center y in letterboxed [0,1] space.
    pub cy: f32,
    /// Width in letterboxed [0,1] space.
    pub w: f32,
    /// Height in letterboxed [0,1] space.
    pub h: f32,
    /// Decoded confidence.
    pub confidence: f32,
    /// Decoded class id.
    pub class_id: usize,
}

impl Candidate {
    fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        )
    }
}

/// Intersection-over-union of two candidates in corner form.
pub fn calculate_iou(a: &Candidate, b: &Candidate) -> f32 {
    let (ax1, ay1, ax2, ay2) = a.corners();
    let (bx1, by1, bx2, by2) = b.corners();

    let inter_x1 = ax1.max(bx1);
    let inter_y1 = ay1.max(by1);
    let inter_x2 = ax2.min(bx2);
    let inter_y2 = ay2.min(by2);

    let inter_w = (inter_x2 - inter_x1).max(0.0);
    let inter_h = (inter_y2 - inter_y1).max(0.0);
    let intersection = inter_w * inter_h;

    let area_a = (ax2 - ax1).max(0.0) * (ay2 - ay1).max(0.0);
    let area_b = (bx2 - bx1).max(0.0) * (by2 - by1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 { 0.0 } else { intersection / union }
}

/// Postprocessor for the specimen detector output.
///
/// The model emits a fixed number of candidate rows
/// `[cx, cy, w, h, confidence, class_id]` in letterboxed normalized
/// coordinates; this processor thresholds, suppresses, and maps the
/// survivors back into source-frame normalized space.
#[derive(Debug, Clone)]
pub struct DetectionPostProcess {
    /// Candidates below this confidence are discarded before suppression.
    confidence_threshold: f32,
    /// Overlap above this IoU suppresses the lower-confidence candidate.
    iou_threshold: f32,
}

impl DetectionPostProcess {
    /// Creates a postprocessor with the given thresholds.
    pub fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
        }
    }

    /// Decodes raw model output rows into candidates above the confidence
    /// threshold. Rows with non-finite values are dropped.
    pub fn decode(&self, predictions: &Tensor3D) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        if predictions.shape()[0] == 0 || predictions.shape()[2] < 6 {
            debug!(shape = ?predictions.shape(), "detector output has no decodable rows");
            return candidates;
        }

        for row in predictions.index_axis(Axis(0), 0).outer_iter() {
            let confidence = row[4];
            if !confidence.is_finite() || confidence < self.confidence_threshold {
                continue;
            }
            let class_raw = row[5];
            if !class_raw.is_finite() || class_raw < 0.0 {
                continue;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
                continue;
            }
            candidates.push(Candidate {
                cx,
                cy,
                w,
                h,
                confidence,
                class_id: class_raw.round() as usize,
            });
        }
        candidates
    }

    /// Greedy non-max suppression: keep the highest-confidence candidate,
    /// discard any other whose IoU with it exceeds the threshold.
    ///
    /// The detector is single-class, so suppression is class-blind.
    pub fn suppress(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        if candidates.is_empty() {
            return candidates;
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut suppressed = vec![false; candidates.len()];
        let mut keep = Vec::new();

        for i in 0..candidates.len() {
            if suppressed[i] {
                continue;
            }
            keep.push(candidates[i]);
            for j in (i + 1)..candidates.len() {
                if !suppressed[j]
                    && calculate_iou(&candidates[i], &candidates[j]) > self.iou_threshold
                {
                    suppressed[j] = true;
                }
            }
        }
        keep
    }

    /// Maps a surviving candidate from letterboxed space back into
    /// source-frame normalized space: de-pad, rescale by the occupied
    /// fraction, convert center-size to top-left-size, clamp at the frame
    /// edges.
    pub fn correct(&self, candidate: &Candidate, letterbox: &LetterboxInfo) -> InferenceResult {
        let cx = (candidate.cx - letterbox.pad_x) / letterbox.content_w;
        let cy = (candidate.cy - letterbox.pad_y) / letterbox.content_h;
        let w = candidate.w / letterbox.content_w;
        let h = candidate.h / letterbox.content_h;

        let bbox = NormalizedBox::new(cx - w / 2.0, cy - h / 2.0, w, h);
        InferenceResult::detection(bbox, candidate.confidence, candidate.class_id)
    }

    /// Full postprocess: decode, threshold, suppress, correct.
    pub fn apply(&self, predictions: &Tensor3D, letterbox: &LetterboxInfo) -> Vec<InferenceResult> {
        let candidates = self.decode(predictions);
        let kept = self.suppress(candidates);
        kept.iter().map(|c| self.correct(c, letterbox)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn postprocess() -> DetectionPostProcess {
        DetectionPostProcess::new(0.8, 0.5)
    }

    fn rows_to_tensor(rows: &[[f32; 6]]) -> Tensor3D {
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        Array3::from_shape_vec((1, rows.len(), 6), flat).unwrap()
    }

    #[test]
    fn test_candidates_below_threshold_are_excluded() {
        let tensor = rows_to_tensor(&[
            [0.5, 0.5, 0.2, 0.2, 0.79, 0.0],
            [0.5, 0.5, 0.2, 0.2, 0.80, 0.0],
            [0.2, 0.2, 0.1, 0.1, 0.10, 0.0],
        ]);
        let candidates = postprocess().decode(&tensor);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 0.80);
    }

    #[test]
    fn test_all_zero_output_yields_empty_result() {
        let tensor = Array3::zeros((1, 100, 6));
        let results = postprocess().apply(&tensor, &LetterboxInfo::identity());
        assert!(results.is_empty());
    }

    #[test]
    fn test_overlapping_boxes_keep_highest_confidence() {
        let tensor = rows_to_tensor(&[
            [0.50, 0.50, 0.20, 0.20, 0.85, 0.0],
            [0.51, 0.50, 0.20, 0.20, 0.95, 0.0],
        ]);
        let proc = postprocess();
        let kept = proc.suppress(proc.decode(&tensor));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.95);
    }

    #[test]
    fn test_non_overlapping_boxes_both_survive() {
        let tensor = rows_to_tensor(&[
            [0.20, 0.20, 0.10, 0.10, 0.85, 0.0],
            [0.80, 0.80, 0.10, 0.10, 0.90, 0.0],
        ]);
        let proc = postprocess();
        let kept = proc.suppress(proc.decode(&tensor));
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_single_detection_preserves_confidence_and_class() {
        let tensor = rows_to_tensor(&[[0.5, 0.5, 0.2, 0.2, 0.95, 0.0]]);
        let results = postprocess().apply(&tensor, &LetterboxInfo::identity());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence, 0.95);
        assert_eq!(results[0].class_id, 0);
        assert!(results[0].species_logits.is_none());
    }

    #[test]
    fn test_iou_of_identical_boxes_is_one() {
        let c = Candidate {
            cx: 0.5,
            cy: 0.5,
            w: 0.2,
            h: 0.2,
            confidence: 0.9,
            class_id: 0,
        };
        assert!((calculate_iou(&c, &c) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_of_disjoint_boxes_is_zero() {
        let a = Candidate {
            cx: 0.2,
            cy: 0.2,
            w: 0.1,
            h: 0.1,
            confidence: 0.9,
            class_id: 0,
        };
        let b = Candidate {
            cx: 0.8,
            cy: 0.8,
            w: 0.1,
            h: 0.1,
            confidence: 0.9,
            class_id: 0,
        };
        assert_eq!(calculate_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_letterbox_correction_depads_x_axis() {
        // Portrait frame letterboxed into a square: content occupies the
        // middle half in x, full height in y.
        let letterbox = LetterboxInfo {
            content_w: 0.5,
            content_h: 1.0,
            pad_x: 0.25,
            pad_y: 0.0,
        };
        // Box centered in the letterboxed frame maps back to frame center.
        let tensor = rows_to_tensor(&[[0.5, 0.5, 0.1, 0.2, 0.9, 0.0]]);
        let results = postprocess().apply(&tensor, &letterbox);
        assert_eq!(results.len(), 1);
        let bbox = results[0].bbox;
        assert!((bbox.x - 0.4).abs() < 1e-6);
        assert!((bbox.width - 0.2).abs() < 1e-6);
        assert!((bbox.y - 0.4).abs() < 1e-6);
        assert!((bbox.height - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_corrected_boxes_never_negative_and_within_bounds() {
        let letterbox = LetterboxInfo {
            content_w: 0.5,
            content_h: 1.0,
            pad_x: 0.25,
            pad_y: 0.0,
        };
        // Box hugging the left content edge would go negative without the
        // clamp.
        let tensor = rows_to_tensor(&[[0.26, 0.02, 0.1, 0.1, 0.9, 0.0]]);
        let results = postprocess().apply(&tensor, &letterbox);
        let bbox = results[0].bbox;
        assert!(bbox.x >= 0.0);
        assert!(bbox.y >= 0.0);
        assert!(bbox.x + bbox.width <= 1.0);
        assert!(bbox.y + bbox.height <= 1.0);
    }

    #[test]
    fn test_non_finite_rows_are_dropped() {
        let tensor = rows_to_tensor(&[
            [f32::NAN, 0.5, 0.2, 0.2, 0.9, 0.0],
            [0.5, 0.5, 0.2, 0.2, f32::INFINITY, 0.0],
            [0.5, 0.5, 0.2, 0.2, 0.9, -1.0],
        ]);
        assert!(postprocess().decode(&tensor).is_empty());
    }
}
