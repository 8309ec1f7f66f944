//! Specimen detector: single-class object detection over a camera frame.

use crate::core::config::DetectorConfig;
use crate::core::worker::ModelWorker;
use crate::core::{OrtInfer, VisionResult};
use crate::domain::InferenceResult;
use crate::models::common::ModelSlot;
use crate::processors::{DetectionPostProcess, LetterboxResize, NormalizeImage};
use image::RgbImage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Object detector for mosquito specimens.
///
/// The session loads asynchronously on the detector's own worker thread; a
/// call that arrives before the load finishes, after a failed load, or after
/// [`close`](Self::close) returns an empty list rather than an error. All
/// tensor work is serialized on the worker thread.
#[derive(Debug)]
pub struct SpecimenDetector {
    worker: ModelWorker,
    slot: Arc<Mutex<ModelSlot>>,
    /// Square input side; fallback from config until the graph reports its
    /// real input shape.
    input_size: Arc<AtomicU32>,
    postprocess: DetectionPostProcess,
    normalizer: NormalizeImage,
}

impl SpecimenDetector {
    /// Creates a detector and starts loading the model in the background.
    ///
    /// Construction itself never fails; a load failure is logged and leaves
    /// the detector permanently not ready.
    pub fn new(config: DetectorConfig) -> VisionResult<Self> {
        let normalizer = NormalizeImage::for_detection()?;
        let postprocess =
            DetectionPostProcess::new(config.confidence_threshold, config.iou_threshold);

        let worker = ModelWorker::spawn("specimen-detector");
        let slot = Arc::new(Mutex::new(ModelSlot::Loading));
        let input_size = Arc::new(AtomicU32::new(config.fallback_input_size));

        let load_slot = slot.clone();
        let load_size = input_size.clone();
        let model_path = config.model_path.clone();
        let ort_session = config.ort_session.clone();
        worker.post(move || {
            let loaded = OrtInfer::from_config(&model_path, ort_session.as_ref());
            let mut guard = match load_slot.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            match loaded {
                Ok(engine) => {
                    if let Some(shape) = engine.primary_input_shape() {
                        // NHWC input: [batch, height, width, channels].
                        if let Some(&h) = shape.get(1)
                            && h > 0
                        {
                            load_size.store(h as u32, Ordering::Relaxed);
                        }
                    }
                    debug!(model = engine.model_name(), "specimen detector ready");
                    *guard = ModelSlot::Ready(Arc::new(engine));
                }
                Err(e) => {
                    error!(
                        path = %model_path.display(),
                        "specimen detector initialization failed: {e}"
                    );
                    *guard = ModelSlot::Failed;
                }
            }
        });

        Ok(Self {
            worker,
            slot,
            input_size,
            postprocess,
            normalizer,
        })
    }

    /// Returns true once the model has loaded successfully.
    pub fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| matches!(*slot, ModelSlot::Ready(_)))
            .unwrap_or(false)
    }

    /// Detects specimens in an upright frame.
    ///
    /// Returns boxes in [0,1] coordinates normalized to the source frame.
    /// Returns an empty list when the model is not ready, closed, or the
    /// forward pass fails.
    pub async fn detect(&self, frame: &RgbImage) -> Vec<InferenceResult> {
        let engine = match self.slot.lock() {
            Ok(slot) => match slot.engine() {
                Some(engine) => engine,
                None => {
                    debug!("specimen detector not ready, returning empty detections");
                    return Vec::new();
                }
            },
            Err(_) => return Vec::new(),
        };

        let frame = frame.clone();
        let normalizer = self.normalizer.clone();
        let postprocess = self.postprocess.clone();
        let input_size = self.input_size.load(Ordering::Relaxed);

        self.worker
            .run(move || {
                let letterbox = match LetterboxResize::new(input_size) {
                    Ok(letterbox) => letterbox,
                    Err(e) => {
                        warn!("detector preprocessing unavailable: {e}");
                        return Vec::new();
                    }
                };
                let (canvas, info) = match letterbox.apply(&frame) {
                    Ok(out) => out,
                    Err(e) => {
                        warn!("detector letterbox failed: {e}");
                        return Vec::new();
                    }
                };
                let tensor = match normalizer.normalize_to(&canvas) {
                    Ok(tensor) => tensor,
                    Err(e) => {
                        warn!("detector normalization failed: {e}");
                        return Vec::new();
                    }
                };
                match engine.infer_3d(&tensor) {
                    Ok(predictions) => postprocess.apply(&predictions, &info),
                    Err(e) => {
                        warn!("detector inference failed: {e}");
                        Vec::new()
                    }
                }
            })
            .await
            .unwrap_or_default()
    }

    /// Closes the detector. Irreversible and idempotent; subsequent calls
    /// return empty results.
    pub fn close(&self) {
        self.worker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DetectorConfig;

    fn unloadable_detector() -> SpecimenDetector {
        SpecimenDetector::new(DetectorConfig::new("/nonexistent/detector.onnx")).unwrap()
    }

    #[tokio::test]
    async fn test_failed_load_returns_empty_not_error() {
        let detector = unloadable_detector();
        let frame = RgbImage::new(64, 64);
        let results = detector.detect(&frame).await;
        assert!(results.is_empty());
        assert!(!detector.is_ready());
    }

    #[tokio::test]
    async fn test_detect_after_close_returns_empty_without_hanging() {
        let detector = unloadable_detector();
        detector.close();
        let frame = RgbImage::new(64, 64);
        let results = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            detector.detect(&frame),
        )
        .await
        .expect("closed detector must not hang");
        assert!(results.is_empty());
    }

    #[test]
    fn test_close_is_idempotent() {
        let detector = unloadable_detector();
        detector.close();
        detector.close();
    }
}
