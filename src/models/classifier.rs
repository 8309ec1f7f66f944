//! Stage classifier: one instance per cascade stage (species, sex,
//! abdomen status), parameterized only by model artifact and expected
//! class count.

use crate::core::config::ClassifierConfig;
use crate::core::worker::ModelWorker;
use crate::core::{OrtInfer, VisionResult};
use crate::domain::check_output_classes;
use crate::models::common::ModelSlot;
use crate::processors::{CenterPadToSquare, NormalizeImage};
use image::RgbImage;
use image::imageops::FilterType;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Image classifier for one cascade stage.
///
/// `classify` returns the raw logits, or `None` when the model is not
/// ready, has been closed, or the forward pass failed. It never surfaces an
/// error. Same worker-thread and lifecycle discipline as the detector.
#[derive(Debug)]
pub struct StageClassifier {
    stage: String,
    worker: ModelWorker,
    slot: Arc<Mutex<ModelSlot>>,
    /// Square input side; fallback from config until the graph reports its
    /// real input shape.
    input_size: Arc<AtomicU32>,
    normalizer: NormalizeImage,
    padder: CenterPadToSquare,
}

impl StageClassifier {
    /// Creates a classifier for a named stage and starts loading its model
    /// in the background.
    pub fn new(stage: impl Into<String>, config: ClassifierConfig) -> VisionResult<Self> {
        let stage = stage.into();
        let normalizer = NormalizeImage::for_classification()?;

        let worker = ModelWorker::spawn(format!("{stage}-classifier"));
        let slot = Arc::new(Mutex::new(ModelSlot::Loading));
        let input_size = Arc::new(AtomicU32::new(config.fallback_input_size));

        let load_slot = slot.clone();
        let load_size = input_size.clone();
        let load_stage = stage.clone();
        let model_path = config.model_path.clone();
        let ort_session = config.ort_session.clone();
        let expected_classes = config.expected_classes;
        worker.post(move || {
            let loaded = OrtInfer::from_config(&model_path, ort_session.as_ref());
            let mut guard = match load_slot.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            match loaded {
                Ok(engine) => {
                    if let Some(shape) = engine.primary_input_shape() {
                        // NCHW input: [batch, channels, height, width].
                        if let Some(&h) = shape.get(2)
                            && h > 0
                        {
                            load_size.store(h as u32, Ordering::Relaxed);
                        }
                    }
                    let model_classes = engine
                        .primary_output_shape()
                        .and_then(|shape| shape.last().copied())
                        .and_then(|n| usize::try_from(n).ok());
                    check_output_classes(&load_stage, model_classes, expected_classes);
                    debug!(stage = %load_stage, model = engine.model_name(), "stage classifier ready");
                    *guard = ModelSlot::Ready(Arc::new(engine));
                }
                Err(e) => {
                    error!(
                        stage = %load_stage,
                        path = %model_path.display(),
                        "stage classifier initialization failed: {e}"
                    );
                    *guard = ModelSlot::Failed;
                }
            }
        });

        Ok(Self {
            stage,
            worker,
            slot,
            input_size,
            normalizer,
            padder: CenterPadToSquare,
        })
    }

    /// Name of the cascade stage this classifier serves.
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns true once the model has loaded successfully.
    pub fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| matches!(*slot, ModelSlot::Ready(_)))
            .unwrap_or(false)
    }

    /// Classifies a cropped specimen region.
    ///
    /// The crop is padded to a centered square, resized to the model input,
    /// scaled, ImageNet-normalized, and laid out channel-first before the
    /// forward pass. Returns the raw logits.
    pub async fn classify(&self, crop: &RgbImage) -> Option<Vec<f32>> {
        let engine = match self.slot.lock() {
            Ok(slot) => match slot.engine() {
                Some(engine) => engine,
                None => {
                    debug!(stage = %self.stage, "classifier not ready, returning no logits");
                    return None;
                }
            },
            Err(_) => return None,
        };

        let crop = crop.clone();
        let stage = self.stage.clone();
        let normalizer = self.normalizer.clone();
        let padder = self.padder.clone();
        let input_size = self.input_size.load(Ordering::Relaxed);

        self.worker
            .run(move || {
                let squared = match padder.apply(&crop) {
                    Ok(squared) => squared,
                    Err(e) => {
                        warn!(stage = %stage, "classifier padding failed: {e}");
                        return None;
                    }
                };
                let resized =
                    image::imageops::resize(&squared, input_size, input_size, FilterType::Triangle);
                let tensor = match normalizer.normalize_to(&resized) {
                    Ok(tensor) => tensor,
                    Err(e) => {
                        warn!(stage = %stage, "classifier normalization failed: {e}");
                        return None;
                    }
                };
                match engine.infer_2d(&tensor) {
                    Ok(predictions) => predictions.row(0).to_vec().into(),
                    Err(e) => {
                        warn!(stage = %stage, "classifier inference failed: {e}");
                        None
                    }
                }
            })
            .await
            .flatten()
    }

    /// Closes the classifier. Irreversible and idempotent; subsequent calls
    /// return `None`.
    pub fn close(&self) {
        self.worker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ClassifierConfig;

    fn unloadable_classifier() -> StageClassifier {
        StageClassifier::new(
            "species",
            ClassifierConfig::new("/nonexistent/species.onnx", 6),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_failed_load_returns_none_not_error() {
        let classifier = unloadable_classifier();
        let crop = RgbImage::new(32, 32);
        assert_eq!(classifier.classify(&crop).await, None);
        assert!(!classifier.is_ready());
    }

    #[tokio::test]
    async fn test_classify_after_close_returns_none_without_hanging() {
        let classifier = unloadable_classifier();
        classifier.close();
        let crop = RgbImage::new(32, 32);
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            classifier.classify(&crop),
        )
        .await
        .expect("closed classifier must not hang");
        assert_eq!(result, None);
    }
}
