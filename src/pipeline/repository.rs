//! Inference repository: single façade over the model fleet.
//!
//! The repository owns one worker-backed model per task and exposes the four
//! operations the capture flow needs. Models are constructed lazily on first
//! use so app startup does not pay for sessions the operator never reaches,
//! and `close_resources` tears the whole fleet down irreversibly.

use crate::core::{PipelineConfig, VisionResult};
use crate::domain::{CaptureCondition, ClassifiedSpecimen, InferenceResult};
use crate::models::{SpecimenDetector, SpecimenIdReader, StageClassifier};
use crate::pipeline::workflow;
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Admits 1 of every `interval` frames from a live preview stream.
///
/// Counting is atomic so the camera callback thread and the inference
/// dispatcher can share one throttle without locking.
#[derive(Debug)]
pub struct FrameThrottle {
    interval: u32,
    counter: AtomicU32,
}

impl FrameThrottle {
    /// Creates a throttle admitting one frame per `interval`. An interval of
    /// 0 or 1 admits every frame.
    pub fn new(interval: u32) -> Self {
        Self {
            interval: interval.max(1),
            counter: AtomicU32::new(0),
        }
    }

    /// Returns whether the next frame should be processed.
    pub fn admit(&self) -> bool {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        n % self.interval == 0
    }
}

/// Lazily-constructed slot for one model handle.
type Slot<T> = Mutex<Option<Arc<T>>>;

/// Façade over the detection, classification and ID-reading models.
///
/// All operations return sentinels rather than errors: a frame against a
/// closed or unready repository yields no detections, `None` labels, or a
/// named [`CaptureCondition`], never a panic or a propagated low-level error.
pub struct InferenceRepository {
    config: PipelineConfig,
    detector: Slot<SpecimenDetector>,
    species: Slot<StageClassifier>,
    sex: Slot<StageClassifier>,
    abdomen: Slot<StageClassifier>,
    id_reader: Slot<SpecimenIdReader>,
    throttle: FrameThrottle,
    closed: AtomicBool,
}

impl InferenceRepository {
    /// Creates a repository; no model sessions are opened yet.
    pub fn new(config: PipelineConfig) -> Self {
        let throttle = FrameThrottle::new(config.frame_skip);
        Self {
            config,
            detector: Mutex::new(None),
            species: Mutex::new(None),
            sex: Mutex::new(None),
            abdomen: Mutex::new(None),
            id_reader: Mutex::new(None),
            throttle,
            closed: AtomicBool::new(false),
        }
    }

    /// Whether `close_resources` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Live-preview throttle; callers drop frames this does not admit.
    pub fn throttle(&self) -> &FrameThrottle {
        &self.throttle
    }

    fn slot_get_or_init<T>(
        &self,
        slot: &Slot<T>,
        name: &str,
        build: impl FnOnce() -> VisionResult<T>,
    ) -> Option<Arc<T>> {
        if self.is_closed() {
            debug!(model = name, "repository closed, refusing model init");
            return None;
        }
        let mut guard = slot.lock().ok()?;
        if guard.is_none() {
            match build() {
                Ok(model) => {
                    info!(model = name, "model worker started");
                    *guard = Some(Arc::new(model));
                }
                Err(err) => {
                    warn!(model = name, error = %err, "model construction failed");
                    return None;
                }
            }
        }
        guard.clone()
    }

    fn detector(&self) -> Option<Arc<SpecimenDetector>> {
        self.slot_get_or_init(&self.detector, "detector", || {
            SpecimenDetector::new(self.config.detector.clone())
        })
    }

    fn species(&self) -> Option<Arc<StageClassifier>> {
        self.slot_get_or_init(&self.species, "species", || {
            StageClassifier::new("species", self.config.species.clone())
        })
    }

    fn sex(&self) -> Option<Arc<StageClassifier>> {
        self.slot_get_or_init(&self.sex, "sex", || {
            StageClassifier::new("sex", self.config.sex.clone())
        })
    }

    fn abdomen(&self) -> Option<Arc<StageClassifier>> {
        self.slot_get_or_init(&self.abdomen, "abdomen", || {
            StageClassifier::new("abdomen", self.config.abdomen.clone())
        })
    }

    fn id_reader(&self) -> Option<Arc<SpecimenIdReader>> {
        self.slot_get_or_init(&self.id_reader, "id_reader", || {
            SpecimenIdReader::new(self.config.id_reader.clone())
        })
    }

    /// Detects specimens in a full camera frame.
    ///
    /// Returns an empty list when the repository is closed or the detector
    /// is not ready.
    pub async fn detect_specimen(&self, frame: &RgbImage) -> Vec<InferenceResult> {
        match self.detector() {
            Some(detector) => detector.detect(frame).await,
            None => Vec::new(),
        }
    }

    /// Runs the gated classification cascade over a frame's detections.
    ///
    /// Enforces the exactly-one-specimen rule before any classifier runs.
    pub async fn classify_specimen(
        &self,
        frame: &RgbImage,
        detections: &[InferenceResult],
    ) -> Result<ClassifiedSpecimen, CaptureCondition> {
        let (species, sex, abdomen) = match (self.species(), self.sex(), self.abdomen()) {
            (Some(species), Some(sex), Some(abdomen)) => (species, sex, abdomen),
            _ => return Err(CaptureCondition::ModelInitializationFailed),
        };
        workflow::classify_specimen(frame, detections, &*species, &*sex, &*abdomen).await
    }

    /// Reads the printed specimen ID from a label image.
    pub async fn read_specimen_id(&self, label: &RgbImage) -> Option<String> {
        self.id_reader()?.read(label).await
    }

    /// Shuts every model worker down. Irreversible and idempotent: later
    /// calls are no-ops and later operations return empty sentinels.
    pub fn close_resources(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("closing inference repository");
        if let Ok(mut guard) = self.detector.lock()
            && let Some(detector) = guard.take()
        {
            detector.close();
        }
        for slot in [&self.species, &self.sex, &self.abdomen] {
            if let Ok(mut guard) = slot.lock()
                && let Some(classifier) = guard.take()
            {
                classifier.close();
            }
        }
        if let Ok(mut guard) = self.id_reader.lock()
            && let Some(reader) = guard.take()
        {
            reader.close();
        }
    }
}

impl Drop for InferenceRepository {
    fn drop(&mut self) {
        self.close_resources();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClassifierConfig, DetectorConfig, IdReaderConfig};
    use crate::domain::{NormalizedBox, SpeciesLabel};
    use std::path::PathBuf;

    fn missing_model_config() -> PipelineConfig {
        PipelineConfig {
            detector: DetectorConfig::new(PathBuf::from("/nonexistent/detector.onnx")),
            species: ClassifierConfig::new(
                PathBuf::from("/nonexistent/species.onnx"),
                SpeciesLabel::ALL.len(),
            ),
            sex: ClassifierConfig::new(PathBuf::from("/nonexistent/sex.onnx"), 2),
            abdomen: ClassifierConfig::new(PathBuf::from("/nonexistent/abdomen.onnx"), 4),
            id_reader: IdReaderConfig::new(PathBuf::from("/nonexistent/id.onnx")),
            frame_skip: 3,
        }
    }

    #[test]
    fn test_throttle_admits_one_of_n() {
        let throttle = FrameThrottle::new(3);
        let admitted: Vec<bool> = (0..9).map(|_| throttle.admit()).collect();
        assert_eq!(admitted.iter().filter(|a| **a).count(), 3);
        assert!(admitted[0]);
        assert!(!admitted[1]);
        assert!(admitted[3]);
    }

    #[test]
    fn test_throttle_zero_interval_admits_everything() {
        let throttle = FrameThrottle::new(0);
        assert!((0..5).all(|_| throttle.admit()));
    }

    #[tokio::test]
    async fn test_detect_on_failed_model_returns_empty() {
        let repo = InferenceRepository::new(missing_model_config());
        let frame = RgbImage::new(64, 64);
        assert!(repo.detect_specimen(&frame).await.is_empty());
        repo.close_resources();
    }

    #[tokio::test]
    async fn test_operations_after_close_return_sentinels() {
        let repo = InferenceRepository::new(missing_model_config());
        repo.close_resources();
        repo.close_resources();
        assert!(repo.is_closed());

        let frame = RgbImage::new(64, 64);
        assert!(repo.detect_specimen(&frame).await.is_empty());
        assert_eq!(repo.read_specimen_id(&frame).await, None);

        let detection =
            InferenceResult::detection(NormalizedBox::new(0.2, 0.2, 0.4, 0.4), 0.9, 0);
        assert_eq!(
            repo.classify_specimen(&frame, &[detection]).await.unwrap_err(),
            CaptureCondition::ModelInitializationFailed
        );
    }

    #[tokio::test]
    async fn test_classify_empty_detections_is_no_specimen() {
        let repo = InferenceRepository::new(missing_model_config());
        let frame = RgbImage::new(64, 64);
        // The exactly-one rule fires before any classifier is consulted,
        // but the repository still needs its classifiers constructible;
        // with unloadable models the cascade returns None logits.
        let outcome = repo.classify_specimen(&frame, &[]).await;
        assert!(matches!(
            outcome,
            Err(CaptureCondition::NoSpecimenFound)
                | Err(CaptureCondition::ModelInitializationFailed)
        ));
        repo.close_resources();
    }
}
