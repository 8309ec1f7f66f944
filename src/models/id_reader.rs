//! Specimen-ID reader: recognizes the printed identifier on the specimen
//! label, CTC-style.

use crate::core::config::IdReaderConfig;
use crate::core::worker::ModelWorker;
use crate::core::{OrtInfer, VisionResult};
use crate::models::common::ModelSlot;
use crate::processors::types::ChannelOrder;
use crate::processors::{CtcLabelDecode, NormalizeImage};
use image::RgbImage;
use image::imageops::FilterType;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Text reader for on-specimen ID labels.
///
/// Same worker-thread and lifecycle discipline as the other models.
/// Returns `None` when not ready, closed, failed, or nothing was decoded.
#[derive(Debug)]
pub struct SpecimenIdReader {
    worker: ModelWorker,
    slot: Arc<Mutex<ModelSlot>>,
    /// Input (height, width); fallback from config until the graph reports
    /// its real input shape.
    input_shape: Arc<Mutex<(u32, u32)>>,
    normalizer: NormalizeImage,
    decoder: CtcLabelDecode,
}

impl SpecimenIdReader {
    /// Creates a reader and starts loading its model in the background.
    pub fn new(config: IdReaderConfig) -> VisionResult<Self> {
        // Recognition input is scaled to [0,1] without mean/std correction.
        let normalizer = NormalizeImage::new(
            None,
            Some([0.0, 0.0, 0.0]),
            Some([1.0, 1.0, 1.0]),
            Some(ChannelOrder::CHW),
        )?;

        let worker = ModelWorker::spawn("id-reader");
        let slot = Arc::new(Mutex::new(ModelSlot::Loading));
        let input_shape = Arc::new(Mutex::new(config.fallback_input_shape));

        let load_slot = slot.clone();
        let load_shape = input_shape.clone();
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
                        // NCHW input: [batch, channels, height, width].
                        if let (Some(&h), Some(&w)) = (shape.get(2), shape.get(3))
                            && h > 0
                            && w > 0
                            && let Ok(mut dims) = load_shape.lock()
                        {
                            *dims = (h as u32, w as u32);
                        }
                    }
                    debug!(model = engine.model_name(), "specimen-id reader ready");
                    *guard = ModelSlot::Ready(Arc::new(engine));
                }
                Err(e) => {
                    error!(
                        path = %model_path.display(),
                        "specimen-id reader initialization failed: {e}"
                    );
                    *guard = ModelSlot::Failed;
                }
            }
        });

        Ok(Self {
            worker,
            slot,
            input_shape,
            normalizer,
            decoder: CtcLabelDecode::default(),
        })
    }

    /// Returns true once the model has loaded successfully.
    pub fn is_ready(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| matches!(*slot, ModelSlot::Ready(_)))
            .unwrap_or(false)
    }

    /// Reads the specimen ID from a label image. Returns `None` when the
    /// model is unavailable or nothing was decoded.
    pub async fn read(&self, label: &RgbImage) -> Option<String> {
        let engine = match self.slot.lock() {
            Ok(slot) => match slot.engine() {
                Some(engine) => engine,
                None => {
                    debug!("specimen-id reader not ready");
                    return None;
                }
            },
            Err(_) => return None,
        };

        let label = label.clone();
        let normalizer = self.normalizer.clone();
        let decoder = self.decoder.clone();
        let (height, width) = match self.input_shape.lock() {
            Ok(dims) => *dims,
            Err(_) => return None,
        };

        self.worker
            .run(move || {
                let resized = image::imageops::resize(&label, width, height, FilterType::Triangle);
                let tensor = match normalizer.normalize_to(&resized) {
                    Ok(tensor) => tensor,
                    Err(e) => {
                        warn!("id-reader normalization failed: {e}");
                        return None;
                    }
                };
                match engine.infer_3d(&tensor) {
                    Ok(predictions) => {
                        let (text, confidence) = decoder.decode(&predictions);
                        if text.is_empty() {
                            None
                        } else {
                            debug!(confidence, "specimen id decoded");
                            Some(text)
                        }
                    }
                    Err(e) => {
                        warn!("id-reader inference failed: {e}");
                        None
                    }
                }
            })
            .await
            .flatten()
    }

    /// Closes the reader. Irreversible and idempotent.
    pub fn close(&self) {
        self.worker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::IdReaderConfig;

    #[tokio::test]
    async fn test_failed_load_returns_none() {
        let reader =
            SpecimenIdReader::new(IdReaderConfig::new("/nonexistent/reader.onnx")).unwrap();
        let label = RgbImage::new(64, 16);
        assert_eq!(reader.read(&label).await, None);
        assert!(!reader.is_ready());
    }

    #[tokio::test]
    async fn test_read_after_close_returns_none() {
        let reader =
            SpecimenIdReader::new(IdReaderConfig::new("/nonexistent/reader.onnx")).unwrap();
        reader.close();
        let label = RgbImage::new(64, 16);
        assert_eq!(reader.read(&label).await, None);
    }
}
