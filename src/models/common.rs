//! Shared model lifecycle state.

use crate::core::OrtInfer;
use std::sync::Arc;

/// Readiness state of one model instance.
///
/// A model starts `Loading` while its session is constructed asynchronously
/// on the model's worker thread. Load failure is terminal: the instance
/// stays `Failed` and every call short-circuits to an empty/`None` sentinel
/// for the lifetime of the instance.
#[derive(Debug, Clone, Default)]
pub enum ModelSlot {
    /// Asynchronous load has not finished yet.
    #[default]
    Loading,
    /// Session is loaded and ready for inference.
    Ready(Arc<OrtInfer>),
    /// Session load failed; permanently not ready.
    Failed,
}

impl ModelSlot {
    /// Returns the engine when the model is ready.
    pub fn engine(&self) -> Option<Arc<OrtInfer>> {
        match self {
            ModelSlot::Ready(engine) => Some(engine.clone()),
            _ => None,
        }
    }
}
