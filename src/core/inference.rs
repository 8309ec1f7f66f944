//! ONNX Runtime inference engine for the specimen models.
//!
//! Wraps a single `ort` session per model instance. Serialization of forward
//! passes is provided by each model's dedicated worker thread
//! ([`crate::core::worker::ModelWorker`]); the mutex here only guards the
//! readiness/teardown race on session metadata access.

use crate::core::config::{OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig};
use crate::core::errors::{SimpleError, VisionError};
use ndarray::{Array2, Array3};
use ort::execution_providers::ExecutionProviderDispatch;
use ort::logging::LogLevel;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use ort::value::{TensorRef, ValueType};
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

/// 4D tensor (batch, channels/height, height/width, width/channels) of f32.
pub type Tensor4D = ndarray::Array4<f32>;
/// 3D tensor of f32.
pub type Tensor3D = ndarray::Array3<f32>;
/// 2D tensor of f32.
pub type Tensor2D = ndarray::Array2<f32>;

/// ONNX Runtime inference engine bound to one model artifact.
pub struct OrtInfer {
    session: Mutex<Session>,
    input_name: String,
    model_path: std::path::PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("input_name", &self.input_name)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Creates a new inference engine with default session settings.
    pub fn new(model_path: impl AsRef<Path>) -> Result<Self, VisionError> {
        Self::from_config(model_path, None)
    }

    /// Creates a new inference engine, applying an optional session
    /// configuration (threads, optimization level, execution providers).
    pub fn from_config(
        model_path: impl AsRef<Path>,
        config: Option<&OrtSessionConfig>,
    ) -> Result<Self, VisionError> {
        let path = model_path.as_ref();
        let builder = Session::builder()?
            .with_log_level(LogLevel::Error)
            .map_err(|e| ort::Error::new_with_code(e.code(), e.message()))?;
        let mut builder = if let Some(cfg) = config {
            Self::apply_ort_config(builder, cfg)?
        } else {
            builder
        };
        let session = builder.commit_from_file(path).map_err(|e| {
            VisionError::model_load_error(
                path,
                "failed to create ONNX session",
                Some(e),
            )
        })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .ok_or_else(|| {
                VisionError::model_load_error(
                    path,
                    "model has no inputs",
                    None::<SimpleError>,
                )
            })?;
        let model_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown_model")
            .to_string();

        Ok(OrtInfer {
            session: Mutex::new(session),
            input_name,
            model_path: path.to_path_buf(),
            model_name,
        })
    }

    fn apply_ort_config(
        mut builder: SessionBuilder,
        cfg: &OrtSessionConfig,
    ) -> Result<SessionBuilder, ort::Error> {
        if let Some(intra) = cfg.intra_threads {
            builder = builder.with_intra_threads(intra).map_err(|e| ort::Error::new_with_code(e.code(), e.message()))?;
        }
        if let Some(inter) = cfg.inter_threads {
            builder = builder.with_inter_threads(inter).map_err(|e| ort::Error::new_with_code(e.code(), e.message()))?;
        }
        if let Some(level) = cfg.optimization_level {
            use ort::session::builder::GraphOptimizationLevel as GOL;
            let mapped = match level {
                OrtGraphOptimizationLevel::DisableAll => GOL::Disable,
                OrtGraphOptimizationLevel::Level1 => GOL::Level1,
                OrtGraphOptimizationLevel::Level2 => GOL::Level2,
                OrtGraphOptimizationLevel::Level3 => GOL::Level3,
            };
            builder = builder
                .with_optimization_level(mapped)
                .map_err(|e| ort::Error::new_with_code(e.code(), e.message()))?;
        }
        if let Some(eps) = &cfg.execution_providers {
            let providers = Self::build_execution_providers(eps);
            if !providers.is_empty() {
                builder = builder
                    .with_execution_providers(providers)
                    .map_err(|e| ort::Error::new_with_code(e.code(), e.message()))?;
            }
        }
        Ok(builder)
    }

    /// Builds execution providers from configuration.
    ///
    /// An accelerator that is not compiled in is logged and skipped; the CPU
    /// provider is always appended so an accelerator registration failure
    /// degrades to CPU inference instead of failing the model load.
    fn build_execution_providers(
        eps: &[OrtExecutionProvider],
    ) -> Vec<ExecutionProviderDispatch> {
        let mut providers = Vec::new();

        for ep in eps {
            match ep {
                OrtExecutionProvider::CPU => {
                    providers.push(ort::execution_providers::CPU::default().build());
                }
                #[cfg(feature = "cuda")]
                OrtExecutionProvider::CUDA { device_id } => {
                    let mut cuda_provider =
                        ort::execution_providers::CUDA::default();
                    if let Some(id) = device_id {
                        cuda_provider = cuda_provider.with_device_id(*id);
                    }
                    providers.push(cuda_provider.build());
                }
                #[cfg(feature = "coreml")]
                OrtExecutionProvider::CoreML { subgraphs } => {
                    let mut coreml_provider =
                        ort::execution_providers::CoreML::default();
                    if let Some(sub) = subgraphs {
                        coreml_provider = coreml_provider.with_subgraphs(*sub);
                    }
                    providers.push(coreml_provider.build());
                }
                #[cfg(feature = "xnnpack")]
                OrtExecutionProvider::Xnnpack {
                    intra_op_num_threads,
                } => {
                    let mut xnnpack_provider =
                        ort::execution_providers::XNNPACK::default();
                    if let Some(threads) = intra_op_num_threads {
                        xnnpack_provider =
                            xnnpack_provider.with_intra_op_num_threads(*threads);
                    }
                    providers.push(xnnpack_provider.build());
                }
                #[cfg(not(feature = "cuda"))]
                OrtExecutionProvider::CUDA { .. } => {
                    warn!("CUDA execution provider requested but cuda feature is not enabled, falling back to CPU");
                }
                #[cfg(not(feature = "coreml"))]
                OrtExecutionProvider::CoreML { .. } => {
                    warn!("CoreML execution provider requested but coreml feature is not enabled, falling back to CPU");
                }
                #[cfg(not(feature = "xnnpack"))]
                OrtExecutionProvider::Xnnpack { .. } => {
                    warn!("XNNPACK execution provider requested but xnnpack feature is not enabled, falling back to CPU");
                }
            }
        }

        providers.push(ort::execution_providers::CPU::default().build());
        providers
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Attempts to retrieve the primary input tensor shape from the session.
    ///
    /// Dynamic dimensions (e.g. -1) are returned as-is.
    pub fn primary_input_shape(&self) -> Option<Vec<i64>> {
        let session_guard = self.session.lock().ok()?;
        let input = session_guard.inputs().first()?;
        match input.dtype() {
            ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
            _ => None,
        }
    }

    /// Attempts to retrieve the primary output tensor shape from the session.
    pub fn primary_output_shape(&self) -> Option<Vec<i64>> {
        let session_guard = self.session.lock().ok()?;
        let output = session_guard.outputs().first()?;
        match output.dtype() {
            ValueType::Tensor { shape, .. } => Some(shape.iter().copied().collect()),
            _ => None,
        }
    }

    fn run_inference_with_processor<T>(
        &self,
        x: &Tensor4D,
        processor: impl FnOnce(&[i64], &[f32]) -> Result<T, VisionError>,
    ) -> Result<T, VisionError> {
        let input_shape = x.shape().to_vec();

        let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
            VisionError::inference_error(
                &self.model_name,
                &format!(
                    "failed to convert input tensor with shape {:?}",
                    input_shape
                ),
                e,
            )
        })?;

        let inputs = ort::inputs![self.input_name.as_str() => input_tensor];

        let mut session_guard = self.session.lock().map_err(|_| {
            VisionError::inference_error(
                &self.model_name,
                "failed to acquire session lock",
                SimpleError::new("session lock acquisition failed"),
            )
        })?;

        let output_name = session_guard
            .outputs()
            .first()
            .map(|o| o.name().to_string())
            .ok_or_else(|| VisionError::invalid_input("no outputs available in session"))?;

        let outputs = session_guard.run(inputs).map_err(|e| {
            VisionError::inference_error(
                &self.model_name,
                &format!(
                    "forward pass failed with input '{}' -> output '{}'",
                    self.input_name, output_name
                ),
                e,
            )
        })?;

        let (output_shape, output_data) = outputs[output_name.as_str()]
            .try_extract_tensor::<f32>()
            .map_err(|e| {
                VisionError::inference_error(
                    &self.model_name,
                    &format!("failed to extract output tensor '{}' as f32", output_name),
                    e,
                )
            })?;

        processor(output_shape, output_data)
    }

    /// Runs inference expecting a 2D output (batch x classes).
    pub fn infer_2d(&self, x: &Tensor4D) -> Result<Tensor2D, VisionError> {
        self.run_inference_with_processor(x, |output_shape, output_data| {
            if output_shape.len() != 2 {
                return Err(VisionError::invalid_input(format!(
                    "expected 2D output tensor, got shape {:?}",
                    output_shape
                )));
            }
            let shape = (output_shape[0] as usize, output_shape[1] as usize);
            Array2::from_shape_vec(shape, output_data.to_vec())
                .map_err(|e| VisionError::tensor_operation("failed to build 2D output", e))
        })
    }

    /// Runs inference expecting a 3D output (batch x rows x features).
    pub fn infer_3d(&self, x: &Tensor4D) -> Result<Tensor3D, VisionError> {
        self.run_inference_with_processor(x, |output_shape, output_data| {
            if output_shape.len() != 3 {
                return Err(VisionError::invalid_input(format!(
                    "expected 3D output tensor, got shape {:?}",
                    output_shape
                )));
            }
            let shape = (
                output_shape[0] as usize,
                output_shape[1] as usize,
                output_shape[2] as usize,
            );
            Array3::from_shape_vec(shape, output_data.to_vec())
                .map_err(|e| VisionError::tensor_operation("failed to build 3D output", e))
        })
    }
}
