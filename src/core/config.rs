//! Configuration types for the inference pipeline.
//!
//! All configuration structs are serde-compatible so a pipeline can be fully
//! described in JSON and loaded at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Graph optimization levels for ONNX Runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    Level3,
}

impl Default for OrtGraphOptimizationLevel {
    fn default() -> Self {
        Self::Level1
    }
}

/// Execution providers for ONNX Runtime.
///
/// A requested accelerator that fails to register is logged and the session
/// falls back to CPU rather than failing the load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrtExecutionProvider {
    /// CPU execution provider (always available).
    CPU,
    /// NVIDIA CUDA execution provider.
    CUDA {
        /// CUDA device ID (default: 0).
        device_id: Option<i32>,
    },
    /// CoreML execution provider (macOS/iOS only).
    CoreML {
        /// Enable subgraph partitioning.
        subgraphs: Option<bool>,
    },
    /// XNNPACK execution provider for mobile-class CPUs.
    Xnnpack {
        /// Size of the XNNPACK intra-op thread pool.
        intra_op_num_threads: Option<usize>,
    },
}

impl Default for OrtExecutionProvider {
    fn default() -> Self {
        Self::CPU
    }
}

/// Configuration for ONNX Runtime sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Number of threads used to parallelize execution within nodes.
    pub intra_threads: Option<usize>,
    /// Number of threads used to parallelize execution across nodes.
    pub inter_threads: Option<usize>,
    /// Graph optimization level.
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference.
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
}

impl OrtSessionConfig {
    /// Creates a new empty session configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of intra-op threads.
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = Some(threads);
        self
    }

    /// Sets the graph optimization level.
    pub fn with_optimization_level(mut self, level: OrtGraphOptimizationLevel) -> Self {
        self.optimization_level = Some(level);
        self
    }

    /// Sets the execution providers in order of preference.
    pub fn with_execution_providers(mut self, providers: Vec<OrtExecutionProvider>) -> Self {
        self.execution_providers = Some(providers);
        self
    }
}

/// Configuration for the specimen detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Path to the detection model artifact.
    pub model_path: PathBuf,
    /// Confidence threshold below which candidates are discarded.
    pub confidence_threshold: f32,
    /// IoU threshold for non-max suppression.
    pub iou_threshold: f32,
    /// Fallback square input size used until the loaded graph reports its
    /// own input shape.
    pub fallback_input_size: u32,
    /// Optional ONNX Runtime session configuration.
    pub ort_session: Option<OrtSessionConfig>,
}

impl DetectorConfig {
    /// Creates a detector configuration for a model path with default policy
    /// values (confidence 0.8, IoU 0.5, 640x640 fallback input).
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            confidence_threshold: 0.8,
            iou_threshold: 0.5,
            fallback_input_size: 640,
            ort_session: None,
        }
    }
}

/// Configuration for one classification stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Path to the classification model artifact.
    pub model_path: PathBuf,
    /// Fallback square input size used until the loaded graph reports its
    /// own input shape.
    pub fallback_input_size: u32,
    /// Number of classes the paired label enumeration expects. Used only for
    /// the warn-on-mismatch check against the loaded graph.
    pub expected_classes: usize,
    /// Optional ONNX Runtime session configuration.
    pub ort_session: Option<OrtSessionConfig>,
}

impl ClassifierConfig {
    /// Creates a classifier configuration with the 224x224 fallback input.
    pub fn new(model_path: impl Into<PathBuf>, expected_classes: usize) -> Self {
        Self {
            model_path: model_path.into(),
            fallback_input_size: 224,
            expected_classes,
            ort_session: None,
        }
    }
}

/// Configuration for the specimen-ID reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdReaderConfig {
    /// Path to the recognition model artifact.
    pub model_path: PathBuf,
    /// Fallback input size (height, width) used until the loaded graph
    /// reports its own input shape.
    pub fallback_input_shape: (u32, u32),
    /// Optional ONNX Runtime session configuration.
    pub ort_session: Option<OrtSessionConfig>,
}

impl IdReaderConfig {
    /// Creates an ID-reader configuration with the 48x320 fallback input.
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            fallback_input_shape: (48, 320),
            ort_session: None,
        }
    }
}

/// Full pipeline configuration: one detector, three classification stages,
/// and the specimen-ID reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Specimen detector configuration.
    pub detector: DetectorConfig,
    /// Species classifier configuration.
    pub species: ClassifierConfig,
    /// Sex classifier configuration.
    pub sex: ClassifierConfig,
    /// Abdomen-status classifier configuration.
    pub abdomen: ClassifierConfig,
    /// Specimen-ID reader configuration.
    pub id_reader: IdReaderConfig,
    /// Live-preview throttle: process 1 of every `frame_skip` frames.
    pub frame_skip: u32,
}

impl PipelineConfig {
    /// Loads a pipeline configuration from a JSON file.
    pub fn from_json_file(path: &std::path::Path) -> crate::core::VisionResult<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            crate::core::VisionError::config_error(format!(
                "failed to parse pipeline config '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Validates policy values that the rest of the pipeline assumes.
    pub fn validate(&self) -> crate::core::VisionResult<()> {
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(crate::core::VisionError::config_error(format!(
                "confidence threshold must be in [0, 1], got {}",
                self.detector.confidence_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.detector.iou_threshold) {
            return Err(crate::core::VisionError::config_error(format!(
                "IoU threshold must be in [0, 1], got {}",
                self.detector.iou_threshold
            )));
        }
        if self.frame_skip == 0 {
            return Err(crate::core::VisionError::config_error(
                "frame_skip must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> PipelineConfig {
        PipelineConfig {
            detector: DetectorConfig::new("models/detector.onnx"),
            species: ClassifierConfig::new("models/species.onnx", 6),
            sex: ClassifierConfig::new("models/sex.onnx", 2),
            abdomen: ClassifierConfig::new("models/abdomen.onnx", 4),
            id_reader: IdReaderConfig::new("models/id_reader.onnx"),
            frame_skip: 3,
        }
    }

    #[test]
    fn test_default_policy_values() {
        let config = sample_config();
        assert_eq!(config.detector.confidence_threshold, 0.8);
        assert_eq!(config.detector.iou_threshold, 0.5);
        assert_eq!(config.species.fallback_input_size, 224);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        let mut config = sample_config();
        config.detector.confidence_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.frame_skip = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let config = sample_config();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.frame_skip, 3);
        assert_eq!(parsed.sex.expected_classes, 2);
    }
}
