//! Pluggable power estimation backends

mod artifact;
mod onnx;
mod regressor;

pub use artifact::{compute_checksum, load_artifact, ArtifactSource, MAX_ARTIFACT_BYTES};
pub use onnx::OnnxEstimator;
pub use regressor::LinearRegressor;

use crate::config::{ModelConfig, ModelType};
use crate::error::{PowerModelError, Result};
use crate::models::{FeatureVector, PowerResult, PredictionMode};

/// Trait for platform power prediction backends
///
/// A round is `reset_sample_buffer`, `add_feature_row`, then `predict`.
/// Idle predictions skip the first two steps. Backends only ever see
/// power, never elapsed time.
pub trait PowerEstimator: Send {
    /// Drop any buffered feature rows. Idempotent.
    fn reset_sample_buffer(&mut self);

    /// Feature names in the order `add_feature_row` expects them
    fn feature_names(&self) -> &[String];

    /// Buffer one row for the upcoming prediction
    fn add_feature_row(&mut self, values: FeatureVector) -> Result<()>;

    /// Predict power per domain index
    fn predict(&mut self, mode: PredictionMode) -> Result<PowerResult>;

    /// True once artifacts are loaded
    fn is_ready(&self) -> bool;
}

/// Build the backend selected by `config.model_type` from artifact bytes
pub fn create_estimator(config: &ModelConfig, artifact: &[u8]) -> Result<Box<dyn PowerEstimator>> {
    match config.model_type {
        ModelType::LinearRegressor => Ok(Box::new(LinearRegressor::new(config, artifact)?)),
        ModelType::Onnx => Ok(Box::new(OnnxEstimator::new(config, artifact)?)),
    }
}

/// Feature rows pending prediction, shared by the concrete backends
#[derive(Debug, Default)]
pub(crate) struct SampleBuffer {
    width: usize,
    rows: Vec<FeatureVector>,
}

impl SampleBuffer {
    pub(crate) fn new(width: usize) -> Self {
        Self {
            width,
            rows: Vec::new(),
        }
    }

    pub(crate) fn reset(&mut self) {
        self.rows.clear();
    }

    pub(crate) fn push(&mut self, row: FeatureVector) -> Result<()> {
        if row.len() != self.width {
            return Err(PowerModelError::FeatureWidthMismatch {
                expected: self.width,
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub(crate) fn latest(&self) -> Option<&FeatureVector> {
        self.rows.last()
    }
}
