//! ONNX inference using tract
//!
//! The graph takes a single `[1, n_features]` f32 input and produces one
//! output value per power domain.

use super::regressor::to_watts;
use super::{PowerEstimator, SampleBuffer};
use crate::config::ModelConfig;
use crate::error::{PowerModelError, Result};
use crate::models::{FeatureVector, PowerResult, PredictionMode};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Maximum inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based platform power estimator
pub struct OnnxEstimator {
    model: TractModel,
    feature_names: Vec<String>,
    buffer: SampleBuffer,
}

impl OnnxEstimator {
    pub fn new(config: &ModelConfig, model_bytes: &[u8]) -> Result<Self> {
        let feature_names = config.node_feature_names.clone();
        if feature_names.is_empty() {
            return Err(PowerModelError::InvalidArtifact(
                "ONNX model needs at least one node feature".to_string(),
            ));
        }
        let model = Self::load_model(model_bytes, feature_names.len())
            .map_err(|e| PowerModelError::InvalidArtifact(format!("{:#}", e)))?;
        Ok(Self {
            model,
            buffer: SampleBuffer::new(feature_names.len()),
            feature_names,
        })
    }

    /// Load and optimize an ONNX model from bytes
    fn load_model(model_bytes: &[u8], num_features: usize) -> TractResult<TractModel> {
        tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))?
            .with_input_fact(0, f32::fact([1, num_features]).into())?
            .into_optimized()?
            .into_runnable()
    }

    fn run(&self, row: &[f64]) -> Result<PowerResult> {
        let start = Instant::now();
        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, data.len()), data)
            .map_err(|e| PowerModelError::Inference(e.to_string()))?
            .into();

        let result = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PowerModelError::Inference(format!("{:#}", e)))?;
        let output = result
            .first()
            .ok_or_else(|| PowerModelError::Inference("no output from model".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| PowerModelError::Inference(format!("{:#}", e)))?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(view
            .iter()
            .enumerate()
            .map(|(domain, value)| (domain as u32, to_watts(f64::from(*value))))
            .collect())
    }
}

impl PowerEstimator for OnnxEstimator {
    fn reset_sample_buffer(&mut self) {
        self.buffer.reset();
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn add_feature_row(&mut self, values: FeatureVector) -> Result<()> {
        self.buffer.push(values)
    }

    fn predict(&mut self, mode: PredictionMode) -> Result<PowerResult> {
        match mode {
            PredictionMode::Idle => self.run(&vec![0.0; self.feature_names.len()]),
            PredictionMode::Absolute => {
                let row = self.buffer.latest().ok_or(PowerModelError::EmptySampleBuffer)?;
                self.run(row)
            }
        }
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelType, PowerModelSettings, PLATFORM_ENERGY_SOURCE};

    fn config(features: &[&str]) -> ModelConfig {
        let settings = PowerModelSettings {
            model_type: ModelType::Onnx,
            ..Default::default()
        };
        let mut config = ModelConfig::from_settings(&settings, PLATFORM_ENERGY_SOURCE);
        config.node_feature_names = features.iter().map(|f| f.to_string()).collect();
        config
    }

    // Minimal protobuf writer, enough to assemble a ModelProto by hand
    fn varint(out: &mut Vec<u8>, mut value: u64) {
        while value >= 0x80 {
            out.push((value as u8) | 0x80);
            value >>= 7;
        }
        out.push(value as u8);
    }

    fn field_varint(out: &mut Vec<u8>, field: u64, value: u64) {
        varint(out, field << 3);
        varint(out, value);
    }

    fn field_bytes(out: &mut Vec<u8>, field: u64, bytes: &[u8]) {
        varint(out, (field << 3) | 2);
        varint(out, bytes.len() as u64);
        out.extend_from_slice(bytes);
    }

    const ONNX_FLOAT: u64 = 1;

    fn tensor(name: &str, dims: &[u64], values: &[f32]) -> Vec<u8> {
        let mut out = Vec::new();
        for dim in dims {
            field_varint(&mut out, 1, *dim);
        }
        field_varint(&mut out, 2, ONNX_FLOAT);
        field_bytes(&mut out, 8, name.as_bytes());
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        field_bytes(&mut out, 9, &raw);
        out
    }

    fn value_info(name: &str, dims: &[u64]) -> Vec<u8> {
        let mut shape = Vec::new();
        for dim in dims {
            let mut d = Vec::new();
            field_varint(&mut d, 1, *dim);
            field_bytes(&mut shape, 1, &d);
        }
        let mut tensor_type = Vec::new();
        field_varint(&mut tensor_type, 1, ONNX_FLOAT);
        field_bytes(&mut tensor_type, 2, &shape);
        let mut type_proto = Vec::new();
        field_bytes(&mut type_proto, 1, &tensor_type);

        let mut out = Vec::new();
        field_bytes(&mut out, 1, name.as_bytes());
        field_bytes(&mut out, 2, &type_proto);
        out
    }

    fn node(inputs: &[&str], output: &str, op_type: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for input in inputs {
            field_bytes(&mut out, 1, input.as_bytes());
        }
        field_bytes(&mut out, 2, output.as_bytes());
        field_bytes(&mut out, 4, op_type.as_bytes());
        out
    }

    /// `y = x @ weights + bias` with x `[1, 2]` and y `[1, 2]`.
    ///
    /// weights = [[1, -1], [2, 0.5]], bias = [10, -5]
    fn two_domain_model() -> Vec<u8> {
        let mut graph = Vec::new();
        field_bytes(&mut graph, 1, &node(&["x", "weights"], "xw", "MatMul"));
        field_bytes(&mut graph, 1, &node(&["xw", "bias"], "y", "Add"));
        field_bytes(&mut graph, 2, b"platform");
        field_bytes(&mut graph, 5, &tensor("weights", &[2, 2], &[1.0, -1.0, 2.0, 0.5]));
        field_bytes(&mut graph, 5, &tensor("bias", &[2], &[10.0, -5.0]));
        field_bytes(&mut graph, 11, &value_info("x", &[1, 2]));
        field_bytes(&mut graph, 12, &value_info("y", &[1, 2]));

        let mut opset = Vec::new();
        field_varint(&mut opset, 2, 13);

        let mut model = Vec::new();
        field_varint(&mut model, 1, 7);
        field_bytes(&mut model, 7, &graph);
        field_bytes(&mut model, 8, &opset);
        model
    }

    fn estimator() -> OnnxEstimator {
        OnnxEstimator::new(&config(&["cpu_cycles", "cpu_instructions"]), &two_domain_model())
            .unwrap()
    }

    fn watts(values: &[(u32, u64)]) -> PowerResult {
        values.iter().copied().collect()
    }

    #[test]
    fn test_absolute_uses_latest_row_per_domain() {
        let mut estimator = estimator();
        assert!(estimator.is_ready());

        estimator.add_feature_row(vec![3.0, 4.0]).unwrap();
        estimator.add_feature_row(vec![0.0, 20.0]).unwrap();
        // [0, 20] -> [0 + 40 + 10, 0 + 10 - 5]
        let power = estimator.predict(PredictionMode::Absolute).unwrap();
        assert_eq!(power, watts(&[(0, 50), (1, 5)]));
    }

    #[test]
    fn test_negative_output_clamped_to_zero() {
        let mut estimator = estimator();
        estimator.add_feature_row(vec![3.0, 4.0]).unwrap();
        // [3, 4] -> [3 + 8 + 10, -3 + 2 - 5]
        let power = estimator.predict(PredictionMode::Absolute).unwrap();
        assert_eq!(power, watts(&[(0, 21), (1, 0)]));
    }

    #[test]
    fn test_idle_ignores_buffered_row() {
        let mut estimator = estimator();
        estimator.add_feature_row(vec![0.0, 20.0]).unwrap();
        let power = estimator.predict(PredictionMode::Idle).unwrap();
        assert_eq!(power, watts(&[(0, 10), (1, 0)]));
    }

    #[test]
    fn test_absolute_after_reset_needs_a_row() {
        let mut estimator = estimator();
        estimator.add_feature_row(vec![3.0, 4.0]).unwrap();
        estimator.reset_sample_buffer();
        let err = estimator.predict(PredictionMode::Absolute).unwrap_err();
        assert!(matches!(err, PowerModelError::EmptySampleBuffer));
    }

    #[test]
    fn test_row_width_checked() {
        let mut estimator = estimator();
        let err = estimator.add_feature_row(vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            PowerModelError::FeatureWidthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = OnnxEstimator::new(&config(&["cpu_cycles"]), b"definitely not onnx")
            .err()
            .unwrap();
        assert!(matches!(err, PowerModelError::InvalidArtifact(_)));
    }

    #[test]
    fn test_requires_features() {
        let err = OnnxEstimator::new(&config(&[]), b"").err().unwrap();
        assert!(matches!(err, PowerModelError::InvalidArtifact(_)));
    }
}
