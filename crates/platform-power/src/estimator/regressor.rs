//! Linear regression power model
//!
//! Artifact format (JSON):
//!
//! ```json
//! {
//!   "model_name": "platform-lr",
//!   "domains": {
//!     "0": {
//!       "bias": 90.0,
//!       "numerical": { "cpu_instructions": { "weight": 2.5, "mean": 1e9, "scale": 5e8 } },
//!       "categorical": { "cpu_architecture": { "Sapphire Rapids": 12.0 } }
//!     }
//!   }
//! }
//! ```

use super::{PowerEstimator, SampleBuffer};
use crate::config::ModelConfig;
use crate::error::{PowerModelError, Result};
use crate::models::{FeatureVector, PowerResult, PredictionMode};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
struct NumericalWeight {
    weight: f64,
    #[serde(default)]
    mean: f64,
    #[serde(default = "default_scale")]
    scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
struct DomainWeights {
    #[serde(default)]
    bias: f64,
    #[serde(default)]
    numerical: HashMap<String, NumericalWeight>,
    #[serde(default)]
    categorical: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegressorArtifact {
    #[serde(default)]
    model_name: Option<String>,
    domains: BTreeMap<u32, DomainWeights>,
}

/// Per-domain linear model over standardized features
pub struct LinearRegressor {
    feature_names: Vec<String>,
    /// Per domain: bias with categorical terms folded in, then (weight, mean, scale) per feature
    domains: BTreeMap<u32, (f64, Vec<(f64, f64, f64)>)>,
    buffer: SampleBuffer,
}

impl LinearRegressor {
    pub fn new(config: &ModelConfig, artifact: &[u8]) -> Result<Self> {
        let parsed: RegressorArtifact = serde_json::from_slice(artifact)
            .map_err(|e| PowerModelError::InvalidArtifact(e.to_string()))?;
        if parsed.domains.is_empty() {
            return Err(PowerModelError::InvalidArtifact(
                "regressor artifact declares no domains".to_string(),
            ));
        }

        let feature_names = config.node_feature_names.clone();
        let domains = parsed
            .domains
            .into_iter()
            .map(|(domain, weights)| {
                let bias = weights.bias
                    + config
                        .system_meta_data()
                        .filter_map(|(name, value)| {
                            weights.categorical.get(name).and_then(|m| m.get(value))
                        })
                        .sum::<f64>();
                let terms = feature_names
                    .iter()
                    .map(|name| match weights.numerical.get(name) {
                        Some(w) => {
                            let scale = if w.scale == 0.0 { 1.0 } else { w.scale };
                            (w.weight, w.mean, scale)
                        }
                        None => (0.0, 0.0, 1.0),
                    })
                    .collect();
                (domain, (bias, terms))
            })
            .collect();

        debug!(
            model_name = parsed.model_name.as_deref().unwrap_or("unnamed"),
            features = feature_names.len(),
            "Linear regressor loaded"
        );

        Ok(Self {
            buffer: SampleBuffer::new(feature_names.len()),
            feature_names,
            domains,
        })
    }

    fn evaluate(&self, row: &[f64]) -> PowerResult {
        self.domains
            .iter()
            .map(|(domain, (bias, terms))| {
                let power = terms
                    .iter()
                    .zip(row)
                    .fold(*bias, |acc, ((weight, mean, scale), x)| {
                        acc + weight * (x - mean) / scale
                    });
                (*domain, to_watts(power))
            })
            .collect()
    }
}

impl PowerEstimator for LinearRegressor {
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
            PredictionMode::Idle => Ok(self.evaluate(&vec![0.0; self.feature_names.len()])),
            PredictionMode::Absolute => {
                let row = self.buffer.latest().ok_or(PowerModelError::EmptySampleBuffer)?;
                Ok(self.evaluate(row))
            }
        }
    }

    fn is_ready(&self) -> bool {
        !self.domains.is_empty()
    }
}

/// Clamp a raw model output to non-negative whole Watts
pub(crate) fn to_watts(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
