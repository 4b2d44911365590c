//! Core data models for platform power estimation

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Power per domain index (e.g. socket) in Watts
pub type PowerResult = BTreeMap<u32, u64>;

/// One row of normalized feature values, aligned to the estimator's feature order
pub type FeatureVector = Vec<f64>;

/// Selects the prediction path of an estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictionMode {
    /// Baseline power without workload-derived signal
    Idle,
    /// Power including the current workload features
    Absolute,
}

/// Additive per-source counters
///
/// Values only grow until `reset_delta_values` is called by whoever exports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaStats {
    values: BTreeMap<String, u64>,
}

impl DeltaStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the counter for `source`
    pub fn add_delta(&mut self, source: &str, delta: u64) {
        let entry = self.values.entry(source.to_string()).or_insert(0);
        *entry = entry.saturating_add(delta);
    }

    pub fn get(&self, source: &str) -> Option<u64> {
        self.values.get(source).copied()
    }

    pub fn sum_all_delta_values(&self) -> u64 {
        self.values.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    pub fn reset_delta_values(&mut self) {
        self.values.values_mut().for_each(|v| *v = 0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Node-level resource usage and energy counters for one sampling interval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStats {
    /// Sampling period the resource deltas were collected over
    pub sample_period_secs: u64,
    /// Resource usage deltas keyed by feature name
    #[serde(default)]
    pub resource_usage: HashMap<String, DeltaStats>,
    /// Energy counters keyed by bucket name
    #[serde(default)]
    pub energy_usage: HashMap<String, DeltaStats>,
}

impl NodeStats {
    pub fn new(sample_period_secs: u64) -> Self {
        Self {
            sample_period_secs,
            resource_usage: HashMap::new(),
            energy_usage: HashMap::new(),
        }
    }

    /// Record a resource usage delta for `feature` reported by `source`
    pub fn add_resource_usage(&mut self, feature: &str, source: &str, delta: u64) {
        self.resource_usage
            .entry(feature.to_string())
            .or_default()
            .add_delta(source, delta);
    }

    /// Replace the resource deltas with a fresh interval's readings, keeping energy buckets
    pub fn replace_resource_usage(&mut self, usage: HashMap<String, DeltaStats>) {
        self.resource_usage = usage;
    }

    /// Energy bucket by name, created empty on first use
    pub fn energy_bucket_mut(&mut self, bucket: &str) -> &mut DeltaStats {
        self.energy_usage.entry(bucket.to_string()).or_default()
    }

    pub fn energy_bucket(&self, bucket: &str) -> Option<&DeltaStats> {
        self.energy_usage.get(bucket)
    }

    /// Convert the interval's readings into a row aligned to `feature_names`.
    ///
    /// Resource features come first, then energy buckets of the same name.
    /// Unknown features contribute 0.0. With `normalize` each value becomes a
    /// per-second rate over the sample period.
    pub fn to_estimator_values(&self, feature_names: &[String], normalize: bool) -> FeatureVector {
        feature_names
            .iter()
            .map(|name| {
                let raw = match self
                    .resource_usage
                    .get(name)
                    .or_else(|| self.energy_usage.get(name))
                {
                    Some(stats) => stats.sum_all_delta_values() as f64,
                    None => {
                        debug!(feature = %name, "Feature not present in node stats, using 0");
                        0.0
                    }
                };
                self.normalize(raw, normalize)
            })
            .collect()
    }

    fn normalize(&self, value: f64, normalize: bool) -> f64 {
        if normalize {
            value / self.sample_period_secs.max(1) as f64
        } else {
            value
        }
    }
}
