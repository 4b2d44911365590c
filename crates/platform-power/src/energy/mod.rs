//! Platform power to energy integration
//!
//! `get_platform_power` runs one estimation round and keys the result by
//! source ID. `apply_absolute_energy` and `apply_idle_energy` fold that power
//! into the node's delta-stat buckets, multiplying by the sample period.

#[cfg(test)]
mod tests;

use crate::config::{ABS_ENERGY_IN_PLATFORM, IDLE_ENERGY_IN_PLATFORM};
use crate::models::{NodeStats, PredictionMode};
use crate::selector::PlatformPowerModel;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Tag prefixed to the domain index to form a platform source ID
pub const ESTIMATOR_SOURCE_ID: &str = "estimator";

/// Source ID for a domain, e.g. `estimator0`
pub fn source_id(domain: u32) -> String {
    format!("{}{}", ESTIMATOR_SOURCE_ID, domain)
}

/// Estimate platform power per source for one sampling interval.
///
/// Absolute rounds reset the estimator buffer and add exactly one feature row
/// before predicting. Idle rounds leave the buffer untouched. Any failure
/// yields an empty map.
pub fn get_platform_power(
    model: &mut PlatformPowerModel,
    node_stats: &NodeStats,
    mode: PredictionMode,
) -> HashMap<String, u64> {
    let mut platform_power = HashMap::new();
    let metrics = model.metrics().clone();

    let Some(estimator) = model.estimator_mut() else {
        error!("Node platform power model was not created");
        metrics.inc_missing_estimator();
        return platform_power;
    };

    let start = Instant::now();
    if mode == PredictionMode::Absolute {
        estimator.reset_sample_buffer();
        let feature_values = node_stats.to_estimator_values(estimator.feature_names(), true);
        if let Err(e) = estimator.add_feature_row(feature_values) {
            warn!(error = %e, "Failed to add node features to platform power model");
            metrics.inc_prediction_errors(mode);
            return platform_power;
        }
    }

    let powers = match estimator.predict(mode) {
        Ok(powers) => powers,
        Err(e) => {
            warn!(error = %e, ?mode, "Failed to get node platform power");
            metrics.inc_prediction_errors(mode);
            return platform_power;
        }
    };
    metrics.observe_prediction_latency(start.elapsed().as_secs_f64());
    metrics.inc_predictions(mode);

    for (domain, power) in powers {
        platform_power.insert(source_id(domain), power);
    }
    debug!(?mode, sources = platform_power.len(), "Estimated node platform power");
    platform_power
}

/// Add absolute platform energy for this interval to the absolute bucket.
///
/// A round that yields no power leaves `energy_usage` untouched, including
/// its set of buckets.
pub fn apply_absolute_energy(model: &mut PlatformPowerModel, node_stats: &mut NodeStats) {
    apply_energy(model, node_stats, PredictionMode::Absolute, ABS_ENERGY_IN_PLATFORM);
}

/// Add idle platform energy for this interval to the idle bucket
pub fn apply_idle_energy(model: &mut PlatformPowerModel, node_stats: &mut NodeStats) {
    apply_energy(model, node_stats, PredictionMode::Idle, IDLE_ENERGY_IN_PLATFORM);
}

fn apply_energy(
    model: &mut PlatformPowerModel,
    node_stats: &mut NodeStats,
    mode: PredictionMode,
    bucket: &str,
) {
    let platform_power = get_platform_power(model, node_stats, mode);
    if platform_power.is_empty() {
        return;
    }
    let sample_period = node_stats.sample_period_secs;
    let energy = node_stats.energy_bucket_mut(bucket);
    for (source, power) in &platform_power {
        energy.add_delta(source, power.saturating_mul(sample_period));
    }
}
