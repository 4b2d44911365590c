//! Observability for platform power estimation
//!
//! Provides:
//! - Prometheus instrumentation (prediction counts, errors, latency, enabled models),
//!   registered in the default registry for whoever exports it
//! - Structured logging of estimator lifecycle and energy events

use crate::models::PredictionMode;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EstimatorMetricsInner> = OnceLock::new();

struct EstimatorMetricsInner {
    predictions: IntCounterVec,
    prediction_errors: IntCounterVec,
    missing_estimator_queries: IntCounter,
    prediction_latency_seconds: Histogram,
    models_enabled: IntGauge,
}

impl EstimatorMetricsInner {
    fn new() -> Self {
        Self {
            predictions: register_int_counter_vec!(
                "platform_power_predictions_total",
                "Platform power predictions completed",
                &["mode"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "platform_power_prediction_errors_total",
                "Platform power predictions that failed",
                &["mode"]
            )
            .expect("Failed to register prediction_errors_total"),

            missing_estimator_queries: register_int_counter!(
                "platform_power_missing_estimator_total",
                "Power queries issued with no estimator constructed"
            )
            .expect("Failed to register missing_estimator_total"),

            prediction_latency_seconds: register_histogram!(
                "platform_power_prediction_latency_seconds",
                "Time spent in one reset-batch-predict round",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            models_enabled: register_int_gauge!(
                "platform_power_models_enabled",
                "Live platform power model handles with a ready estimator"
            )
            .expect("Failed to register models_enabled"),
        }
    }
}

fn mode_label(mode: PredictionMode) -> &'static str {
    match mode {
        PredictionMode::Idle => "idle",
        PredictionMode::Absolute => "absolute",
    }
}

/// Lightweight handle to the global estimator metrics.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct EstimatorMetrics {
    _private: (),
}

impl Default for EstimatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EstimatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EstimatorMetricsInner {
        GLOBAL_METRICS.get_or_init(EstimatorMetricsInner::new)
    }

    pub fn inc_predictions(&self, mode: PredictionMode) {
        self.inner()
            .predictions
            .with_label_values(&[mode_label(mode)])
            .inc();
    }

    pub fn inc_prediction_errors(&self, mode: PredictionMode) {
        self.inner()
            .prediction_errors
            .with_label_values(&[mode_label(mode)])
            .inc();
    }

    pub fn inc_missing_estimator(&self) {
        self.inner().missing_estimator_queries.inc();
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Count one enabled model handle until the returned guard is dropped
    pub fn track_enabled_model(&self) -> EnabledModelGuard {
        self.inner().models_enabled.inc();
        EnabledModelGuard { _private: () }
    }

    pub fn enabled_models(&self) -> i64 {
        self.inner().models_enabled.get()
    }

    pub fn predictions(&self, mode: PredictionMode) -> u64 {
        self.inner()
            .predictions
            .with_label_values(&[mode_label(mode)])
            .get()
    }

    pub fn prediction_errors(&self, mode: PredictionMode) -> u64 {
        self.inner()
            .prediction_errors
            .with_label_values(&[mode_label(mode)])
            .get()
    }
}

/// Holds one slot of the enabled-models gauge
pub struct EnabledModelGuard {
    _private: (),
}

impl Drop for EnabledModelGuard {
    fn drop(&mut self) {
        if let Some(inner) = GLOBAL_METRICS.get() {
            inner.models_enabled.dec();
        }
    }
}

/// Structured logger for estimator events
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log successful model construction
    pub fn log_model_created(&self, model_type: &str, output_type: &str, location: &str) {
        info!(
            event = "platform_model_created",
            node = %self.node_name,
            model_type = %model_type,
            output_type = %output_type,
            location = %location,
            "Using the {}/{} model to estimate node platform power",
            model_type,
            output_type
        );
    }

    /// Log that the model could not be constructed
    pub fn log_model_disabled(&self, model_type: &str, output_type: &str, reason: &str) {
        error!(
            event = "platform_model_disabled",
            node = %self.node_name,
            model_type = %model_type,
            output_type = %output_type,
            reason = %reason,
            "Failed to create {}/{} model to estimate node platform power",
            model_type,
            output_type
        );
    }

    /// Log accumulated energy for a bucket after a round
    pub fn log_energy_applied(&self, bucket: &str, sources: usize, total_joules: u64) {
        info!(
            event = "platform_energy_applied",
            node = %self.node_name,
            bucket = %bucket,
            sources = sources,
            total_joules = total_joules,
            "Platform energy accumulated"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, model_enabled: bool) {
        if model_enabled {
            info!(
                event = "agent_started",
                node = %self.node_name,
                agent_version = %version,
                model_enabled = true,
                "Platform power agent started"
            );
        } else {
            warn!(
                event = "agent_started",
                node = %self.node_name,
                agent_version = %version,
                model_enabled = false,
                "Platform power agent started without an estimator, platform energy will stay at zero"
            );
        }
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Platform power agent shutting down"
        );
    }
}
