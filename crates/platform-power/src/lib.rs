//! Node platform power estimation
//!
//! This crate provides:
//! - Pluggable power estimators (linear regression, ONNX via tract)
//! - Construction of the node platform model from configuration
//! - Per-interval feature batching and prediction
//! - Integration of predicted power into idle and absolute energy counters

pub mod config;
pub mod energy;
pub mod error;
pub mod estimator;
pub mod models;
pub mod observability;
pub mod selector;

pub use energy::{apply_absolute_energy, apply_idle_energy, get_platform_power, source_id};
pub use error::PowerModelError;
pub use estimator::PowerEstimator;
pub use models::*;
pub use observability::{EnabledModelGuard, EstimatorMetrics, StructuredLogger};
pub use selector::{ModelState, PlatformPowerModel, PlatformPowerModelBuilder};
