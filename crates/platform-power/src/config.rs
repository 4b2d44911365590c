//! Power model configuration
//!
//! `PowerModelSettings` carries the process-wide knobs (normally read from the
//! environment by the agent) and `ModelConfig` is the per-model description
//! assembled from them once at startup.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Energy source name used to key platform model artifacts
pub const PLATFORM_ENERGY_SOURCE: &str = "platform";

/// Delta-stat bucket receiving absolute platform energy
pub const ABS_ENERGY_IN_PLATFORM: &str = "platform_abs_energy";

/// Delta-stat bucket receiving idle platform energy
pub const IDLE_ENERGY_IN_PLATFORM: &str = "platform_idle_energy";

/// Prediction backend selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    /// Linear model with per-feature weights loaded from a JSON artifact
    LinearRegressor,
    /// ONNX graph evaluated with tract
    Onnx,
}

impl ModelType {
    /// File extension of the artifact expected by this backend
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            ModelType::LinearRegressor => "json",
            ModelType::Onnx => "onnx",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::LinearRegressor => write!(f, "LinearRegressor"),
            ModelType::Onnx => write!(f, "Onnx"),
        }
    }
}

/// Kind of power the model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelOutputType {
    /// Total power including the idle baseline
    AbsPower,
    /// Power above the idle baseline
    DynPower,
}

impl fmt::Display for ModelOutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelOutputType::AbsPower => write!(f, "AbsPower"),
            ModelOutputType::DynPower => write!(f, "DynPower"),
        }
    }
}

/// Process-wide power model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerModelSettings {
    /// Backend used for the node platform model
    #[serde(default = "default_model_type")]
    pub model_type: ModelType,

    /// Output type of the node platform model
    #[serde(default = "default_output_type")]
    pub output_type: ModelOutputType,

    /// Explicit artifact URL; when unset the default location is used
    #[serde(default)]
    pub init_model_url: Option<String>,

    /// Optional hex SHA-256 the artifact must match
    #[serde(default)]
    pub init_model_checksum: Option<String>,

    /// Base URL or directory of the model database
    #[serde(default = "default_model_db")]
    pub model_db: String,

    /// Artifact name inside the model database
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Sampling period in seconds
    #[serde(default = "default_sample_period")]
    pub sample_period_secs: u64,

    /// Connect and download timeout for remote artifacts, in seconds
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

fn default_model_type() -> ModelType {
    ModelType::LinearRegressor
}

fn default_output_type() -> ModelOutputType {
    ModelOutputType::AbsPower
}

fn default_model_db() -> String {
    "/var/lib/platform-power/models".to_string()
}

fn default_model_name() -> String {
    "default".to_string()
}

fn default_sample_period() -> u64 {
    3
}

fn default_fetch_timeout() -> u64 {
    30
}

impl Default for PowerModelSettings {
    fn default() -> Self {
        Self {
            model_type: default_model_type(),
            output_type: default_output_type(),
            init_model_url: None,
            init_model_checksum: None,
            model_db: default_model_db(),
            model_name: default_model_name(),
            sample_period_secs: default_sample_period(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

/// Resolve the default artifact location for an (output type, energy source) pair.
///
/// The result is a URL when `model_db` is one, otherwise a filesystem path.
pub fn default_power_model_location(
    model_db: &str,
    model_name: &str,
    model_type: ModelType,
    output_type: ModelOutputType,
    energy_source: &str,
) -> String {
    format!(
        "{}/{}/{}/{}.{}",
        model_db.trim_end_matches('/'),
        energy_source,
        output_type,
        model_name,
        model_type.artifact_extension()
    )
}

/// Static description of a single power model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_type: ModelType,
    pub model_output_type: ModelOutputType,
    pub energy_source: String,
    pub node_feature_names: Vec<String>,
    pub system_meta_data_feature_names: Vec<String>,
    pub system_meta_data_feature_values: Vec<String>,
    pub init_model_url: Option<String>,
    pub init_model_filepath: Option<String>,
    pub init_model_checksum: Option<String>,
    pub fetch_timeout: Duration,
    pub is_node_power_model: bool,
}

impl ModelConfig {
    /// Build a config for `energy_source` from the process settings
    pub fn from_settings(settings: &PowerModelSettings, energy_source: &str) -> Self {
        Self {
            model_type: settings.model_type,
            model_output_type: settings.output_type,
            energy_source: energy_source.to_string(),
            node_feature_names: Vec::new(),
            system_meta_data_feature_names: Vec::new(),
            system_meta_data_feature_values: Vec::new(),
            init_model_url: settings.init_model_url.clone().filter(|u| !u.is_empty()),
            init_model_filepath: None,
            init_model_checksum: settings.init_model_checksum.clone(),
            fetch_timeout: Duration::from_secs(settings.fetch_timeout_secs.max(1)),
            is_node_power_model: false,
        }
    }

    /// Where the artifact will be loaded from
    pub fn artifact_location(&self) -> Option<&str> {
        self.init_model_url
            .as_deref()
            .or(self.init_model_filepath.as_deref())
    }

    /// System metadata as (name, value) pairs
    pub fn system_meta_data(&self) -> impl Iterator<Item = (&str, &str)> {
        self.system_meta_data_feature_names
            .iter()
            .zip(self.system_meta_data_feature_values.iter())
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }
}
