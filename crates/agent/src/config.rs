//! Agent configuration

use anyhow::{Context, Result};
use platform_power::config::PowerModelSettings;
use serde::Deserialize;
use std::path::PathBuf;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name from Kubernetes downward API
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// JSON snapshot of node resource usage deltas, rewritten by the collector every interval
    #[serde(default = "default_features_file")]
    pub features_file: PathBuf,

    /// Node feature names the platform model is fed with, in order
    #[serde(default = "default_node_feature_names")]
    pub node_feature_names: Vec<String>,

    /// System metadata feature names (e.g. cpu_architecture)
    #[serde(default)]
    pub system_meta_data_feature_names: Vec<String>,

    /// System metadata values, aligned to the names
    #[serde(default)]
    pub system_meta_data_feature_values: Vec<String>,

    /// Host already exposes a platform power sensor
    #[serde(default)]
    pub system_collection_supported: bool,

    /// Platform power model settings
    #[serde(default)]
    pub model: PowerModelSettings,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_features_file() -> PathBuf {
    PathBuf::from("/var/run/platform-power/node-features.json")
}

fn default_node_feature_names() -> Vec<String> {
    ["cpu_instructions", "cpu_cycles", "cache_miss", "cpu_time"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

const LIST_KEYS: &[&str] = &[
    "node_feature_names",
    "system_meta_data_feature_names",
    "system_meta_data_feature_values",
];

impl AgentConfig {
    /// Load configuration from `AGENT_*` environment variables.
    ///
    /// Model settings are nested, e.g. `AGENT_MODEL__MODEL_TYPE=Onnx`.
    pub fn load() -> Result<Self> {
        let environment = LIST_KEYS.iter().fold(
            config::Environment::with_prefix("AGENT")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .try_parsing(true),
            |env, key| env.with_list_parse_key(key),
        );

        let config = config::Config::builder()
            .add_source(environment)
            .build()
            .context("Failed to read agent configuration")?;

        let agent_config: AgentConfig = config
            .try_deserialize()
            .context("Invalid agent configuration")?;
        agent_config.validate()?;
        Ok(agent_config)
    }

    fn validate(&self) -> Result<()> {
        if self.system_meta_data_feature_names.len() != self.system_meta_data_feature_values.len() {
            anyhow::bail!(
                "{} system metadata names but {} values",
                self.system_meta_data_feature_names.len(),
                self.system_meta_data_feature_values.len()
            );
        }
        if self.model.sample_period_secs == 0 {
            anyhow::bail!("sample period must be at least one second");
        }
        Ok(())
    }
}
