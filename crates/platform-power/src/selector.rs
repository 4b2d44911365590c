//! Node platform power model selection and construction
//!
//! A `PlatformPowerModel` owns at most one estimator for its whole lifetime.
//! Construction failures never propagate: the handle is simply left disabled
//! and every later query contributes zero energy.

use crate::config::{
    default_power_model_location, ModelConfig, PowerModelSettings, PLATFORM_ENERGY_SOURCE,
};
use crate::error::Result;
use crate::estimator::{create_estimator, load_artifact, PowerEstimator};
use crate::observability::{EnabledModelGuard, EstimatorMetrics, StructuredLogger};
use tracing::{debug, info};

/// Lifecycle of the platform estimator. `Disabled` and `Enabled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelState {
    Uninitialized,
    Disabled,
    Enabled,
}

/// Assemble the node platform model config.
///
/// Without an explicit artifact URL, the default location for
/// (output type, "platform") becomes the artifact filepath.
pub fn create_platform_model_config(
    settings: &PowerModelSettings,
    node_feature_names: &[String],
    system_meta_data_feature_names: &[String],
    system_meta_data_feature_values: &[String],
) -> ModelConfig {
    let mut config = ModelConfig::from_settings(settings, PLATFORM_ENERGY_SOURCE);
    if config.init_model_url.is_none() {
        config.init_model_filepath = Some(default_power_model_location(
            &settings.model_db,
            &settings.model_name,
            config.model_type,
            config.model_output_type,
            PLATFORM_ENERGY_SOURCE,
        ));
    }
    config.node_feature_names = node_feature_names.to_vec();
    config.system_meta_data_feature_names = system_meta_data_feature_names.to_vec();
    config.system_meta_data_feature_values = system_meta_data_feature_values.to_vec();
    config.is_node_power_model = true;
    config
}

/// Owned handle to the node platform power estimator
///
/// While an enabled handle is alive it counts towards the
/// `platform_power_models_enabled` gauge.
pub struct PlatformPowerModel {
    config: Option<ModelConfig>,
    estimator: Option<Box<dyn PowerEstimator>>,
    metrics: EstimatorMetrics,
    _enabled: Option<EnabledModelGuard>,
}

impl PlatformPowerModel {
    /// Handle on which construction was never attempted
    pub fn uninitialized() -> Self {
        Self {
            config: None,
            estimator: None,
            metrics: EstimatorMetrics::new(),
            _enabled: None,
        }
    }

    /// Wrap an already built backend
    pub fn with_estimator(config: ModelConfig, estimator: Box<dyn PowerEstimator>) -> Self {
        let metrics = EstimatorMetrics::new();
        let enabled = estimator.is_ready().then(|| metrics.track_enabled_model());
        Self {
            config: Some(config),
            estimator: Some(estimator),
            metrics,
            _enabled: enabled,
        }
    }

    pub fn builder(settings: PowerModelSettings) -> PlatformPowerModelBuilder {
        PlatformPowerModelBuilder::new(settings)
    }

    /// True iff an estimator exists and reports ready
    pub fn is_enabled(&self) -> bool {
        self.estimator.as_ref().map_or(false, |e| e.is_ready())
    }

    pub fn state(&self) -> ModelState {
        match (&self.config, self.is_enabled()) {
            (None, _) => ModelState::Uninitialized,
            (Some(_), true) => ModelState::Enabled,
            (Some(_), false) => ModelState::Disabled,
        }
    }

    pub fn config(&self) -> Option<&ModelConfig> {
        self.config.as_ref()
    }

    pub(crate) fn estimator_mut(&mut self) -> Option<&mut (dyn PowerEstimator + 'static)> {
        self.estimator.as_deref_mut()
    }

    pub(crate) fn metrics(&self) -> &EstimatorMetrics {
        &self.metrics
    }
}

/// Builder for the node platform power model
pub struct PlatformPowerModelBuilder {
    settings: PowerModelSettings,
    system_collection_supported: bool,
    logger: StructuredLogger,
}

impl PlatformPowerModelBuilder {
    pub fn new(settings: PowerModelSettings) -> Self {
        Self {
            settings,
            system_collection_supported: false,
            logger: StructuredLogger::new("unknown"),
        }
    }

    /// Whether the host already reads platform power from a sensor
    pub fn system_collection_supported(mut self, supported: bool) -> Self {
        self.system_collection_supported = supported;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the config and attempt to construct the estimator
    pub async fn create(
        self,
        node_feature_names: &[String],
        system_meta_data_feature_names: &[String],
        system_meta_data_feature_values: &[String],
    ) -> PlatformPowerModel {
        if self.system_collection_supported {
            // Advisory only: the estimator is still built.
            info!("Skipping creation of node platform power model since the system collection is supported");
        }

        let config = create_platform_model_config(
            &self.settings,
            node_feature_names,
            system_meta_data_feature_names,
            system_meta_data_feature_values,
        );
        let model_type = config.model_type.to_string();
        let output_type = config.model_output_type.to_string();

        match build_estimator(&config).await {
            Ok(estimator) => {
                self.logger.log_model_created(
                    &model_type,
                    &output_type,
                    config.artifact_location().unwrap_or_default(),
                );
                PlatformPowerModel::with_estimator(config, estimator)
            }
            Err(e) => {
                self.logger
                    .log_model_disabled(&model_type, &output_type, &e.to_string());
                PlatformPowerModel {
                    config: Some(config),
                    estimator: None,
                    metrics: EstimatorMetrics::new(),
                    _enabled: None,
                }
            }
        }
    }
}

async fn build_estimator(config: &ModelConfig) -> Result<Box<dyn PowerEstimator>> {
    let location = config.artifact_location().unwrap_or_default();
    debug!(location = %location, model_type = %config.model_type, "Loading platform power model");
    let artifact = load_artifact(
        location,
        config.init_model_checksum.as_deref(),
        config.fetch_timeout,
    )
    .await?;
    create_estimator(config, &artifact)
}
