//! Platform power agent
//!
//! Runs on each node without a platform power sensor, estimating platform
//! power from collected resource usage and accumulating it as energy.

use anyhow::Result;
use platform_power::{PlatformPowerModel, StructuredLogger};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;
mod sampler;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting platform-power-agent");

    let config = config::AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        model_type = %config.model.model_type,
        sample_period_secs = config.model.sample_period_secs,
        "Agent configured"
    );

    let logger = StructuredLogger::new(&config.node_name);

    let builder = PlatformPowerModel::builder(config.model.clone())
        .system_collection_supported(config.system_collection_supported)
        .logger(logger.clone());
    let model = tokio::select! {
        model = builder.create(
            &config.node_feature_names,
            &config.system_meta_data_feature_names,
            &config.system_meta_data_feature_values,
        ) => model,
        _ = tokio::signal::ctrl_c() => {
            logger.log_shutdown("SIGINT received during model construction");
            return Ok(());
        }
    };
    logger.log_startup(AGENT_VERSION, model.is_enabled());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let sampling = sampler::SamplingLoop::new(
        model,
        config.model.sample_period_secs,
        config.features_file.clone(),
        logger.clone(),
    );
    let sampling_handle = tokio::spawn(sampling.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());
    sampling_handle.await?;

    Ok(())
}
