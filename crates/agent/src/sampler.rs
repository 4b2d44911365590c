//! Sampling loop
//!
//! Every sample period the loop reads the node resource-usage snapshot written
//! by the collector, then folds absolute and idle platform power into the
//! node's energy counters.

use anyhow::{Context, Result};
use platform_power::config::{ABS_ENERGY_IN_PLATFORM, IDLE_ENERGY_IN_PLATFORM};
use platform_power::{
    apply_absolute_energy, apply_idle_energy, DeltaStats, NodeStats, PlatformPowerModel,
    StructuredLogger,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};

pub struct SamplingLoop {
    model: PlatformPowerModel,
    node_stats: NodeStats,
    features_file: PathBuf,
    logger: StructuredLogger,
}

impl SamplingLoop {
    pub fn new(
        model: PlatformPowerModel,
        sample_period_secs: u64,
        features_file: PathBuf,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            model,
            node_stats: NodeStats::new(sample_period_secs),
            features_file,
            logger,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let period = Duration::from_secs(self.node_stats.sample_period_secs);
        info!(
            interval_secs = period.as_secs(),
            features_file = %self.features_file.display(),
            "Starting platform power sampling loop"
        );

        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sample().await {
                        warn!(error = %e, "Skipping sampling round");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sampling loop");
                    break;
                }
            }
        }
    }

    /// One sampling round
    pub async fn sample(&mut self) -> Result<()> {
        let usage = read_snapshot(&self.features_file).await?;
        self.node_stats.replace_resource_usage(usage);

        if !self.model.is_enabled() {
            return Ok(());
        }

        apply_absolute_energy(&mut self.model, &mut self.node_stats);
        apply_idle_energy(&mut self.model, &mut self.node_stats);

        for bucket in [ABS_ENERGY_IN_PLATFORM, IDLE_ENERGY_IN_PLATFORM] {
            if let Some(energy) = self.node_stats.energy_bucket(bucket) {
                self.logger.log_energy_applied(
                    bucket,
                    energy.iter().count(),
                    energy.sum_all_delta_values(),
                );
            }
        }
        Ok(())
    }

    pub fn node_stats(&self) -> &NodeStats {
        &self.node_stats
    }
}

async fn read_snapshot(path: &Path) -> Result<HashMap<String, DeltaStats>> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read feature snapshot {:?}", path))?;
    serde_json::from_slice(&raw).with_context(|| format!("Invalid feature snapshot {:?}", path))
}
