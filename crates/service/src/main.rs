//! Vibration FFT Service - Main Entry Point

use anyhow::Context;
use std::path::PathBuf;
use tracing::info;
use vibration_service::{init_logging, run, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VIBRATION_CONFIG").ok())
        .map(PathBuf::from);

    let config = ServiceConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(config.log_json);

    info!("=== Vibration FFT v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Broker {}:{}, '{}' -> '{}/<axis>', {} Hz x {} s windows",
        config.mqtt_host, config.mqtt_port, config.topic_in, config.topic_out, config.rate, config.span
    );

    let stats = run(config).await.context("vibration pipeline failed at startup")?;
    info!(
        "Processed {} batches ({} rejected), published {} windows",
        stats.batches_accepted, stats.batches_rejected, stats.windows_published
    );

    Ok(())
}
