use std::path::Path;

use anyhow::{Context, Result};
use mirrorsync_engine::build_engine;
use mirrorsync_engine::config::{parse_config, validate_config};

/// Execute the `run` command: parse, validate, and run the sync engine.
pub async fn execute(config_path: &Path, once: bool) -> Result<()> {
    let config = parse_config(config_path)?;
    validate_config(&config)?;

    tracing::info!(
        name = config.name,
        poll_interval_secs = config.poll_interval_secs,
        entities = config.tracked_entities().len(),
        "Config validated"
    );

    let engine = build_engine(&config)?;

    if once {
        let summary = engine.run_once().await?;
        println!("Sync '{}' ran one tick.", config.name);
        println!("  Records processed: {}", summary.records_processed());
        println!("  Events published:  {}", summary.events_published());
        println!("  Sink failures:     {}", summary.sink_failures());
        println!("  Query failures:    {}", summary.query_failures());
        println!("  Duration:          {:.2}s", summary.duration_secs);
        return Ok(());
    }

    engine.start().await?;
    tracing::info!(name = config.name, "Running until interrupted (ctrl-c)");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    tracing::info!("Shutdown signal received, draining");
    engine.stop().await;
    println!("Sync '{}' stopped.", config.name);
    Ok(())
}
