use std::path::Path;

use anyhow::Result;
use mirrorsync_engine::build_engine;
use mirrorsync_engine::config::{parse_config, validate_config};

/// Execute the `check` command: validate the config, then verify every
/// collaborator connection can be acquired.
pub async fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)?;
    validate_config(&config)?;
    println!("Config OK: '{}'", config.name);

    let engine = build_engine(&config)?;
    engine.check().await?;
    println!("Connectivity OK: primary, event log, and all sinks reachable.");
    Ok(())
}
