use std::path::Path;

use anyhow::Result;
use mirrorsync_engine::build_engine;
use mirrorsync_engine::config::{parse_config, validate_config};

/// Execute the `status` command: print the stored watermark cursor for
/// each tracked entity kind.
///
/// Memory-backed watermarks only exist inside a running engine process,
/// so this is mainly useful with the sqlite backend.
pub fn execute(config_path: &Path) -> Result<()> {
    let config = parse_config(config_path)?;
    validate_config(&config)?;

    let engine = build_engine(&config)?;
    let cursors = engine.watermark_snapshot()?;
    if cursors.is_empty() {
        println!("No watermarks recorded yet for '{}'.", config.name);
        return Ok(());
    }

    println!("Watermarks for '{}':", config.name);
    for (kind, cursor) in cursors {
        println!("  {kind:<16} {cursor}");
    }
    Ok(())
}
