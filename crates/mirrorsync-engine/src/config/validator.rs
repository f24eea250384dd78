//! Semantic validation for parsed sync configuration values.

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::config::types::{BackendKind, StoreConfig, SyncConfig};

fn validate_store(store: &StoreConfig, slot: &str, errors: &mut Vec<String>) {
    if store.backend == BackendKind::Sqlite && store.path.is_none() {
        errors.push(format!("{slot}: sqlite backend requires a path"));
    }
}

/// Validate a parsed sync configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the config.
pub fn validate_config(config: &SyncConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported config version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.name.trim().is_empty() {
        errors.push("Sync name must not be empty".to_string());
    }

    if config.poll_interval_secs == 0 {
        errors.push("poll_interval_secs must be at least 1".to_string());
    }

    let mut seen = HashSet::new();
    for kind in &config.entities {
        if !seen.insert(*kind) {
            errors.push(format!("Entity '{kind}' listed more than once"));
        }
    }

    validate_store(&config.primary, "primary", &mut errors);
    validate_store(&config.watermarks, "watermarks", &mut errors);
    validate_store(&config.search, "search", &mut errors);
    validate_store(&config.analytics, "analytics", &mut errors);
    if config.log.backend == BackendKind::Sqlite && config.log.path.is_none() {
        errors.push("log: sqlite backend requires a path".to_string());
    }
    if config.log.topic.trim().is_empty() {
        errors.push("log: topic must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Config validation failed:\n  - {}", errors.join("\n  - "));
    }
}
