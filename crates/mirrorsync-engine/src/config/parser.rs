//! Sync YAML parsing with environment variable expansion.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::config::types::SyncConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Expand `${VAR_NAME}` references against the process environment.
///
/// Missing variables are collected across the whole input so one error
/// names every placeholder that needs fixing, each listed once.
///
/// # Errors
///
/// Returns an error if any referenced environment variable is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = BTreeSet::new();
    let substituted = ENV_VAR_RE.replace_all(input, |caps: &Captures<'_>| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| {
            missing.insert(name.to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(substituted.into_owned())
    } else {
        let names: Vec<String> = missing.into_iter().collect();
        anyhow::bail!(
            "config references unset environment variable(s): {}",
            names.join(", ")
        )
    }
}

/// Parse a sync YAML string, expanding environment references first.
///
/// # Errors
///
/// Returns an error on unset environment variables or invalid YAML.
pub fn parse_config_str(yaml_str: &str) -> Result<SyncConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&substituted).context("invalid sync YAML")
}

/// Parse a sync YAML file. Errors carry the file path so a bad config
/// among several is identifiable from the message alone.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn parse_config(path: &Path) -> Result<SyncConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading sync config {}", path.display()))?;
    parse_config_str(&content).with_context(|| format!("in sync config {}", path.display()))
}
