//! Typed representation of the sync YAML file.

use std::path::PathBuf;

use mirrorsync_types::entity::EntityKind;
use serde::{Deserialize, Serialize};

use crate::publish::DEFAULT_TOPIC;

/// Top-level sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub version: String,
    /// Human-readable name for this sync deployment, used in logs.
    pub name: String,
    /// Seconds between poll ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Entity kinds to track. Empty means all kinds.
    #[serde(default)]
    pub entities: Vec<EntityKind>,
    pub primary: StoreConfig,
    #[serde(default)]
    pub watermarks: StoreConfig,
    #[serde(default)]
    pub search: StoreConfig,
    #[serde(default)]
    pub analytics: StoreConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_poll_interval_secs() -> u64 {
    5
}

/// Which backend implementation a store slot uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

/// One collaborator store slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Database file, required for the sqlite backend.
    pub path: Option<PathBuf>,
}

fn default_backend() -> BackendKind {
    BackendKind::Memory
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// Event log slot: a store plus the topic events are published to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    pub path: Option<PathBuf>,
    #[serde(default = "default_topic")]
    pub topic: String,
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            topic: default_topic(),
        }
    }
}

impl SyncConfig {
    /// Kinds this deployment tracks, in orchestrator visit order.
    #[must_use]
    pub fn tracked_entities(&self) -> Vec<EntityKind> {
        if self.entities.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            self.entities.clone()
        }
    }
}
