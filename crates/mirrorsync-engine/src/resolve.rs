//! Build a [`SyncEngine`] from a validated configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mirrorsync_state::{MemoryWatermarkStore, SqliteWatermarkStore, WatermarkStore};

use crate::backends::memory::{
    MemoryAnalyticsStore, MemoryEventLog, MemoryPrimaryStore, MemorySearchIndex,
};
use crate::backends::sqlite::{
    SqliteAnalyticsStore, SqliteEventLog, SqlitePrimaryStore, SqliteSearchIndex,
};
use crate::config::types::{BackendKind, StoreConfig, SyncConfig};
use crate::config::validator::validate_config;
use crate::orchestrator::{EngineOptions, EngineParts, SyncEngine};
use crate::sink::analytics::AnalyticsSinkAdapter;
use crate::sink::search::SearchSinkAdapter;
use crate::sink::SinkAdapter;
use crate::traits::{AnalyticsStore, EventLog, PrimaryStore, SearchIndex};

fn sqlite_path<'a>(store: &'a StoreConfig, slot: &str) -> Result<&'a std::path::Path> {
    store
        .path
        .as_deref()
        .with_context(|| format!("{slot}: sqlite backend requires a path"))
}

fn build_watermarks(config: &SyncConfig) -> Result<Arc<dyn WatermarkStore>> {
    Ok(match config.watermarks.backend {
        BackendKind::Memory => Arc::new(MemoryWatermarkStore::new()),
        BackendKind::Sqlite => Arc::new(SqliteWatermarkStore::open(sqlite_path(
            &config.watermarks,
            "watermarks",
        )?)?),
    })
}

fn build_primary(config: &SyncConfig) -> Result<Arc<dyn PrimaryStore>> {
    Ok(match config.primary.backend {
        BackendKind::Memory => Arc::new(MemoryPrimaryStore::new()),
        BackendKind::Sqlite => Arc::new(SqlitePrimaryStore::open(sqlite_path(
            &config.primary,
            "primary",
        )?)?),
    })
}

fn build_event_log(config: &SyncConfig) -> Result<Arc<dyn EventLog>> {
    Ok(match config.log.backend {
        BackendKind::Memory => Arc::new(MemoryEventLog::new()),
        BackendKind::Sqlite => {
            let path = config
                .log
                .path
                .as_deref()
                .context("log: sqlite backend requires a path")?;
            Arc::new(SqliteEventLog::open(path)?)
        }
    })
}

fn build_search(config: &SyncConfig) -> Result<Arc<dyn SearchIndex>> {
    Ok(match config.search.backend {
        BackendKind::Memory => Arc::new(MemorySearchIndex::new()),
        BackendKind::Sqlite => Arc::new(SqliteSearchIndex::open(sqlite_path(
            &config.search,
            "search",
        )?)?),
    })
}

fn build_analytics(config: &SyncConfig) -> Result<Arc<dyn AnalyticsStore>> {
    Ok(match config.analytics.backend {
        BackendKind::Memory => Arc::new(MemoryAnalyticsStore::new()),
        BackendKind::Sqlite => Arc::new(SqliteAnalyticsStore::open(sqlite_path(
            &config.analytics,
            "analytics",
        )?)?),
    })
}

/// Validate `config` and assemble the engine it describes.
///
/// # Errors
///
/// Returns an error if validation fails or a sqlite backend can't be
/// opened.
pub fn build_engine(config: &SyncConfig) -> Result<Arc<SyncEngine>> {
    validate_config(config)?;

    let sinks: Vec<Arc<dyn SinkAdapter>> = vec![
        Arc::new(SearchSinkAdapter::new(build_search(config)?)),
        Arc::new(AnalyticsSinkAdapter::new(build_analytics(config)?)),
    ];
    let parts = EngineParts {
        primary: build_primary(config)?,
        event_log: build_event_log(config)?,
        sinks,
        watermarks: build_watermarks(config)?,
    };
    let options = EngineOptions {
        poll_interval: Duration::from_secs(config.poll_interval_secs),
        entities: config.tracked_entities(),
        topic: config.log.topic.clone(),
    };
    Ok(SyncEngine::new(parts, options))
}
