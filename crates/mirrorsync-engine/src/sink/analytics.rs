//! Analytics sink: append-only rows with a natural dedup key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use mirrorsync_types::event::ChangeEvent;
use serde_json::{json, Value};

use crate::sink::SinkAdapter;
use crate::traits::AnalyticsStore;

/// Natural dedup key for an analytics row: entity id plus the record's
/// `updated_at` in microseconds. Delivery is at-least-once (a crash
/// between sink write and watermark advance redelivers the record), so
/// backends enforce uniqueness on this key instead of accumulating
/// duplicate rows.
fn dedup_key(event: &ChangeEvent) -> String {
    format!(
        "{}:{}",
        event.entity_id,
        event.occurred_at.timestamp_micros()
    )
}

/// Build the analytics row for one event.
fn project(event: &ChangeEvent) -> Value {
    json!({
        "dedup_key": dedup_key(event),
        "entity_id": event.entity_id.as_str(),
        "entity_kind": event.entity_kind.as_str(),
        "occurred_at": event.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        "recorded_at": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        "correlation_id": event.correlation_id.to_string(),
        "snapshot": event.after,
    })
}

/// Writes one change row per event into the kind's analytics table.
pub struct AnalyticsSinkAdapter {
    backend: Arc<dyn AnalyticsStore>,
}

impl AnalyticsSinkAdapter {
    /// Create the adapter over `backend`.
    pub fn new(backend: Arc<dyn AnalyticsStore>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SinkAdapter for AnalyticsSinkAdapter {
    fn name(&self) -> &'static str {
        "analytics"
    }

    async fn connect(&self) -> anyhow::Result<()> {
        self.backend.connect().await
    }

    async fn close(&self) {
        self.backend.close().await;
    }

    async fn write(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.backend
            .insert_row(event.entity_kind.analytics_table(), project(event))
            .await
    }
}
