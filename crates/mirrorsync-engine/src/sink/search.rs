//! Search sink: idempotent upserts of per-kind search documents.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::SecondsFormat;
use mirrorsync_types::entity::EntityKind;
use mirrorsync_types::event::ChangeEvent;
use serde_json::{json, Map, Value};

use crate::sink::SinkAdapter;
use crate::traits::SearchIndex;

/// Snapshot fields copied into the search document for each kind.
///
/// Everything else in the snapshot is deliberately dropped: the search
/// index holds what users query for, not the full entity.
fn searchable_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::User => &["username", "display_name", "email", "bio"],
        EntityKind::Creator => &["display_name", "handle", "bio", "genres"],
        EntityKind::Content => &["title", "description", "tags", "creator_id"],
        EntityKind::Asset => &["name", "asset_type", "content_id", "license"],
        EntityKind::Transaction => &["status", "buyer_id", "asset_id"],
        EntityKind::RoyaltyPayment => &["status", "creator_id", "period"],
    }
}

/// Document id keyed by the record's primary key, so repeated delivery
/// of the same record converges to one final document.
fn document_id(event: &ChangeEvent) -> String {
    format!("{}:{}", event.entity_kind, event.entity_id)
}

/// Build the search document for one event.
fn project(event: &ChangeEvent) -> Value {
    let mut doc = Map::new();
    doc.insert("entity_id".into(), json!(event.entity_id.as_str()));
    doc.insert("entity_kind".into(), json!(event.entity_kind.as_str()));
    doc.insert(
        "updated_at".into(),
        json!(event.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
    );
    if let Some(snapshot) = event.after.as_object() {
        for field in searchable_fields(event.entity_kind) {
            if let Some(value) = snapshot.get(*field) {
                doc.insert((*field).to_string(), value.clone());
            }
        }
    }
    Value::Object(doc)
}

/// Writes per-kind search documents to a [`SearchIndex`] backend.
pub struct SearchSinkAdapter {
    backend: Arc<dyn SearchIndex>,
}

impl SearchSinkAdapter {
    /// Create the adapter over `backend`.
    pub fn new(backend: Arc<dyn SearchIndex>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SinkAdapter for SearchSinkAdapter {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn connect(&self) -> anyhow::Result<()> {
        self.backend.connect().await
    }

    async fn close(&self) {
        self.backend.close().await;
    }

    async fn write(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        self.backend
            .index(&document_id(event), project(event))
            .await
    }
}
