//! In-memory collaborator backends.
//!
//! Mutex-guarded maps with accessor methods for assertions. Used by the
//! test suites and by `backend: memory` configs.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirrorsync_types::entity::{EntityKind, Record};
use serde_json::Value;

use crate::traits::{AnalyticsStore, EventLog, PrimaryStore, SearchIndex};

/// In-memory primary store. Tests and demos seed it with `push_record`.
#[derive(Debug, Default)]
pub struct MemoryPrimaryStore {
    records: Mutex<BTreeMap<&'static str, Vec<Record>>>,
}

impl MemoryPrimaryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one record to `kind`'s collection.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn push_record(&self, kind: EntityKind, record: Record) {
        self.records
            .lock()
            .expect("primary store lock")
            .entry(kind.as_str())
            .or_default()
            .push(record);
    }
}

#[async_trait]
impl PrimaryStore for MemoryPrimaryStore {
    async fn find_changed_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>> {
        let records = self.records.lock().expect("primary store lock");
        let mut changed: Vec<Record> = records
            .get(kind.as_str())
            .map(|all| {
                all.iter()
                    .filter(|r| r.updated_at > since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        changed.sort_by_key(|r| r.updated_at);
        Ok(changed)
    }
}

/// One appended log message, in append order.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub key: String,
    pub value: Value,
}

/// In-memory ordered event log.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    messages: Mutex<Vec<PublishedMessage>>,
}

impl MemoryEventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All appended messages, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages.lock().expect("event log lock").clone()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, topic: &str, key: &str, value: Value) -> anyhow::Result<()> {
        self.messages
            .lock()
            .expect("event log lock")
            .push(PublishedMessage {
                topic: topic.to_string(),
                key: key.to_string(),
                value,
            });
        Ok(())
    }
}

/// In-memory search index with upsert semantics.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    documents: Mutex<BTreeMap<String, Value>>,
}

impl MemorySearchIndex {
    /// Create an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current documents by document id.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn documents(&self) -> BTreeMap<String, Value> {
        self.documents.lock().expect("search index lock").clone()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn index(&self, doc_id: &str, document: Value) -> anyhow::Result<()> {
        self.documents
            .lock()
            .expect("search index lock")
            .insert(doc_id.to_string(), document);
        Ok(())
    }
}

/// In-memory analytics store. Append-only per table, with uniqueness
/// enforced on each row's `dedup_key` field.
#[derive(Debug, Default)]
pub struct MemoryAnalyticsStore {
    tables: Mutex<BTreeMap<String, Vec<Value>>>,
    seen_keys: Mutex<HashSet<String>>,
}

impl MemoryAnalyticsStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of `table`, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .expect("analytics store lock")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AnalyticsStore for MemoryAnalyticsStore {
    async fn insert_row(&self, table: &str, row: Value) -> anyhow::Result<()> {
        if let Some(key) = row.get("dedup_key").and_then(Value::as_str) {
            let mut seen = self.seen_keys.lock().expect("analytics store lock");
            if !seen.insert(format!("{table}/{key}")) {
                // Redelivered row; keep the first copy.
                return Ok(());
            }
        }
        self.tables
            .lock()
            .expect("analytics store lock")
            .entry(table.to_string())
            .or_default()
            .push(row);
        Ok(())
    }
}
