//! Collaborator contracts: the primary store, the event log, and the
//! derivative-store backends the sink adapters write to.
//!
//! All four are long-lived, externally supplied connections: the engine
//! acquires them once at `start()` and releases them once at `stop()`.
//! `connect` and `close` default to no-ops for backends without a real
//! connection handshake.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirrorsync_types::entity::{EntityKind, Record};

/// Read-only view of the primary transactional store.
///
/// The engine never writes here.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Acquire the store connection.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the store connection.
    async fn close(&self) {}

    /// Records of `kind` with `updated_at` strictly greater than `since`,
    /// in ascending `updated_at` order.
    async fn find_changed_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>>;
}

/// Ordered, partitioned event log for asynchronous downstream consumers.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Acquire the log connection.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the log connection.
    async fn close(&self) {}

    /// Append one value under `key` to `topic`, resolving once the log
    /// has acknowledged delivery.
    async fn append(&self, topic: &str, key: &str, value: serde_json::Value)
        -> anyhow::Result<()>;
}

/// Search backend with idempotent upsert semantics: indexing the same
/// document id repeatedly converges to one final document.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Acquire the index connection.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the index connection.
    async fn close(&self) {}

    /// Upsert `document` under `doc_id`.
    async fn index(&self, doc_id: &str, document: serde_json::Value) -> anyhow::Result<()>;
}

/// Analytics backend with append-only insert semantics. Implementations
/// enforce uniqueness on the row's `dedup_key` field so redelivered rows
/// are ignored rather than duplicated.
#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Acquire the store connection.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the store connection.
    async fn close(&self) {}

    /// Append `row` to `table`.
    async fn insert_row(&self, table: &str, row: serde_json::Value) -> anyhow::Result<()>;
}
