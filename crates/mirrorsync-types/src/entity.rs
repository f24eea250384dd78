//! Tracked entity kinds and primary-store record snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of domain entities tracked by the sync engine.
///
/// Each kind maps to one primary-store collection with a primary key and
/// an `updated_at` timestamp. The set is closed on purpose: adding a kind
/// means adding its sink projections too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Creator,
    Content,
    Asset,
    Transaction,
    RoyaltyPayment,
}

impl EntityKind {
    /// All tracked kinds, in the order the orchestrator visits them.
    pub const ALL: [EntityKind; 6] = [
        Self::User,
        Self::Creator,
        Self::Content,
        Self::Asset,
        Self::Transaction,
        Self::RoyaltyPayment,
    ];

    /// Wire-format string, matching the serde representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Creator => "creator",
            Self::Content => "content",
            Self::Asset => "asset",
            Self::Transaction => "transaction",
            Self::RoyaltyPayment => "royalty_payment",
        }
    }

    /// Analytics table receiving append-only rows for this kind.
    #[must_use]
    pub fn analytics_table(self) -> &'static str {
        match self {
            Self::User => "user_changes",
            Self::Creator => "creator_changes",
            Self::Content => "content_changes",
            Self::Asset => "asset_changes",
            Self::Transaction => "transaction_changes",
            Self::RoyaltyPayment => "royalty_payment_changes",
        }
    }

    /// Parse a wire-format string back into a kind.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque primary-store entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new entity identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for EntityId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// One changed record as returned by the primary store.
///
/// `payload` carries the full current state of the entity as a JSON
/// object. The engine never mutates it; sinks derive their own
/// projections from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Primary key within the entity's collection.
    pub id: EntityId,
    /// Last modification time, the incremental-sync cursor field.
    pub updated_at: DateTime<Utc>,
    /// Full entity snapshot.
    pub payload: serde_json::Value,
}
