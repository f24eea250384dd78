//! Canonical change events emitted for downstream consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityId, EntityKind};

/// Kind of change a [`ChangeEvent`] represents.
///
/// Timestamp polling cannot distinguish a freshly created record from an
/// updated one without extra bookkeeping, so every detected change is
/// tagged `Upsert`. Hard deletes are not observable at all (no
/// `updated_at` left to poll), hence no delete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Upsert,
}

/// Correlation identifier tying one detected change to its log entry and
/// sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a fresh random correlation id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Canonical representation of one detected change.
///
/// Events are transient: produced per record, published, fanned out, and
/// discarded. They always embed the full after-snapshot; no before/after
/// field deltas are available to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Always upsert-style; see [`ChangeOperation`].
    pub operation: ChangeOperation,
    /// Entity kind the change belongs to.
    pub entity_kind: EntityKind,
    /// Primary key of the changed entity.
    pub entity_id: EntityId,
    /// Full entity state after the change.
    pub after: serde_json::Value,
    /// The record's `updated_at` at detection time.
    pub occurred_at: DateTime<Utc>,
    /// Correlates the log entry with the sink writes for this change.
    pub correlation_id: CorrelationId,
}

impl ChangeEvent {
    /// Partition key for the event log: entity kind plus microsecond
    /// timestamp, so one kind's events stay ordered within a partition.
    #[must_use]
    pub fn partition_key(&self) -> String {
        format!(
            "{}:{}",
            self.entity_kind,
            self.occurred_at.timestamp_micros()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> ChangeEvent {
        ChangeEvent {
            operation: ChangeOperation::Upsert,
            entity_kind: EntityKind::Content,
            entity_id: EntityId::new("c-42"),
            after: serde_json::json!({"title": "Demo", "creator_id": "cr-9"}),
            occurred_at: "2026-02-01T12:00:00.000250Z".parse().unwrap(),
            correlation_id: CorrelationId::generate(),
        }
    }

    #[test]
    fn operation_serializes_snake_case() {
        let json = serde_json::to_string(&ChangeOperation::Upsert).unwrap();
        assert_eq!(json, "\"upsert\"");
    }

    #[test]
    fn partition_key_combines_kind_and_micros() {
        let event = sample_event();
        assert_eq!(
            event.partition_key(),
            format!("content:{}", event.occurred_at.timestamp_micros())
        );
    }

    #[test]
    fn correlation_ids_are_unique() {
        assert_ne!(CorrelationId::generate(), CorrelationId::generate());
    }

    #[test]
    fn change_event_serde_roundtrip() {
        let event = sample_event();
        let json = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }

    #[test]
    fn change_event_json_keeps_full_snapshot() {
        let event = sample_event();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["after"]["title"], "Demo");
        assert_eq!(json["operation"], "upsert");
    }
}
