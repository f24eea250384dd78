//! Raw record to canonical change event conversion.

use mirrorsync_types::entity::{EntityKind, Record};
use mirrorsync_types::event::{ChangeEvent, ChangeOperation, CorrelationId};

/// Convert a raw changed record into a canonical change event.
///
/// Stateless and pure apart from the fresh correlation id. The event
/// always embeds the full after-snapshot; no diff against a prior
/// snapshot is computed, so consumers never see field-level deltas. The
/// operation is always tagged upsert because the poller cannot tell a
/// create from an update.
#[must_use]
pub fn normalize(kind: EntityKind, record: &Record) -> ChangeEvent {
    ChangeEvent {
        operation: ChangeOperation::Upsert,
        entity_kind: kind,
        entity_id: record.id.clone(),
        after: record.payload.clone(),
        occurred_at: record.updated_at,
        correlation_id: CorrelationId::generate(),
    }
}
