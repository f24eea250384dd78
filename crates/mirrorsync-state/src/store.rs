//! Watermark store trait definition.
//!
//! A watermark is a monotonic timestamp cursor marking the last point in
//! time successfully synchronized for one entity kind. The orchestrator
//! is the store's only writer; implementations lock internally purely for
//! `Send + Sync` soundness.

use chrono::{DateTime, Utc};
use mirrorsync_types::entity::EntityKind;
use mirrorsync_types::run::TickSummary;

use crate::error;

/// Storage contract for per-entity-kind watermarks and tick history.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn WatermarkStore>`.
pub trait WatermarkStore: Send + Sync {
    /// Ensure a cursor exists for every tracked kind, inserting `default`
    /// where none is present. Existing cursors are left untouched, so a
    /// durable store resumes where the previous process stopped.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::StateError) on storage failure.
    fn initialize(&self, kinds: &[EntityKind], default: DateTime<Utc>) -> error::Result<()>;

    /// Read the current cursor for one kind.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Uninitialized`](crate::StateError::Uninitialized)
    /// if `initialize` never saw this kind, or another
    /// [`StateError`](crate::StateError) on storage failure.
    fn get(&self, kind: EntityKind) -> error::Result<DateTime<Utc>>;

    /// Advance the cursor to `max(current, timestamp)` and return the
    /// resulting cursor. The watermark never decreases.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::StateError) on storage failure or an
    /// uninitialized kind.
    fn advance(&self, kind: EntityKind, timestamp: DateTime<Utc>)
        -> error::Result<DateTime<Utc>>;

    /// All current cursors, for operator inspection.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::StateError) on storage failure.
    fn snapshot(&self) -> error::Result<Vec<(EntityKind, DateTime<Utc>)>>;

    /// Append one tick outcome to the run history. Stores without run
    /// history treat this as a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::StateError) on storage failure.
    fn record_tick(&self, summary: &TickSummary) -> error::Result<()>;
}
