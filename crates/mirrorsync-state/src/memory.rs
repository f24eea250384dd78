//! In-memory implementation of [`WatermarkStore`].
//!
//! Process-lifetime state only: cursors start at engine-start time and
//! are lost on restart, so changes made while the process was down are
//! not replayed. Use [`SqliteWatermarkStore`](crate::SqliteWatermarkStore)
//! when cursors must survive restarts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mirrorsync_types::entity::EntityKind;
use mirrorsync_types::run::TickSummary;

use crate::error::{self, StateError};
use crate::store::WatermarkStore;

/// In-memory watermark store. The engine's default, and what tests use.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    cursors: Mutex<HashMap<EntityKind, DateTime<Utc>>>,
}

impl MemoryWatermarkStore {
    /// Create an empty store; `initialize` seeds the cursors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, HashMap<EntityKind, DateTime<Utc>>>> {
        self.cursors.lock().map_err(|_| StateError::LockPoisoned)
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn initialize(&self, kinds: &[EntityKind], default: DateTime<Utc>) -> error::Result<()> {
        let mut cursors = self.lock()?;
        for kind in kinds {
            cursors.entry(*kind).or_insert(default);
        }
        Ok(())
    }

    fn get(&self, kind: EntityKind) -> error::Result<DateTime<Utc>> {
        self.lock()?
            .get(&kind)
            .copied()
            .ok_or(StateError::Uninitialized(kind))
    }

    fn advance(
        &self,
        kind: EntityKind,
        timestamp: DateTime<Utc>,
    ) -> error::Result<DateTime<Utc>> {
        let mut cursors = self.lock()?;
        let cursor = cursors
            .get_mut(&kind)
            .ok_or(StateError::Uninitialized(kind))?;
        if timestamp > *cursor {
            *cursor = timestamp;
        }
        Ok(*cursor)
    }

    fn snapshot(&self) -> error::Result<Vec<(EntityKind, DateTime<Utc>)>> {
        let cursors = self.lock()?;
        let mut all: Vec<_> = cursors.iter().map(|(k, ts)| (*k, *ts)).collect();
        all.sort_by_key(|(k, _)| k.as_str());
        Ok(all)
    }

    fn record_tick(&self, _summary: &TickSummary) -> error::Result<()> {
        // No run history in memory; tick summaries only go to the log.
        Ok(())
    }
}
