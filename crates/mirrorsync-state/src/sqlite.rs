//! `SQLite`-backed implementation of [`WatermarkStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety. Cursors are
//! stored as microsecond epoch integers so comparisons in SQL are exact.
//! Unlike the in-memory store, cursors survive restarts: `initialize`
//! only inserts missing rows.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use mirrorsync_types::entity::EntityKind;
use mirrorsync_types::run::TickSummary;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{self, StateError};
use crate::store::WatermarkStore;

/// Clamp a `u64` counter into `SQLite`'s signed integer range.
fn to_sql_count(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Idempotent DDL for watermark and run-history tables.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS watermarks (
    entity_kind TEXT PRIMARY KEY,
    cursor_micros INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS tick_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    duration_secs REAL NOT NULL,
    records_processed INTEGER NOT NULL,
    events_published INTEGER NOT NULL,
    sink_failures INTEGER NOT NULL,
    query_failures INTEGER NOT NULL,
    cancelled INTEGER NOT NULL,
    summary_json TEXT NOT NULL
);
";

/// `SQLite`-backed watermark storage.
///
/// Create with [`SqliteWatermarkStore::open`] for file-backed persistence
/// or [`SqliteWatermarkStore::in_memory`] for tests.
pub struct SqliteWatermarkStore {
    conn: Mutex<Connection>,
}

impl SqliteWatermarkStore {
    /// Open or create a watermark database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the parent directory can't be
    /// created, or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't be
    /// initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn micros_to_datetime(micros: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(micros).unwrap_or_default()
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn initialize(&self, kinds: &[EntityKind], default: DateTime<Utc>) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "INSERT INTO watermarks (entity_kind, cursor_micros) VALUES (?1, ?2)
             ON CONFLICT (entity_kind) DO NOTHING",
        )?;
        for kind in kinds {
            stmt.execute(params![kind.as_str(), default.timestamp_micros()])?;
        }
        Ok(())
    }

    fn get(&self, kind: EntityKind) -> error::Result<DateTime<Utc>> {
        let conn = self.lock_conn()?;
        let micros: Option<i64> = conn
            .query_row(
                "SELECT cursor_micros FROM watermarks WHERE entity_kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        micros
            .map(Self::micros_to_datetime)
            .ok_or(StateError::Uninitialized(kind))
    }

    fn advance(
        &self,
        kind: EntityKind,
        timestamp: DateTime<Utc>,
    ) -> error::Result<DateTime<Utc>> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE watermarks
             SET cursor_micros = MAX(cursor_micros, ?2), updated_at = datetime('now')
             WHERE entity_kind = ?1",
            params![kind.as_str(), timestamp.timestamp_micros()],
        )?;
        if changed == 0 {
            return Err(StateError::Uninitialized(kind));
        }
        let micros: i64 = conn.query_row(
            "SELECT cursor_micros FROM watermarks WHERE entity_kind = ?1",
            params![kind.as_str()],
            |row| row.get(0),
        )?;
        Ok(Self::micros_to_datetime(micros))
    }

    fn snapshot(&self) -> error::Result<Vec<(EntityKind, DateTime<Utc>)>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_kind, cursor_micros FROM watermarks ORDER BY entity_kind",
        )?;
        let rows = stmt.query_map([], |row| {
            let kind: String = row.get(0)?;
            let micros: i64 = row.get(1)?;
            Ok((kind, micros))
        })?;

        let mut all = Vec::new();
        for row in rows {
            let (kind_str, micros) = row?;
            // Rows written by older builds with kinds we no longer track
            // are skipped rather than failing the whole snapshot.
            if let Some(kind) = EntityKind::parse(&kind_str) {
                all.push((kind, Self::micros_to_datetime(micros)));
            }
        }
        Ok(all)
    }

    fn record_tick(&self, summary: &TickSummary) -> error::Result<()> {
        let summary_json =
            serde_json::to_string(summary).unwrap_or_else(|_| String::from("{}"));
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO tick_runs
             (duration_secs, records_processed, events_published,
              sink_failures, query_failures, cancelled, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                summary.duration_secs,
                to_sql_count(summary.records_processed()),
                to_sql_count(summary.events_published()),
                to_sql_count(summary.sink_failures()),
                to_sql_count(summary.query_failures()),
                i64::from(summary.cancelled),
                summary_json,
            ],
        )?;
        Ok(())
    }
}
