//! `SQLite`-backed collaborator implementations.
//!
//! Each backend owns one `Mutex<Connection>` and bridges rusqlite's
//! blocking API into the async traits with `spawn_blocking`. These make
//! `mirrorsync run` work end to end against local files; production
//! deployments supply their own network-backed collaborators.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirrorsync_types::entity::{EntityId, EntityKind, Record};
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::traits::{AnalyticsStore, EventLog, PrimaryStore, SearchIndex};

/// Run a blocking rusqlite operation on the shared connection.
async fn with_conn<T, F>(conn: &Arc<Mutex<Connection>>, op: F) -> anyhow::Result<T>
where
    F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let guard = conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))?;
        op(&guard)
    })
    .await
    .map_err(|e| anyhow::anyhow!("sqlite task panicked: {e}"))?
}

fn open_connection(path: &Path, ddl: &str) -> anyhow::Result<Arc<Mutex<Connection>>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory for {}", path.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening sqlite database {}", path.display()))?;
    conn.execute_batch(ddl).context("applying schema")?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Table identifiers are interpolated into SQL, so only plain
/// lower-snake-case names are accepted.
fn validate_table_name(table: &str) -> anyhow::Result<()> {
    let valid = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    anyhow::ensure!(valid, "invalid analytics table name '{table}'");
    Ok(())
}

// ---------------------------------------------------------------------------
// Primary store
// ---------------------------------------------------------------------------

const PRIMARY_DDL: &str = r"
CREATE TABLE IF NOT EXISTS entities (
    kind TEXT NOT NULL,
    id TEXT NOT NULL,
    updated_at_micros INTEGER NOT NULL,
    payload TEXT NOT NULL,
    PRIMARY KEY (kind, id)
);

CREATE INDEX IF NOT EXISTS idx_entities_kind_updated
    ON entities (kind, updated_at_micros);
";

/// Read-only view over a local `entities` table.
///
/// The engine only ever issues `SELECT`s here; the schema is created at
/// open so a fresh file is queryable immediately.
pub struct SqlitePrimaryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePrimaryStore {
    /// Open the primary database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be opened or the schema can't
    /// be applied.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_connection(path, PRIMARY_DDL)?,
        })
    }
}

#[async_trait]
impl PrimaryStore for SqlitePrimaryStore {
    async fn connect(&self) -> anyhow::Result<()> {
        with_conn(&self.conn, |conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .context("probing primary store")
        })
        .await
    }

    async fn find_changed_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>> {
        let since_micros = since.timestamp_micros();
        with_conn(&self.conn, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, updated_at_micros, payload FROM entities
                 WHERE kind = ?1 AND updated_at_micros > ?2
                 ORDER BY updated_at_micros ASC",
            )?;
            let rows = stmt.query_map(params![kind.as_str(), since_micros], |row| {
                let id: String = row.get(0)?;
                let micros: i64 = row.get(1)?;
                let payload: String = row.get(2)?;
                Ok((id, micros, payload))
            })?;

            let mut records = Vec::new();
            for row in rows {
                let (id, micros, payload) = row?;
                let payload: Value = serde_json::from_str(&payload)
                    .with_context(|| format!("invalid payload JSON for {kind} '{id}'"))?;
                records.push(Record {
                    id: EntityId::new(id),
                    updated_at: DateTime::from_timestamp_micros(micros).unwrap_or_default(),
                    payload,
                });
            }
            Ok(records)
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

const EVENT_LOG_DDL: &str = r"
CREATE TABLE IF NOT EXISTS event_log (
    log_offset INTEGER PRIMARY KEY AUTOINCREMENT,
    topic TEXT NOT NULL,
    partition_key TEXT NOT NULL,
    value TEXT NOT NULL,
    appended_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_event_log_topic ON event_log (topic, log_offset);
";

/// Append-only local event log with monotonically increasing offsets.
pub struct SqliteEventLog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEventLog {
    /// Open the event log database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be opened or the schema can't
    /// be applied.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_connection(path, EVENT_LOG_DDL)?,
        })
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, topic: &str, key: &str, value: Value) -> anyhow::Result<()> {
        let topic = topic.to_string();
        let key = key.to_string();
        let value_json = value.to_string();
        with_conn(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO event_log (topic, partition_key, value) VALUES (?1, ?2, ?3)",
                params![topic, key, value_json],
            )
            .context("appending to event log")?;
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

const SEARCH_DDL: &str = r"
CREATE TABLE IF NOT EXISTS search_documents (
    doc_id TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    indexed_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// Local search index table with idempotent upserts keyed by doc id.
pub struct SqliteSearchIndex {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSearchIndex {
    /// Open the search database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be opened or the schema can't
    /// be applied.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: open_connection(path, SEARCH_DDL)?,
        })
    }
}

#[async_trait]
impl SearchIndex for SqliteSearchIndex {
    async fn index(&self, doc_id: &str, document: Value) -> anyhow::Result<()> {
        let doc_id = doc_id.to_string();
        let document_json = document.to_string();
        with_conn(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO search_documents (doc_id, document, indexed_at)
                 VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT (doc_id) DO UPDATE
                 SET document = excluded.document, indexed_at = excluded.indexed_at",
                params![doc_id, document_json],
            )
            .context("upserting search document")?;
            Ok(())
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Analytics store
// ---------------------------------------------------------------------------

/// Append-only analytics tables, one per entity kind, each with a
/// `UNIQUE(dedup_key)` index so redelivered rows are ignored.
pub struct SqliteAnalyticsStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAnalyticsStore {
    /// Open the analytics database at `path`, creating one change table
    /// per tracked entity kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be opened or the schema can't
    /// be applied.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let mut ddl = String::new();
        for kind in EntityKind::ALL {
            let table = kind.analytics_table();
            ddl.push_str(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    dedup_key TEXT NOT NULL,
                    row_json TEXT NOT NULL,
                    inserted_at TEXT NOT NULL DEFAULT (datetime('now'))
                );
                CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_dedup
                    ON {table} (dedup_key);\n"
            ));
        }
        Ok(Self {
            conn: open_connection(path, &ddl)?,
        })
    }
}

#[async_trait]
impl AnalyticsStore for SqliteAnalyticsStore {
    async fn insert_row(&self, table: &str, row: Value) -> anyhow::Result<()> {
        validate_table_name(table)?;
        let table = table.to_string();
        let dedup_key = row
            .get("dedup_key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("analytics row missing dedup_key"))?;
        let row_json = row.to_string();
        with_conn(&self.conn, move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {table} (dedup_key, row_json) VALUES (?1, ?2)"
                ),
                params![dedup_key, row_json],
            )
            .with_context(|| format!("inserting analytics row into {table}"))?;
            Ok(())
        })
        .await
    }
}
