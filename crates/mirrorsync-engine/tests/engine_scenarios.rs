//! End-to-end engine scenarios over the in-memory and sqlite backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mirrorsync_engine::backends::memory::{
    MemoryAnalyticsStore, MemoryEventLog, MemoryPrimaryStore, MemorySearchIndex,
};
use mirrorsync_engine::build_engine;
use mirrorsync_engine::config::parse_config_str;
use mirrorsync_engine::sink::analytics::AnalyticsSinkAdapter;
use mirrorsync_engine::sink::search::SearchSinkAdapter;
use mirrorsync_engine::sink::SinkAdapter;
use mirrorsync_engine::traits::{PrimaryStore, SearchIndex};
use mirrorsync_engine::{EngineOptions, EngineParts, SyncEngine};
use mirrorsync_state::{MemoryWatermarkStore, SqliteWatermarkStore, WatermarkStore};
use mirrorsync_types::entity::{EntityId, EntityKind, Record};
use mirrorsync_types::event::ChangeEvent;
use serde_json::json;
use tokio::sync::{mpsc, Semaphore};

fn record(id: &str, iso: &str) -> Record {
    Record {
        id: EntityId::new(id),
        updated_at: iso.parse().unwrap(),
        payload: json!({"username": id, "email": format!("{id}@example.com")}),
    }
}

fn ts(iso: &str) -> DateTime<Utc> {
    iso.parse().unwrap()
}

/// A search backend that refuses one specific document id.
struct RefusingSearch {
    inner: MemorySearchIndex,
    refuse_doc_id: String,
}

#[async_trait]
impl SearchIndex for RefusingSearch {
    async fn index(&self, doc_id: &str, document: serde_json::Value) -> anyhow::Result<()> {
        if doc_id == self.refuse_doc_id {
            anyhow::bail!("mapping conflict for '{doc_id}'");
        }
        self.inner.index(doc_id, document).await
    }
}

/// One failing sink write must not affect the other sink, later records,
/// or the watermark.
#[tokio::test]
async fn sink_failure_is_isolated_per_record_and_per_sink() {
    let primary = Arc::new(MemoryPrimaryStore::new());
    primary.push_record(EntityKind::User, record("u-1", "2026-02-01T10:00:01Z"));
    primary.push_record(EntityKind::User, record("u-2", "2026-02-01T10:00:02Z"));
    primary.push_record(EntityKind::User, record("u-3", "2026-02-01T10:00:03Z"));

    let search = Arc::new(RefusingSearch {
        inner: MemorySearchIndex::new(),
        refuse_doc_id: "user:u-2".to_string(),
    });
    let analytics = Arc::new(MemoryAnalyticsStore::new());
    let log = Arc::new(MemoryEventLog::new());
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    watermarks
        .initialize(&[EntityKind::User], ts("2026-02-01T00:00:00Z"))
        .unwrap();

    let engine = SyncEngine::new(
        EngineParts {
            primary,
            event_log: log.clone(),
            sinks: vec![
                Arc::new(SearchSinkAdapter::new(search.clone())),
                Arc::new(AnalyticsSinkAdapter::new(analytics.clone())),
            ],
            watermarks: watermarks.clone(),
        },
        EngineOptions {
            entities: vec![EntityKind::User],
            ..EngineOptions::default()
        },
    );

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.records_processed(), 3);
    assert_eq!(summary.events_published(), 3);
    assert_eq!(summary.sink_failures(), 1);

    // u-2 is missing from search but present everywhere else.
    let docs = search.inner.documents();
    assert_eq!(docs.len(), 2);
    assert!(docs.contains_key("user:u-1"));
    assert!(docs.contains_key("user:u-3"));
    assert_eq!(analytics.rows("user_changes").len(), 3);
    assert_eq!(log.messages().len(), 3);

    // The watermark covers the failed record: it will not be retried.
    assert_eq!(
        watermarks.get(EntityKind::User).unwrap(),
        ts("2026-02-01T10:00:03Z")
    );
}

/// A sink whose first write blocks until the test releases it, so the
/// test can stop the engine while a record is in flight.
struct GateSink {
    first: AtomicBool,
    entered_tx: mpsc::UnboundedSender<()>,
    release: Arc<Semaphore>,
    written: Mutex<Vec<String>>,
}

#[async_trait]
impl SinkAdapter for GateSink {
    fn name(&self) -> &'static str {
        "gate"
    }

    async fn write(&self, event: &ChangeEvent) -> anyhow::Result<()> {
        if !self.first.swap(true, Ordering::SeqCst) {
            let _ = self.entered_tx.send(());
            let permit = self.release.acquire().await?;
            permit.forget();
        }
        self.written
            .lock()
            .unwrap()
            .push(event.entity_id.to_string());
        Ok(())
    }
}

/// `stop()` during a tick lets the in-flight record finish its full
/// fan-out, then halts before later records, advancing the watermark to
/// the last completed record only.
#[tokio::test]
async fn stop_mid_tick_completes_the_inflight_record() {
    let primary = Arc::new(MemoryPrimaryStore::new());
    primary.push_record(EntityKind::User, record("u-1", "2026-02-01T10:00:01Z"));
    primary.push_record(EntityKind::User, record("u-2", "2026-02-01T10:00:02Z"));
    primary.push_record(EntityKind::User, record("u-3", "2026-02-01T10:00:03Z"));

    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Semaphore::new(0));
    let gate = Arc::new(GateSink {
        first: AtomicBool::new(false),
        entered_tx,
        release: release.clone(),
        written: Mutex::new(Vec::new()),
    });
    let analytics = Arc::new(MemoryAnalyticsStore::new());
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    watermarks
        .initialize(&[EntityKind::User], ts("2026-02-01T00:00:00Z"))
        .unwrap();

    let engine = SyncEngine::new(
        EngineParts {
            primary,
            event_log: Arc::new(MemoryEventLog::new()),
            sinks: vec![gate.clone(), Arc::new(AnalyticsSinkAdapter::new(analytics.clone()))],
            watermarks: watermarks.clone(),
        },
        EngineOptions {
            poll_interval: Duration::from_secs(60),
            entities: vec![EntityKind::User],
            ..EngineOptions::default()
        },
    );

    engine.start().await.unwrap();
    // First tick fires immediately; wait until record u-1 is inside the
    // gated sink, then request shutdown while it is still in flight.
    entered_rx.recv().await.unwrap();
    let stopper = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.stop().await })
    };
    // Give stop() time to raise the shutdown flag before releasing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    release.add_permits(1);
    stopper.await.unwrap();

    assert!(!engine.is_running());
    // u-1 completed both sinks; u-2 and u-3 were never started.
    assert_eq!(*gate.written.lock().unwrap(), vec!["u-1".to_string()]);
    assert_eq!(analytics.rows("user_changes").len(), 1);
    assert_eq!(
        watermarks.get(EntityKind::User).unwrap(),
        ts("2026-02-01T10:00:01Z")
    );
}

/// A primary store that counts how often its connection is released.
struct CountingPrimary {
    inner: MemoryPrimaryStore,
    closes: std::sync::atomic::AtomicUsize,
}

#[async_trait]
impl PrimaryStore for CountingPrimary {
    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    async fn find_changed_since(
        &self,
        kind: EntityKind,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Record>> {
        self.inner.find_changed_since(kind, since).await
    }
}

/// `stop()` during an in-flight `run_once` tick must not release the
/// connections the tick is still using; the tick releases them itself,
/// exactly once, when it finishes.
#[tokio::test]
async fn stop_during_run_once_leaves_its_connections_alone() {
    let primary = Arc::new(CountingPrimary {
        inner: MemoryPrimaryStore::new(),
        closes: std::sync::atomic::AtomicUsize::new(0),
    });
    primary
        .inner
        .push_record(EntityKind::User, record("u-1", "2026-02-01T10:00:01Z"));

    let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
    let release = Arc::new(Semaphore::new(0));
    let gate = Arc::new(GateSink {
        first: AtomicBool::new(false),
        entered_tx,
        release: release.clone(),
        written: Mutex::new(Vec::new()),
    });
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    watermarks
        .initialize(&[EntityKind::User], ts("2026-02-01T00:00:00Z"))
        .unwrap();

    let engine = SyncEngine::new(
        EngineParts {
            primary: primary.clone(),
            event_log: Arc::new(MemoryEventLog::new()),
            sinks: vec![gate.clone()],
            watermarks,
        },
        EngineOptions {
            entities: vec![EntityKind::User],
            ..EngineOptions::default()
        },
    );

    let ticker = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_once().await })
    };
    // The tick is now blocked inside the gated sink.
    entered_rx.recv().await.unwrap();

    engine.stop().await;
    assert_eq!(
        primary.closes.load(Ordering::SeqCst),
        0,
        "stop() must not release connections owned by run_once"
    );

    release.add_permits(1);
    let summary = ticker.await.unwrap().unwrap();
    assert_eq!(summary.records_processed(), 1);
    assert_eq!(primary.closes.load(Ordering::SeqCst), 1);
}

/// Records sharing one `updated_at` all sync in the tick that sees them;
/// the watermark lands exactly on the shared timestamp and the strict
/// cursor comparison keeps them from reprocessing later.
#[tokio::test]
async fn shared_timestamp_records_sync_once() {
    let shared = "2026-02-01T10:00:00Z";
    let primary = Arc::new(MemoryPrimaryStore::new());
    primary.push_record(EntityKind::Asset, record("a-1", shared));
    primary.push_record(EntityKind::Asset, record("a-2", shared));
    primary.push_record(EntityKind::Asset, record("a-3", shared));

    let log = Arc::new(MemoryEventLog::new());
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    watermarks
        .initialize(&[EntityKind::Asset], ts("2026-02-01T00:00:00Z"))
        .unwrap();

    let engine = SyncEngine::new(
        EngineParts {
            primary,
            event_log: log.clone(),
            sinks: vec![],
            watermarks: watermarks.clone(),
        },
        EngineOptions {
            entities: vec![EntityKind::Asset],
            ..EngineOptions::default()
        },
    );

    let first = engine.run_once().await.unwrap();
    assert_eq!(first.records_processed(), 3);
    assert_eq!(watermarks.get(EntityKind::Asset).unwrap(), ts(shared));

    let second = engine.run_once().await.unwrap();
    assert_eq!(second.records_processed(), 0);
    assert_eq!(log.messages().len(), 3);
}

/// Restarting after a partial tick resumes from the watermark: the
/// remaining records sync on the next run without reprocessing.
#[tokio::test]
async fn restart_resumes_from_watermark() {
    let primary = Arc::new(MemoryPrimaryStore::new());
    primary.push_record(EntityKind::Content, record("c-1", "2026-02-01T10:00:01Z"));
    primary.push_record(EntityKind::Content, record("c-2", "2026-02-01T10:00:02Z"));

    let log = Arc::new(MemoryEventLog::new());
    let watermarks = Arc::new(MemoryWatermarkStore::new());
    // Cursor already past c-1, as if a previous run processed it.
    watermarks
        .initialize(&[EntityKind::Content], ts("2026-02-01T10:00:01Z"))
        .unwrap();

    let engine = SyncEngine::new(
        EngineParts {
            primary,
            event_log: log.clone(),
            sinks: vec![],
            watermarks: watermarks.clone(),
        },
        EngineOptions {
            entities: vec![EntityKind::Content],
            ..EngineOptions::default()
        },
    );

    let summary = engine.run_once().await.unwrap();
    assert_eq!(summary.records_processed(), 1);
    assert_eq!(log.messages()[0].value["entity_id"], "c-2");
}

/// Full config-driven run over the sqlite backends.
#[tokio::test]
async fn sqlite_stack_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();

    // Seed a watermark in the past so the seeded records are visible.
    {
        let store = SqliteWatermarkStore::open(&root.join("state.db")).unwrap();
        store
            .initialize(&[EntityKind::User], ts("2026-01-01T00:00:00Z"))
            .unwrap();
    }
    // Seed the primary store.
    {
        use mirrorsync_engine::backends::sqlite::SqlitePrimaryStore;
        let _schema = SqlitePrimaryStore::open(&root.join("primary.db")).unwrap();
        let conn = rusqlite::Connection::open(root.join("primary.db")).unwrap();
        for (id, micros) in [("u-1", 1_769_940_000_000_000_i64), ("u-2", 1_769_940_001_000_000)] {
            conn.execute(
                "INSERT INTO entities (kind, id, updated_at_micros, payload) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    "user",
                    id,
                    micros,
                    json!({"username": id, "email": format!("{id}@example.com")}).to_string()
                ],
            )
            .unwrap();
        }
    }

    let yaml = format!(
        r#"
version: "1.0"
name: marketplace
entities: [user]
primary:
  backend: sqlite
  path: {0}/primary.db
watermarks:
  backend: sqlite
  path: {0}/state.db
search:
  backend: sqlite
  path: {0}/search.db
analytics:
  backend: sqlite
  path: {0}/analytics.db
log:
  backend: sqlite
  path: {0}/log.db
"#,
        root.display()
    );
    let config = parse_config_str(&yaml).unwrap();
    let engine = build_engine(&config).unwrap();

    let summary = engine.run_once().await.unwrap();
    assert_eq!(summary.records_processed(), 2);
    assert_eq!(summary.events_published(), 2);
    assert_eq!(summary.sink_failures(), 0);

    let count = |db: &str, sql: &str| -> i64 {
        let conn = rusqlite::Connection::open(root.join(db)).unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    };
    assert_eq!(count("log.db", "SELECT COUNT(*) FROM event_log"), 2);
    assert_eq!(count("search.db", "SELECT COUNT(*) FROM search_documents"), 2);
    assert_eq!(count("analytics.db", "SELECT COUNT(*) FROM user_changes"), 2);

    // Watermark advanced to the newest record and survives reopening.
    let store = SqliteWatermarkStore::open(&root.join("state.db")).unwrap();
    assert_eq!(
        store.get(EntityKind::User).unwrap().timestamp_micros(),
        1_769_940_001_000_000
    );

    // A second run sees nothing new.
    let summary = engine.run_once().await.unwrap();
    assert_eq!(summary.records_processed(), 0);
    assert_eq!(count("log.db", "SELECT COUNT(*) FROM event_log"), 2);
}
