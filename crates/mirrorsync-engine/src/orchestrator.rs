//! Sync engine orchestrator: lifecycle, scheduling loop, and per-tick
//! record fan-out.
//!
//! One tick visits each tracked entity kind in order: read the kind's
//! watermark, query the primary store for records changed strictly after
//! it, normalize each record into a canonical change event, publish the
//! event to the log, write the record to every sink, then advance the
//! watermark to the last processed record's `updated_at`. Ticks never
//! overlap; a slow tick delays the next one rather than running
//! concurrently with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use mirrorsync_state::WatermarkStore;
use mirrorsync_types::entity::EntityKind;
use mirrorsync_types::run::{KindSummary, TickSummary};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::normalize::normalize;
use crate::publish::{EventPublisher, DEFAULT_TOPIC};
use crate::sink::SinkAdapter;
use crate::traits::{EventLog, PrimaryStore};

/// Collaborators the engine orchestrates. All four are supplied by the
/// caller; the engine owns their connection lifecycle but not their
/// construction.
pub struct EngineParts {
    pub primary: Arc<dyn PrimaryStore>,
    pub event_log: Arc<dyn EventLog>,
    pub sinks: Vec<Arc<dyn SinkAdapter>>,
    pub watermarks: Arc<dyn WatermarkStore>,
}

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Delay between the end of one tick and the start of the next.
    pub poll_interval: Duration,
    /// Entity kinds to track, in visit order.
    pub entities: Vec<EntityKind>,
    /// Log topic canonical change events are appended to.
    pub topic: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            entities: EntityKind::ALL.to_vec(),
            topic: DEFAULT_TOPIC.to_string(),
        }
    }
}

/// The polling sync engine.
///
/// `start` acquires every collaborator connection, initializes missing
/// watermarks to the current time, and spawns the scheduling loop;
/// `stop` interrupts the loop at the next record boundary, drains it,
/// and releases the connections. `run_once` performs the same lifecycle
/// around exactly one tick, for cron-style deployments.
pub struct SyncEngine {
    primary: Arc<dyn PrimaryStore>,
    publisher: EventPublisher,
    sinks: Vec<Arc<dyn SinkAdapter>>,
    watermarks: Arc<dyn WatermarkStore>,
    options: EngineOptions,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("options", &self.options)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Assemble an engine from its collaborators.
    #[must_use]
    pub fn new(parts: EngineParts, options: EngineOptions) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let publisher = EventPublisher::new(parts.event_log, options.topic.clone());
        Arc::new(Self {
            primary: parts.primary,
            publisher,
            sinks: parts.sinks,
            watermarks: parts.watermarks,
            options,
            running: AtomicBool::new(false),
            shutdown_tx,
            loop_handle: Mutex::new(None),
        })
    }

    /// Whether the scheduling loop is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current watermark cursors, for operator inspection.
    ///
    /// # Errors
    ///
    /// Propagates watermark store failures.
    pub fn watermark_snapshot(&self) -> Result<Vec<(EntityKind, chrono::DateTime<Utc>)>> {
        Ok(self.watermarks.snapshot()?)
    }

    /// Start the engine. A second call while running is a no-op.
    ///
    /// Kinds without an existing watermark start at the current time, so
    /// a fresh deployment syncs changes made after start rather than
    /// replaying history.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Startup`] if any collaborator connection
    /// fails (connections acquired so far are released) or
    /// [`EngineError::State`] if watermark initialization fails. The
    /// engine stays stopped on error.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("engine already running, ignoring start");
            return Ok(());
        }

        if let Err(e) = self.acquire_connections().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(EngineError::Startup(e));
        }
        if let Err(e) = self
            .watermarks
            .initialize(&self.options.entities, Utc::now())
        {
            self.release_connections().await;
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        self.shutdown_tx.send_replace(false);
        let shutdown_rx = self.shutdown_tx.subscribe();
        let engine = Arc::clone(self);
        let handle = tokio::spawn(async move { engine.run_loop(shutdown_rx).await });
        *self.loop_handle.lock().await = Some(handle);

        info!(
            poll_interval_secs = self.options.poll_interval.as_secs_f64(),
            kinds = self.options.entities.len(),
            topic = %self.publisher.topic(),
            "sync engine started"
        );
        Ok(())
    }

    /// Stop the engine and release all collaborator connections.
    ///
    /// An in-flight record finishes its fan-out to every sink before the
    /// loop exits, so no record is left half-written. A call while
    /// stopped, or while a one-shot [`run_once`](Self::run_once) tick is
    /// in flight, is a no-op: connections are released only by whoever
    /// acquired them.
    pub async fn stop(&self) {
        let handle = self.loop_handle.lock().await.take();
        let Some(handle) = handle else {
            // No scheduler loop to drain. A run_once tick may still be
            // running; it owns its own connection lifecycle.
            return;
        };

        self.shutdown_tx.send_replace(true);
        if let Err(e) = handle.await {
            error!(error = %e, "scheduler task did not shut down cleanly");
        }
        self.release_connections().await;
        self.running.store(false, Ordering::SeqCst);
        info!("sync engine stopped");
    }

    /// Acquire connections, run exactly one tick, release connections.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Startup`] if the engine is already running
    /// or a connection fails. Per-kind and per-record failures are
    /// logged and counted in the returned summary, not propagated.
    pub async fn run_once(&self) -> Result<TickSummary> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::Startup(anyhow::anyhow!(
                "engine is already running"
            )));
        }
        let result = self.run_once_inner().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_once_inner(&self) -> Result<TickSummary> {
        self.acquire_connections()
            .await
            .map_err(EngineError::Startup)?;
        if let Err(e) = self
            .watermarks
            .initialize(&self.options.entities, Utc::now())
        {
            self.release_connections().await;
            return Err(e.into());
        }

        // Dedicated channel: a one-shot tick is never cancelled.
        let (_tx, shutdown_rx) = watch::channel(false);
        let summary = self.run_tick(&shutdown_rx).await;
        if let Err(e) = self.watermarks.record_tick(&summary) {
            warn!(error = %e, "failed to record tick history");
        }
        self.release_connections().await;
        Ok(summary)
    }

    /// Verify every collaborator connection can be acquired, then
    /// release them again.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Startup`] naming the failing collaborator.
    pub async fn check(&self) -> Result<()> {
        self.acquire_connections()
            .await
            .map_err(EngineError::Startup)?;
        self.release_connections().await;
        Ok(())
    }

    /// Connect collaborators in a fixed order. On failure, close the
    /// ones already connected so a failed start leaks nothing.
    async fn acquire_connections(&self) -> anyhow::Result<()> {
        self.primary
            .connect()
            .await
            .context("connecting primary store")?;

        if let Err(e) = self.publisher.connect().await.context("connecting event log") {
            self.primary.close().await;
            return Err(e);
        }

        for (i, sink) in self.sinks.iter().enumerate() {
            let connected = sink
                .connect()
                .await
                .with_context(|| format!("connecting sink '{}'", sink.name()));
            if let Err(e) = connected {
                for earlier in &self.sinks[..i] {
                    earlier.close().await;
                }
                self.publisher.close().await;
                self.primary.close().await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn release_connections(&self) {
        for sink in &self.sinks {
            sink.close().await;
        }
        self.publisher.close().await;
        self.primary.close().await;
    }

    /// Scheduling loop: one tick per interval, no overlap. The first
    /// tick fires immediately after start.
    async fn run_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.options.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.run_tick(&shutdown_rx).await;
                    info!(
                        records = summary.records_processed(),
                        events = summary.events_published(),
                        sink_failures = summary.sink_failures(),
                        query_failures = summary.query_failures(),
                        duration_secs = summary.duration_secs,
                        cancelled = summary.cancelled,
                        "tick complete"
                    );
                    if let Err(e) = self.watermarks.record_tick(&summary) {
                        warn!(error = %e, "failed to record tick history");
                    }
                    if summary.cancelled || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("scheduler loop drained");
    }

    /// Run one tick over every tracked kind.
    ///
    /// Failures inside a tick are contained at the finest granularity:
    /// a failed change query skips that kind until the next tick, a
    /// failed publish or sink write skips that record for that sink
    /// only. Nothing here terminates the loop.
    async fn run_tick(&self, shutdown_rx: &watch::Receiver<bool>) -> TickSummary {
        let started = Instant::now();
        let mut summary = TickSummary::default();

        for kind in &self.options.entities {
            if *shutdown_rx.borrow() {
                summary.cancelled = true;
                break;
            }
            let mut kind_summary = KindSummary::empty(*kind);
            match self.watermarks.get(*kind) {
                Ok(since) => {
                    let cancelled = self
                        .sync_kind(*kind, since, &mut kind_summary, shutdown_rx)
                        .await;
                    summary.cancelled = cancelled;
                }
                Err(e) => {
                    error!(kind = %kind, error = %e, "failed to read watermark, skipping kind");
                    kind_summary.query_failed = true;
                }
            }
            summary.kinds.push(kind_summary);
            if summary.cancelled {
                break;
            }
        }

        summary.duration_secs = started.elapsed().as_secs_f64();
        summary
    }

    /// Sync one kind: query, then fan out each record. Returns true if
    /// shutdown interrupted the batch.
    async fn sync_kind(
        &self,
        kind: EntityKind,
        since: chrono::DateTime<Utc>,
        summary: &mut KindSummary,
        shutdown_rx: &watch::Receiver<bool>,
    ) -> bool {
        let records = match self.primary.find_changed_since(kind, since).await {
            Ok(records) => records,
            Err(source) => {
                let err = EngineError::Query { kind, source };
                warn!(kind = %kind, error = %err, "change query failed, will retry next tick");
                summary.query_failed = true;
                return false;
            }
        };
        if records.is_empty() {
            debug!(kind = %kind, "no changes");
            return false;
        }

        let mut last_processed = since;
        let mut cancelled = false;
        for record in &records {
            let event = normalize(kind, record);
            match self.publisher.publish(&event).await {
                Ok(()) => summary.events_published += 1,
                Err(e) => {
                    warn!(
                        kind = %kind,
                        id = %event.entity_id,
                        correlation_id = %event.correlation_id,
                        error = %e,
                        "event publish failed, continuing with sink fan-out"
                    );
                }
            }

            for sink in &self.sinks {
                if let Err(source) = sink.write(&event).await {
                    let err = EngineError::SinkWrite {
                        sink: sink.name(),
                        kind,
                        id: event.entity_id.clone(),
                        source,
                    };
                    error!(
                        sink = sink.name(),
                        kind = %kind,
                        id = %event.entity_id,
                        correlation_id = %event.correlation_id,
                        error = %err,
                        "sink write failed"
                    );
                    summary.sink_failures += 1;
                }
            }

            summary.records_processed += 1;
            last_processed = record.updated_at;

            // Shutdown lands on a record boundary: the record above has
            // completed its fan-out to every sink.
            if *shutdown_rx.borrow() {
                cancelled = true;
                break;
            }
        }

        if last_processed > since {
            match self.watermarks.advance(kind, last_processed) {
                Ok(cursor) => {
                    debug!(kind = %kind, cursor = %cursor, records = summary.records_processed, "watermark advanced");
                }
                Err(e) => {
                    error!(kind = %kind, error = %e, "failed to advance watermark");
                }
            }
        }
        cancelled
    }
}
