//! Engine error taxonomy.
//!
//! Runtime errors (`Query`, `Publish`, `SinkWrite`) are produced at the
//! finest granularity (per entity kind, per record, per sink) and are
//! caught and logged by the tick loop rather than propagated; no runtime
//! error may terminate the scheduling loop. Only `Startup` and `State`
//! reach callers, through `start()` and `run_once()`.

use mirrorsync_state::StateError;
use mirrorsync_types::entity::{EntityId, EntityKind};

/// Errors produced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Required collaborator connections could not be acquired; the
    /// engine remains stopped.
    #[error("engine startup failed: {0}")]
    Startup(#[source] anyhow::Error),

    /// The primary store rejected or failed a change query. The affected
    /// kind is skipped for the tick and retried on the next one.
    #[error("change query failed for '{kind}': {source}")]
    Query {
        kind: EntityKind,
        #[source]
        source: anyhow::Error,
    },

    /// The event log rejected an append. Sink fan-out for the same
    /// record proceeds regardless.
    #[error("event publish failed for {kind} '{id}': {source}")]
    Publish {
        kind: EntityKind,
        id: EntityId,
        #[source]
        source: anyhow::Error,
    },

    /// One sink failed to write one record. Other sinks and later
    /// records are unaffected.
    #[error("sink '{sink}' write failed for {kind} '{id}': {source}")]
    SinkWrite {
        sink: &'static str,
        kind: EntityKind,
        id: EntityId,
        #[source]
        source: anyhow::Error,
    },

    /// Watermark store failure.
    #[error("watermark store error: {0}")]
    State(#[from] StateError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, EngineError>;
