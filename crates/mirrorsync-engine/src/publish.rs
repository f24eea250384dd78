//! Best-effort change event publishing to the ordered log.

use std::sync::Arc;

use mirrorsync_types::event::ChangeEvent;

use crate::error::EngineError;
use crate::traits::EventLog;

/// Default log topic for canonical change events.
pub const DEFAULT_TOPIC: &str = "entity-changes";

/// Appends canonical events to the log, keyed by entity kind plus
/// timestamp so one kind's events stay ordered within a partition.
///
/// Publishing and sink writing are independent concerns: a failed append
/// is reported to the caller (who logs it) and never blocks the sink
/// fan-out for the same record, so the log and the sinks can diverge
/// under partial failure.
pub struct EventPublisher {
    log: Arc<dyn EventLog>,
    topic: String,
}

impl EventPublisher {
    /// Create a publisher appending to `topic` on `log`.
    pub fn new(log: Arc<dyn EventLog>, topic: impl Into<String>) -> Self {
        Self {
            log,
            topic: topic.into(),
        }
    }

    /// Topic this publisher appends to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Acquire the log connection.
    ///
    /// # Errors
    ///
    /// Propagates the log backend's connection error.
    pub async fn connect(&self) -> anyhow::Result<()> {
        self.log.connect().await
    }

    /// Release the log connection.
    pub async fn close(&self) {
        self.log.close().await;
    }

    /// Append one event, awaiting the log's delivery acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Publish`] when the append fails; the caller
    /// logs it and continues with the sink fan-out.
    pub async fn publish(&self, event: &ChangeEvent) -> Result<(), EngineError> {
        let value = serde_json::to_value(event).map_err(|e| EngineError::Publish {
            kind: event.entity_kind,
            id: event.entity_id.clone(),
            source: anyhow::Error::new(e).context("serializing change event"),
        })?;
        self.log
            .append(&self.topic, &event.partition_key(), value)
            .await
            .map_err(|source| EngineError::Publish {
                kind: event.entity_kind,
                id: event.entity_id.clone(),
                source,
            })
    }
}
