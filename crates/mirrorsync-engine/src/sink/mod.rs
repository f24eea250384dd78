//! Sink adapters: the fixed set of derivative-store writers.
//!
//! Sinks are modeled as an explicit set of variants implementing one
//! capability trait, registered in a list at start-up. Each adapter owns
//! its own record-to-schema projection; none is a generic pass-through
//! of the raw record.

pub mod analytics;
pub mod search;

use async_trait::async_trait;
use mirrorsync_types::event::ChangeEvent;

pub use analytics::AnalyticsSinkAdapter;
pub use search::SearchSinkAdapter;

/// One downstream writer receiving every detected change.
///
/// Failures are isolated per record per sink ("bulkhead"): the
/// orchestrator catches and logs a failed `write` and still delivers the
/// same record to the remaining sinks and later records to this one.
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    /// Stable sink name used in logs and error context.
    fn name(&self) -> &'static str;

    /// Acquire the sink's backend connection.
    async fn connect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release the sink's backend connection.
    async fn close(&self) {}

    /// Project and write one change event.
    async fn write(&self, event: &ChangeEvent) -> anyhow::Result<()>;
}
