//! Tick outcome summaries for logging and run history.

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

/// Counts for one entity kind within one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSummary {
    pub kind: EntityKind,
    /// Records returned by the change query and processed.
    pub records_processed: u64,
    /// Events appended to the log (publish failures excluded).
    pub events_published: u64,
    /// Individual sink write failures (per record per sink).
    pub sink_failures: u64,
    /// Whether the change query itself failed (kind skipped).
    pub query_failed: bool,
}

impl KindSummary {
    /// Empty summary for a kind, before any records are seen.
    #[must_use]
    pub fn empty(kind: EntityKind) -> Self {
        Self {
            kind,
            records_processed: 0,
            events_published: 0,
            sink_failures: 0,
            query_failed: false,
        }
    }
}

/// Aggregate outcome of one orchestrator tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub kinds: Vec<KindSummary>,
    pub duration_secs: f64,
    /// True when `stop()` interrupted the tick before all kinds ran.
    pub cancelled: bool,
}

impl TickSummary {
    /// Total records processed across all kinds.
    #[must_use]
    pub fn records_processed(&self) -> u64 {
        self.kinds.iter().map(|k| k.records_processed).sum()
    }

    /// Total events published across all kinds.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.kinds.iter().map(|k| k.events_published).sum()
    }

    /// Total sink write failures across all kinds.
    #[must_use]
    pub fn sink_failures(&self) -> u64 {
        self.kinds.iter().map(|k| k.sink_failures).sum()
    }

    /// Number of kinds whose change query failed this tick.
    #[must_use]
    pub fn query_failures(&self) -> u64 {
        u64::try_from(self.kinds.iter().filter(|k| k.query_failed).count()).unwrap_or(u64::MAX)
    }
}
