//! Watermark store error types.

use mirrorsync_types::entity::EntityKind;

/// Errors produced by [`WatermarkStore`](crate::WatermarkStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("watermark store lock poisoned")]
    LockPoisoned,

    /// `get`/`advance` called for a kind that `initialize` never saw.
    #[error("no watermark initialized for entity kind '{0}'")]
    Uninitialized(EntityKind),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StateError>;
