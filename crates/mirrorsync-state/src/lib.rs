//! Watermark persistence for the mirrorsync engine.
//!
//! Provides the [`WatermarkStore`] trait with a [`MemoryWatermarkStore`]
//! (process-lifetime cursors, the engine's default) and a
//! [`SqliteWatermarkStore`] (cursors and tick history that survive
//! restarts).

#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StateError;
pub use memory::MemoryWatermarkStore;
pub use sqlite::SqliteWatermarkStore;
pub use store::WatermarkStore;
