//! Core orchestration crate for mirrorsync.
//!
//! Keeps derivative stores (a search index and an analytics store)
//! consistent with a primary transactional store by polling for records
//! with `updated_at` past a per-entity-kind watermark, normalizing them
//! into canonical change events, publishing those events to an ordered
//! log, and fanning each record out to every registered sink.

pub mod backends;
pub mod config;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod publish;
pub mod resolve;
pub mod sink;
pub mod traits;

// Re-export public API for convenience
pub use error::EngineError;
pub use orchestrator::{EngineOptions, EngineParts, SyncEngine};
pub use resolve::build_engine;
