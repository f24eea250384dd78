//! Shared model types for the mirrorsync engine.
//!
//! Pure data types used by the watermark store, the engine, and the CLI.
//! Kept in their own crate so state and engine crates can share them
//! without circular dependencies.

#![warn(clippy::pedantic)]

pub mod entity;
pub mod event;
pub mod run;
