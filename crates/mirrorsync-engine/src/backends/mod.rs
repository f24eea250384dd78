//! Collaborator backend implementations.
//!
//! `memory` backs tests, demos, and the `backend: memory` config;
//! `sqlite` lets the engine run end to end against local files.

pub mod memory;
pub mod sqlite;
