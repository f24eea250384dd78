//! Sync configuration: YAML schema, parsing, and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_config, parse_config_str};
pub use types::{BackendKind, LogConfig, StoreConfig, SyncConfig};
pub use validator::validate_config;
