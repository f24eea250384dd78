use tracing_subscriber::EnvFilter;

/// Directives applying `--log-level` to the mirrorsync crates while
/// holding dependencies at `warn`, so engine output is not drowned out
/// by library noise.
fn scoped_directives(log_level: &str) -> String {
    format!(
        "warn,mirrorsync_cli={log_level},mirrorsync_engine={log_level},mirrorsync_state={log_level}"
    )
}

/// Initialize structured logging. `RUST_LOG` takes precedence when set;
/// otherwise the `--log-level` flag is scoped to the mirrorsync crates.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(scoped_directives(log_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
