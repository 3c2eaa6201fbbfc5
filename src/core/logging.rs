//! Process-wide structured logging (SPEC_FULL.md §4.10).

use super::constants::{APP_NAME_LOWER, ENV_LOG};

/// Initialize the `tracing` subscriber once at process start. Idempotent
/// beyond the first call only in the sense that later calls are no-ops if a
/// subscriber is already installed (errors are swallowed intentionally).
pub fn init() {
    let default_filter = format!("info,{}=debug", APP_NAME_LOWER.replace('-', "_"));
    let filter = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or(default_filter);

    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(filter)
        .try_init();
}
