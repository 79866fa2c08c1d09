//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process.
///
/// JSON logs, filtering controlled through `RUST_LOG`. The default filter
/// keeps the store's operation spans at `info` and quiets sqlx's own
/// statement logging. Safe to call multiple times (subsequent calls are
/// no-ops).
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_target(false)
        .try_init();
}
