//! Tracing/logging initialization.
//!
//! Every stage of a dispatch logs structured fields (`job`, `outreach`,
//! `recipient`, per-stage counters); this module only wires up the
//! subscriber they land in.

use tracing_subscriber::EnvFilter;

/// Default filter: the dispatch crates at debug, everything else at info.
const DEFAULT_FILTER: &str = "info,tradecast=debug";

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    init_with_filter(DEFAULT_FILTER);
}

/// Initialize with an explicit fallback filter, still overridable through
/// `RUST_LOG`.
pub fn init_with_filter(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    // JSON lines so per-job fields stay machine-readable downstream.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
