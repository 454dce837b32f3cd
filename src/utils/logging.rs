//! Structured logging setup.
//!
//! Mirrors the teacher's `tracing_subscriber::fmt` bootstrap in `main.rs`,
//! generalized to honor `RUST_LOG` via `EnvFilter` instead of a fixed level.

use tracing_subscriber::{EnvFilter, fmt};

/// Initialize the global tracing subscriber. Safe to call once at process start.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}
