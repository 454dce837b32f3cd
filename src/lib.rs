//! A multi-provider LLM request gateway: sticky sessions, per-key QPS
//! limiting, provider failure cooldowns, and score-based candidate
//! selection across configurable routing strategies.

pub mod config;
pub mod core;
pub mod server;
pub mod storage;
pub mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
