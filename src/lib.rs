//! # passhotp
//!
//! Counter-based one-time password (RFC 4226) verification as a request
//! authentication step. The engine and the strategy live in their own
//! crates; this package wires them to configuration, logging, a file-backed
//! key store and an axum middleware.

pub mod config;
pub mod http;
pub mod logging;
pub mod store;

pub use passhotp_engine::hotp;
pub use passhotp_strategy::strategy;

pub use config::{AppConfig, ConfigError, LogFormat, LoggingConfig};
pub use http::{request_data, require_hotp, HotpGuard, RequestData, VerifiedProperties};
pub use logging::init_logging;
pub use store::{FileKeyStore, StoreError, StoredKey};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
