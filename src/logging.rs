//! Tracing subscriber setup.
//!
//! Member crates log through the `log` facade; the subscriber installed here
//! also captures those records.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Install the global subscriber. `RUST_LOG` overrides `config.level`.
///
/// Fails if a global subscriber or logger is already installed.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if cfg!(feature = "logs-json") || config.format == LogFormat::Json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}
