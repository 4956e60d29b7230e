//! Tracing subscriber setup for binaries and integration harnesses.

use tracing_subscriber::EnvFilter;

use crate::config::{LoggingConfig, StoreConfig};

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `logging.filter`
/// when `RUST_LOG` is unset or invalid.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = env_filter(config, std::env::var("RUST_LOG").ok().as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Same as [`init_tracing`] with the `logging` section of a loaded config.
pub fn init_from_config(config: &StoreConfig) -> bool {
    init_tracing(&config.logging)
}

fn env_filter(config: &LoggingConfig, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(&config.filter))
}
