//! Tracing subscriber setup

use forma_core::{FormaError, FormaResult};
use tracing_subscriber::EnvFilter;

use crate::LogConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Fails if a global subscriber
/// is already installed.
pub fn init_tracing(config: &LogConfig) -> FormaResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| FormaError::Config(format!("log level {:?}: {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| FormaError::Config(e.to_string()))
}
