//! Logging initialisation via tracing-subscriber.
//!
//! Logs always go to stderr so command output on stdout can be piped.

use crate::types::{AppError, Result};
use crate::utils::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `verbose` forces `debug`; otherwise `config.level` is used, which already
/// reflects `RAGCHAIN_LOG` when it is set. Accepts any `EnvFilter` directive,
/// e.g. `"info,ragchain::db=debug"`.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let directive = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_new(directive).map_err(|e| {
        AppError::Configuration(format!("invalid log level '{}': {}", directive, e))
    })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| AppError::Internal(format!("failed to set subscriber: {}", e)))
}
