//! # Structured Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` wins when set; otherwise the
//! configured level applies to this crate and `tower_http` logs at debug.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::{LogFormat, LoggingConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// Directives used when `RUST_LOG` is absent
pub fn default_directives(level: &str) -> String {
    format!("auth_gateway={},tower_http=debug", level.to_lowercase())
}

fn env_filter(config: &LoggingConfig) -> GatewayResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directives(&config.level))
        .map_err(|e| GatewayError::config(format!("Invalid log level '{}': {}", config.level, e)))
}

/// Initialize the global subscriber; fails if one is already installed
pub fn init_logging(config: &LoggingConfig) -> GatewayResult<()> {
    let filter = env_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    result.map_err(|e| GatewayError::internal(format!("Failed to initialize logging: {}", e)))
}
