//! Tracing bootstrap.

use boxoffice_types::{BoxofficeError, LogConfig, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber: `EnvFilter` from `config.filter`, compact
/// or JSON lines on stdout.
///
/// Returns `Ok(false)` if a global subscriber was already installed.
///
/// # Errors
/// Returns `Configuration` if the filter directive does not parse.
pub fn init_tracing(config: &LogConfig) -> Result<bool> {
    let filter = EnvFilter::try_new(&config.filter).map_err(|e| {
        BoxofficeError::Configuration(format!("invalid log filter {:?}: {e}", config.filter))
    })?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    Ok(installed.is_ok())
}
