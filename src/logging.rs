//! Log output for applications embedding the client.
//!
//! The library itself only emits `tracing` events; nothing is printed until
//! a subscriber is installed, either by the application or through [`init`].

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "starter_kit=info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{0}': {1}")]
    InvalidFilter(String, tracing_subscriber::filter::ParseError),

    #[error("A global log subscriber is already installed")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Installs a formatted subscriber as the global default.
///
/// `filter` takes precedence over `RUST_LOG`; with neither set, the client's
/// own info-level events are shown. Pass [`ClientConfig::log_filter`](crate::ClientConfig::log_filter)
/// to honour the configuration.
pub fn init(filter: Option<&str>) -> Result<(), LoggingError> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| LoggingError::InvalidFilter(directives.to_string(), e))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_rejected() {
        let err = init(Some("starter_kit=loudest")).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidFilter(..)));
        assert!(err.to_string().contains("starter_kit=loudest"));
    }

    #[test]
    fn test_second_init_fails() {
        init(Some("starter_kit=debug")).unwrap();
        let err = init(None).unwrap_err();
        assert!(matches!(err, LoggingError::AlreadyInitialized(_)));
    }
}
