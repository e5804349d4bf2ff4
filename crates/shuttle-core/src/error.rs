//! Error types for the shuttle core

use thiserror::Error;

/// Result type alias for shuttle operations
pub type ShuttleResult<T> = Result<T, ShuttleError>;

/// Errors raised by the shuttle core and by collaborators plugged into it
#[derive(Error, Debug)]
pub enum ShuttleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Route file {path}: {source}")]
    RouteIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Route document is not valid JSON: {0}")]
    RouteParse(#[from] serde_json::Error),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Capture input closed")]
    CaptureClosed,
}
