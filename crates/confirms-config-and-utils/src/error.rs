//! Errors raised while loading or validating configuration.

use thiserror::Error;

/// Configuration and path error.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting has an unusable value
    #[error("invalid setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// Broker URI does not use amqp:// or amqps://
    #[error("unsupported broker URI scheme `{0}` (expected amqp or amqps)")]
    UnsupportedScheme(String),

    /// Reading or writing the config file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Broker URI could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Config file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Home directory could not be determined
    #[error("Path error: {0}")]
    Path(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
