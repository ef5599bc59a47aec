//! AMQP session errors.

use confirm_tracking::TransportError;
use thiserror::Error;

/// Errors raised while setting up broker resources.
#[derive(Error, Debug)]
pub enum AmqpError {
    #[error("failed to connect to the broker: {0}")]
    Connect(#[source] lapin::Error),

    #[error("failed to open a channel: {0}")]
    Channel(#[source] lapin::Error),

    #[error("failed to declare {kind} `{name}`: {source}")]
    Declare {
        kind: &'static str,
        name: String,
        #[source]
        source: lapin::Error,
    },

    #[error("failed to close {what}: {source}")]
    Close {
        what: &'static str,
        #[source]
        source: lapin::Error,
    },
}

impl From<AmqpError> for TransportError {
    fn from(error: AmqpError) -> Self {
        TransportError::backend(error)
    }
}

/// Result type alias using AmqpError.
pub type AmqpResult<T> = Result<T, AmqpError>;
