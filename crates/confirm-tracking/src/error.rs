//! Confirm tracking error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a [`crate::ConfirmChannel`] implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The broker did not confirm outstanding publishes in time
    #[error("publishes were not confirmed within {timeout:?}")]
    ConfirmTimeout { timeout: Duration },

    /// The broker nack-ed one or more publishes covered by a wait
    #[error("{count} message(s) nack-ed by the broker")]
    Nacked { count: usize },

    /// Confirm mode was not enabled before waiting for confirms
    #[error("publisher confirms are not enabled on this channel")]
    ConfirmsNotEnabled,

    /// The channel is no longer usable
    #[error("channel closed")]
    Closed,

    /// Failure reported by the underlying client library
    #[error("transport failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wrap a client library error.
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }
}

/// Errors raised while tracking confirms or running a publishing strategy.
#[derive(Error, Debug)]
pub enum ConfirmError {
    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A sequence number was inserted twice
    #[error("sequence number {0} is already outstanding")]
    DuplicateSequence(u64),

    /// The outstanding set did not drain in time
    #[error("not all messages confirmed within {timeout:?} ({outstanding} still outstanding)")]
    DrainTimeout { timeout: Duration, outstanding: usize },

    /// Strategy parameters are unusable
    #[error("invalid strategy configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias using ConfirmError.
pub type ConfirmResult<T> = Result<T, ConfirmError>;

/// Result type alias using TransportError.
pub type TransportResult<T> = Result<T, TransportError>;
