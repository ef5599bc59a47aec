//! Publisher confirm tracking for a message producer.
//!
//! A broker in confirm mode acknowledges published messages asynchronously,
//! possibly cumulatively ("this and everything before it"). This crate keeps
//! the correlation between the sequence number assigned at publish time and
//! the in-flight message, and offers three ways to publish a workload:
//!
//! ```text
//! ┌──────────────┐  insert   ┌────────────────┐  resolve  ┌──────────────────────┐
//! │  Publisher   │──────────▶│ OutstandingSet │◀──────────│ ConfirmationHandler  │
//! │    loop      │           └───────┬────────┘           │  (ConfirmListener)   │
//! └──────┬───────┘                   │ is_empty            └──────────▲───────────┘
//!        │ publish                   ▼                                │ ack / nack
//!        │                   ┌────────────────┐                       │
//!        └──────────────────▶│ ConfirmChannel │───────────────────────┘
//!                            └────────────────┘
//! ```
//!
//! This crate provides:
//! - OutstandingSet: ordered sequence -> descriptor map with prefix removal
//! - ConfirmationHandler: applies ack/nack events, reports nacks
//! - wait_until_empty: bounded polling drain
//! - ConfirmPublisher: individual, batched and asynchronous strategies
//! - SimulatedChannel: in-process broker for tests and broker-less runs

mod confirm;
mod drain;
mod error;
mod outstanding;
pub mod simulated;
mod strategy;
mod transport;

pub use confirm::{
    CollectingNackReporter, ConfirmEvent, ConfirmStats, ConfirmationHandler, LogNackReporter,
    NackReporter, NackedMessage,
};
pub use drain::{wait_until_empty, DEFAULT_POLL_INTERVAL};
pub use error::{ConfirmError, ConfirmResult, TransportError, TransportResult};
pub use outstanding::OutstandingSet;
pub use strategy::{
    group_thousands, ConfirmPublisher, PublishReport, PublishStrategy, PublishTarget,
    StrategyConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONFIRM_TIMEOUT, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_MESSAGE_COUNT,
};
pub use transport::{ConfirmChannel, ConfirmListener, PublishProperties};
