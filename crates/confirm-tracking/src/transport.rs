//! Channel abstraction the publishing strategies run against.

use crate::TransportResult;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Per-message publish properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    /// Ask the broker to persist the message.
    pub persistent: bool,
    /// MIME content type, if any.
    pub content_type: Option<String>,
}

impl PublishProperties {
    /// Persistent `text/plain` message, used for durable work queues.
    pub fn persistent_text() -> Self {
        Self {
            persistent: true,
            content_type: Some("text/plain".to_string()),
        }
    }
}

/// Receives broker confirms for a channel.
///
/// Called from the transport's delivery path, never from the publishing loop.
/// `multiple` means every earlier unresolved sequence number is settled the
/// same way.
pub trait ConfirmListener: Send + Sync {
    /// The broker took responsibility for the message(s).
    fn on_ack(&self, sequence: u64, multiple: bool);

    /// The broker could not take responsibility for the message(s).
    fn on_nack(&self, sequence: u64, multiple: bool);
}

/// A broker channel with publisher confirms.
///
/// Confirms for one channel are delivered in non-decreasing sequence order,
/// and never before the publish carrying that sequence number was issued.
/// A channel is driven by a single publisher.
#[async_trait]
pub trait ConfirmChannel: Send + Sync {
    /// Put the channel into confirm mode.
    async fn enable_confirms(&self) -> TransportResult<()>;

    /// Sequence number the next `publish` call will carry.
    fn next_sequence_number(&self) -> u64;

    /// Submit one message.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        body: &[u8],
    ) -> TransportResult<()>;

    /// Install the listener that receives acks and nacks.
    fn register_confirm_listener(&self, listener: Arc<dyn ConfirmListener>);

    /// Block until everything published so far is confirmed.
    ///
    /// Fails with `ConfirmTimeout` when `timeout` elapses first and with
    /// `Nacked` when any covered publish was nack-ed.
    async fn wait_for_confirms(&self, timeout: Duration) -> TransportResult<()>;
}
