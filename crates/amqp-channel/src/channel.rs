//! [`ConfirmChannel`] over a lapin channel.

use crate::{AmqpError, AmqpResult};
use async_trait::async_trait;
use confirm_tracking::{
    ConfirmChannel, ConfirmListener, PublishProperties, TransportError, TransportResult,
};
use lapin::options::{
    BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::{Confirmation, PublisherConfirm};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, ExchangeKind};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};
use uuid::Uuid;

const PERSISTENT_DELIVERY_MODE: u8 = 2;

type SharedListener = Arc<Mutex<Option<Arc<dyn ConfirmListener>>>>;

/// Confirms seen by the forwarder: the highest processed sequence number and
/// the nacks not yet reported by a wait.
struct ConfirmTracker {
    processed: watch::Sender<u64>,
    nacked_since_wait: AtomicUsize,
}

impl ConfirmTracker {
    fn new() -> Self {
        let (processed, _) = watch::channel(0);
        Self {
            processed,
            nacked_since_wait: AtomicUsize::new(0),
        }
    }

    /// Classify a confirm, counting nacks.
    fn outcome(&self, result: lapin::Result<Confirmation>) -> Option<bool> {
        let outcome = confirm_outcome(result);
        if outcome == Some(false) {
            self.nacked_since_wait.fetch_add(1, Ordering::SeqCst);
        }
        outcome
    }

    fn mark_processed(&self, sequence: u64) {
        self.processed.send_replace(sequence);
    }

    /// Wait until every sequence number up to `target` has been processed.
    async fn processed_up_to(&self, target: u64) -> bool {
        let mut processed = self.processed.subscribe();
        let ok = processed.wait_for(|seq| *seq >= target).await.is_ok();
        ok
    }

    fn take_nacks(&self) -> usize {
        self.nacked_since_wait.swap(0, Ordering::SeqCst)
    }
}

/// A lapin channel tracked for publisher confirms.
///
/// Sequence numbers mirror the delivery tags the broker assigns on a
/// confirm-mode channel: the first publish after `confirm.select` is 1.
pub struct AmqpConfirmChannel {
    channel: Channel,
    confirms_enabled: AtomicBool,
    next_sequence: AtomicU64,
    listener: SharedListener,
    // Serializes tag assignment with the publish frame
    publish_lock: tokio::sync::Mutex<()>,
    pending: mpsc::UnboundedSender<(u64, PublisherConfirm)>,
    tracker: Arc<ConfirmTracker>,
}

impl AmqpConfirmChannel {
    pub(crate) fn new(channel: Channel) -> Self {
        let (pending, receiver) = mpsc::unbounded_channel();
        let listener: SharedListener = Arc::new(Mutex::new(None));
        let tracker = Arc::new(ConfirmTracker::new());
        tokio::spawn(forward_confirms(receiver, listener.clone(), tracker.clone()));

        Self {
            channel,
            confirms_enabled: AtomicBool::new(false),
            next_sequence: AtomicU64::new(1),
            listener,
            publish_lock: tokio::sync::Mutex::new(()),
            pending,
            tracker,
        }
    }

    /// Declare a uniquely named, non-durable, auto-delete queue.
    pub async fn declare_ephemeral_queue(&self) -> AmqpResult<String> {
        let name = format!("confirms-{}", Uuid::new_v4());
        let options = QueueDeclareOptions {
            durable: false,
            exclusive: false,
            auto_delete: true,
            ..Default::default()
        };
        self.declare_queue(&name, options).await?;
        Ok(name)
    }

    /// Declare a durable queue that survives broker restarts.
    pub async fn declare_durable_queue(&self, name: &str) -> AmqpResult<()> {
        let options = QueueDeclareOptions {
            durable: true,
            ..Default::default()
        };
        self.declare_queue(name, options).await
    }

    async fn declare_queue(&self, name: &str, options: QueueDeclareOptions) -> AmqpResult<()> {
        let durable = options.durable;
        self.channel
            .queue_declare(name, options, FieldTable::default())
            .await
            .map_err(|source| AmqpError::Declare {
                kind: "queue",
                name: name.to_string(),
                source,
            })?;
        debug!(queue = name, durable, "Queue declared");
        Ok(())
    }

    /// Declare a topic exchange.
    pub async fn declare_topic_exchange(&self, name: &str) -> AmqpResult<()> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| AmqpError::Declare {
                kind: "exchange",
                name: name.to_string(),
                source,
            })?;
        debug!(exchange = name, "Exchange declared");
        Ok(())
    }

    pub async fn close(&self) -> AmqpResult<()> {
        self.channel
            .close(200, "OK")
            .await
            .map_err(|source| AmqpError::Close {
                what: "channel",
                source,
            })
    }
}

#[async_trait]
impl ConfirmChannel for AmqpConfirmChannel {
    async fn enable_confirms(&self) -> TransportResult<()> {
        self.channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(TransportError::backend)?;
        self.confirms_enabled.store(true, Ordering::SeqCst);
        debug!(channel_id = self.channel.id(), "Publisher confirms enabled");
        Ok(())
    }

    fn next_sequence_number(&self) -> u64 {
        self.next_sequence.load(Ordering::SeqCst)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        body: &[u8],
    ) -> TransportResult<()> {
        let _guard = self.publish_lock.lock().await;

        let confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                basic_properties(properties),
            )
            .await
            .map_err(TransportError::backend)?;

        if self.confirms_enabled.load(Ordering::SeqCst) {
            let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
            self.pending
                .send((sequence, confirm))
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    fn register_confirm_listener(&self, listener: Arc<dyn ConfirmListener>) {
        *self.listener.lock() = Some(listener);
    }

    async fn wait_for_confirms(&self, timeout: Duration) -> TransportResult<()> {
        if !self.confirms_enabled.load(Ordering::SeqCst) {
            return Err(TransportError::ConfirmsNotEnabled);
        }

        let target = self.next_sequence.load(Ordering::SeqCst) - 1;
        if target > 0 {
            let reached = tokio::time::timeout(timeout, self.tracker.processed_up_to(target))
                .await
                .map_err(|_| TransportError::ConfirmTimeout { timeout })?;
            if !reached {
                return Err(TransportError::Closed);
            }
        }

        // Returned messages only show up here for unroutable mandatory publishes
        let returned = self
            .channel
            .wait_for_confirms()
            .await
            .map_err(TransportError::backend)?;

        let count = self.tracker.take_nacks() + returned.len();
        if count > 0 {
            return Err(TransportError::Nacked { count });
        }
        Ok(())
    }
}

/// Await each publish's confirm in publish order and hand it to the listener.
async fn forward_confirms(
    mut pending: mpsc::UnboundedReceiver<(u64, PublisherConfirm)>,
    listener: SharedListener,
    tracker: Arc<ConfirmTracker>,
) {
    while let Some((sequence, confirm)) = pending.recv().await {
        if let Some(positive) = tracker.outcome(confirm.await) {
            let listener = listener.lock().clone();
            if let Some(listener) = listener {
                if positive {
                    listener.on_ack(sequence, false);
                } else {
                    listener.on_nack(sequence, false);
                }
            }
        }
        tracker.mark_processed(sequence);
    }
    debug!("Confirm forwarder stopped");
}

/// `Some(true)` for an ack, `Some(false)` for a nack or a failed confirm,
/// `None` when the channel was not in confirm mode.
fn confirm_outcome(result: lapin::Result<Confirmation>) -> Option<bool> {
    match result {
        Ok(Confirmation::Ack(_)) => Some(true),
        Ok(Confirmation::Nack(_)) => Some(false),
        Ok(Confirmation::NotRequested) => None,
        Err(error) => {
            warn!(%error, "Confirm failed, treating as nack");
            Some(false)
        }
    }
}

fn basic_properties(properties: &PublishProperties) -> BasicProperties {
    let mut props = BasicProperties::default();
    if properties.persistent {
        props = props.with_delivery_mode(PERSISTENT_DELIVERY_MODE);
    }
    if let Some(content_type) = &properties.content_type {
        props = props.with_content_type(content_type.as_str().into());
    }
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistent_text_properties() {
        let props = basic_properties(&PublishProperties::persistent_text());
        assert_eq!(*props.delivery_mode(), Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(
            props.content_type().as_ref().map(|ct| ct.as_str()),
            Some("text/plain")
        );
    }

    #[test]
    fn test_default_properties_are_empty() {
        let props = basic_properties(&PublishProperties::default());
        assert!(props.delivery_mode().is_none());
        assert!(props.content_type().is_none());
    }

    #[test]
    fn test_confirm_outcome() {
        assert_eq!(confirm_outcome(Ok(Confirmation::Ack(None))), Some(true));
        assert_eq!(confirm_outcome(Ok(Confirmation::Nack(None))), Some(false));
        assert_eq!(confirm_outcome(Ok(Confirmation::NotRequested)), None);
    }

    #[test]
    fn test_tracker_counts_nacks_until_taken() {
        let tracker = ConfirmTracker::new();

        assert_eq!(tracker.outcome(Ok(Confirmation::Ack(None))), Some(true));
        assert_eq!(tracker.outcome(Ok(Confirmation::Nack(None))), Some(false));
        assert_eq!(tracker.outcome(Ok(Confirmation::NotRequested)), None);
        assert_eq!(tracker.outcome(Ok(Confirmation::Nack(None))), Some(false));

        assert_eq!(tracker.take_nacks(), 2);
        assert_eq!(tracker.take_nacks(), 0);
    }

    #[tokio::test]
    async fn test_tracker_waits_for_processed_watermark() {
        let tracker = Arc::new(ConfirmTracker::new());
        tracker.mark_processed(3);
        assert!(tracker.processed_up_to(3).await);

        let pending = tokio::time::timeout(Duration::from_millis(20), tracker.processed_up_to(5));
        assert!(pending.await.is_err());

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.processed_up_to(5).await })
        };
        tracker.mark_processed(4);
        tracker.mark_processed(5);
        assert!(waiter.await.unwrap());
    }
}
