//! In-process confirm channel.
//!
//! Runs a small broker task that confirms publishes according to an
//! [`AckPolicy`]. Used by the tests and by `--simulate` runs that have no
//! broker available.

use crate::{
    ConfirmChannel, ConfirmListener, PublishProperties, TransportError, TransportResult,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, trace};

/// How the simulated broker confirms publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckPolicy {
    /// One non-cumulative confirm per publish.
    Individual,
    /// A cumulative confirm on every n-th sequence number, nothing in between.
    CumulativeEvery(u64),
    /// Like `CumulativeEvery`, plus a cumulative confirm for the trailing
    /// range once no publish has arrived for `idle`.
    CumulativeEveryOrIdle { every: u64, idle: Duration },
    /// Never confirm.
    Never,
}

/// A message accepted by the simulated channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub sequence: u64,
    pub exchange: String,
    pub routing_key: String,
    pub properties: PublishProperties,
    pub body: Vec<u8>,
}

enum BrokerCommand {
    Published(u64),
    Flush,
}

type SharedListener = Arc<Mutex<Option<Arc<dyn ConfirmListener>>>>;

/// Confirm channel backed by an in-process broker task.
///
/// Must be created inside a tokio runtime.
pub struct SimulatedChannel {
    confirms_enabled: AtomicBool,
    next_sequence: AtomicU64,
    listener: SharedListener,
    commands: mpsc::UnboundedSender<BrokerCommand>,
    confirmed: watch::Receiver<u64>,
    nacked_since_wait: Arc<AtomicUsize>,
    wait_points: Mutex<Vec<u64>>,
    published: Mutex<Vec<PublishedMessage>>,
}

impl SimulatedChannel {
    pub fn new(policy: AckPolicy) -> Self {
        Self::with_nacks(policy, std::iter::empty())
    }

    /// Channel whose broker nacks the given sequence numbers.
    ///
    /// With [`AckPolicy::CumulativeEvery`] a nacked number turns the whole
    /// cumulative confirm that covers it into a cumulative nack.
    pub fn with_nacks(policy: AckPolicy, nacks: impl IntoIterator<Item = u64>) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (confirmed_tx, confirmed) = watch::channel(0);
        let listener: SharedListener = Arc::new(Mutex::new(None));
        let nacked_since_wait = Arc::new(AtomicUsize::new(0));

        let broker = SimulatedBroker {
            policy,
            nacks: nacks.into_iter().collect(),
            listener: listener.clone(),
            confirmed: confirmed_tx,
            nacked_since_wait: nacked_since_wait.clone(),
            last_published: 0,
            last_confirmed: 0,
        };
        tokio::spawn(broker.run(receiver));

        Self {
            confirms_enabled: AtomicBool::new(false),
            next_sequence: AtomicU64::new(1),
            listener,
            commands,
            confirmed,
            nacked_since_wait,
            wait_points: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Number of messages published so far at each `wait_for_confirms` call.
    pub fn wait_points(&self) -> Vec<u64> {
        self.wait_points.lock().clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }

    /// Highest sequence number the broker has confirmed.
    pub fn confirmed_watermark(&self) -> u64 {
        *self.confirmed.borrow()
    }
}

#[async_trait]
impl ConfirmChannel for SimulatedChannel {
    async fn enable_confirms(&self) -> TransportResult<()> {
        self.confirms_enabled.store(true, Ordering::SeqCst);
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
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        self.published.lock().push(PublishedMessage {
            sequence,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties: properties.clone(),
            body: body.to_vec(),
        });

        if self.confirms_enabled.load(Ordering::SeqCst) {
            self.commands
                .send(BrokerCommand::Published(sequence))
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
        self.wait_points.lock().push(target);
        if target == 0 {
            return Ok(());
        }

        self.commands
            .send(BrokerCommand::Flush)
            .map_err(|_| TransportError::Closed)?;

        let mut confirmed = self.confirmed.clone();
        let reached = tokio::time::timeout(timeout, async {
            confirmed.wait_for(|seq| *seq >= target).await.is_ok()
        })
        .await;
        match reached {
            Ok(true) => {}
            Ok(false) => return Err(TransportError::Closed),
            Err(_) => return Err(TransportError::ConfirmTimeout { timeout }),
        }

        let count = self.nacked_since_wait.swap(0, Ordering::SeqCst);
        if count > 0 {
            return Err(TransportError::Nacked { count });
        }
        Ok(())
    }
}

struct SimulatedBroker {
    policy: AckPolicy,
    nacks: BTreeSet<u64>,
    listener: SharedListener,
    confirmed: watch::Sender<u64>,
    nacked_since_wait: Arc<AtomicUsize>,
    last_published: u64,
    last_confirmed: u64,
}

impl SimulatedBroker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<BrokerCommand>) {
        loop {
            let idle = match self.policy {
                AckPolicy::CumulativeEveryOrIdle { idle, .. }
                    if self.last_published > self.last_confirmed =>
                {
                    Some(idle)
                }
                _ => None,
            };

            let command = match idle {
                Some(idle) => tokio::select! {
                    command = commands.recv() => command,
                    _ = tokio::time::sleep(idle) => {
                        self.flush();
                        continue;
                    }
                },
                None => commands.recv().await,
            };
            let Some(command) = command else {
                break;
            };

            match command {
                BrokerCommand::Published(sequence) => {
                    self.last_published = sequence;
                    match self.policy {
                        AckPolicy::Individual => self.confirm(sequence, false),
                        AckPolicy::CumulativeEvery(n)
                        | AckPolicy::CumulativeEveryOrIdle { every: n, .. }
                            if n > 0 && sequence % n == 0 =>
                        {
                            self.confirm(sequence, true)
                        }
                        _ => {}
                    }
                }
                BrokerCommand::Flush => self.flush(),
            }
        }
        debug!("Simulated broker stopped");
    }

    /// Confirm everything published but not yet confirmed.
    fn flush(&mut self) {
        if self.policy != AckPolicy::Never && self.last_published > self.last_confirmed {
            self.confirm(self.last_published, true);
        }
    }

    fn confirm(&mut self, sequence: u64, multiple: bool) {
        let positive = if multiple {
            self.nacks
                .range(self.last_confirmed + 1..=sequence)
                .next()
                .is_none()
        } else {
            !self.nacks.contains(&sequence)
        };

        if !positive {
            self.nacked_since_wait.fetch_add(1, Ordering::SeqCst);
        }

        let listener = self.listener.lock().clone();
        if let Some(listener) = listener {
            if positive {
                listener.on_ack(sequence, multiple);
            } else {
                listener.on_nack(sequence, multiple);
            }
        }

        trace!(sequence, multiple, positive, "Simulated confirm");
        self.last_confirmed = sequence;
        self.confirmed.send_replace(sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<(u64, bool, bool)>>,
    }

    impl ConfirmListener for RecordingListener {
        fn on_ack(&self, sequence: u64, multiple: bool) {
            self.events.lock().push((sequence, multiple, true));
        }

        fn on_nack(&self, sequence: u64, multiple: bool) {
            self.events.lock().push((sequence, multiple, false));
        }
    }

    async fn publish_n(channel: &SimulatedChannel, count: u64) {
        for i in 0..count {
            channel
                .publish("", "queue", &PublishProperties::default(), i.to_string().as_bytes())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_sequence_numbers_start_at_one() {
        let channel = SimulatedChannel::new(AckPolicy::Individual);
        channel.enable_confirms().await.unwrap();

        assert_eq!(channel.next_sequence_number(), 1);
        publish_n(&channel, 3).await;
        assert_eq!(channel.next_sequence_number(), 4);

        let sequences: Vec<u64> = channel.published().iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_cumulative_policy_confirms_every_nth() {
        let channel = SimulatedChannel::new(AckPolicy::CumulativeEvery(10));
        let listener = Arc::new(RecordingListener::default());
        channel.register_confirm_listener(listener.clone());
        channel.enable_confirms().await.unwrap();

        publish_n(&channel, 25).await;
        channel.wait_for_confirms(Duration::from_secs(5)).await.unwrap();

        let events = listener.events.lock().clone();
        assert_eq!(events, vec![(10, true, true), (20, true, true), (25, true, true)]);
        assert_eq!(channel.confirmed_watermark(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_policy_confirms_trailing_range() {
        let channel = SimulatedChannel::new(AckPolicy::CumulativeEveryOrIdle {
            every: 10,
            idle: Duration::from_millis(5),
        });
        let listener = Arc::new(RecordingListener::default());
        channel.register_confirm_listener(listener.clone());
        channel.enable_confirms().await.unwrap();

        publish_n(&channel, 25).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let events = listener.events.lock().clone();
        assert_eq!(events, vec![(10, true, true), (20, true, true), (25, true, true)]);
        assert_eq!(channel.confirmed_watermark(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_cumulative_policy_leaves_tail_unconfirmed() {
        let channel = SimulatedChannel::new(AckPolicy::CumulativeEvery(10));
        channel.enable_confirms().await.unwrap();

        publish_n(&channel, 25).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(channel.confirmed_watermark(), 20);
    }

    #[tokio::test]
    async fn test_wait_reports_nacks() {
        let channel = SimulatedChannel::with_nacks(AckPolicy::Individual, [2]);
        channel.enable_confirms().await.unwrap();

        publish_n(&channel, 3).await;
        let err = channel
            .wait_for_confirms(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Nacked { count: 1 }));

        // The nack was consumed by the failed wait
        publish_n(&channel, 1).await;
        channel.wait_for_confirms(Duration::from_secs(5)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_policy_times_out() {
        let channel = SimulatedChannel::new(AckPolicy::Never);
        channel.enable_confirms().await.unwrap();
        publish_n(&channel, 1).await;

        let err = channel
            .wait_for_confirms(Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConfirmTimeout { .. }));
    }

    #[tokio::test]
    async fn test_wait_requires_confirm_mode() {
        let channel = SimulatedChannel::new(AckPolicy::Individual);
        let err = channel
            .wait_for_confirms(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConfirmsNotEnabled));
    }
}
