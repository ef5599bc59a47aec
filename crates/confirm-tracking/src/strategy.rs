//! Publishing strategies with different confirm handling.
//!
//! - [`PublishStrategy::Individual`]: wait for the confirm of every message
//!   before publishing the next one.
//! - [`PublishStrategy::Batched`]: wait once per batch. Still synchronous, and
//!   a failure cannot be attributed to a single message.
//! - [`PublishStrategy::Asynchronous`]: track every publish in an
//!   [`OutstandingSet`] and let the confirm listener drain it while
//!   publishing continues.

use crate::drain::{wait_until_empty, DEFAULT_POLL_INTERVAL};
use crate::{
    ConfirmChannel, ConfirmError, ConfirmResult, ConfirmationHandler, LogNackReporter,
    NackReporter, OutstandingSet, PublishProperties,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Messages published per run in the reference workload.
pub const DEFAULT_MESSAGE_COUNT: usize = 50_000;

/// Messages per confirm wait in the batched strategy.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Bound on each synchronous confirm wait.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on the final drain of the asynchronous strategy.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Which confirm handling to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    Individual,
    Batched,
    Asynchronous,
}

impl PublishStrategy {
    /// Every strategy, slowest first.
    pub const ALL: [PublishStrategy; 3] = [
        PublishStrategy::Individual,
        PublishStrategy::Batched,
        PublishStrategy::Asynchronous,
    ];

    /// Phrase used in the summary line.
    pub fn description(&self) -> &'static str {
        match self {
            PublishStrategy::Individual => "individually",
            PublishStrategy::Batched => "in batch",
            PublishStrategy::Asynchronous => "and handled confirms asynchronously",
        }
    }
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStrategy::Individual => "individual",
            PublishStrategy::Batched => "batched",
            PublishStrategy::Asynchronous => "asynchronous",
        };
        f.write_str(name)
    }
}

/// Workload and timing parameters shared by the strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Messages to publish.
    pub message_count: usize,
    /// Messages per confirm wait (batched strategy).
    pub batch_size: usize,
    /// Bound on each synchronous confirm wait.
    pub confirm_timeout: Duration,
    /// Bound on the final drain (asynchronous strategy).
    pub drain_timeout: Duration,
    /// Drain poll granularity.
    pub drain_poll_interval: Duration,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            message_count: DEFAULT_MESSAGE_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            drain_poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> ConfirmResult<()> {
        if self.batch_size == 0 {
            return Err(ConfirmError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        if self.drain_poll_interval.is_zero() {
            return Err(ConfirmError::InvalidConfig(
                "drain poll interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Where messages are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishTarget {
    pub exchange: String,
    pub routing_key: String,
    pub properties: PublishProperties,
}

impl PublishTarget {
    /// Publish straight to `queue` through the default exchange.
    pub fn queue(queue: impl Into<String>) -> Self {
        Self {
            exchange: String::new(),
            routing_key: queue.into(),
            properties: PublishProperties::default(),
        }
    }
}

/// Outcome of one strategy run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub strategy: PublishStrategy,
    pub message_count: usize,
    pub elapsed_ms: u64,
    /// Nack events seen (asynchronous strategy only).
    pub nacked: u64,
}

impl PublishReport {
    fn new(
        strategy: PublishStrategy,
        message_count: usize,
        elapsed: Duration,
        nacked: u64,
    ) -> Self {
        Self {
            strategy,
            message_count,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            nacked,
        }
    }

    /// e.g. `Published 50,000 messages in batch in 1,016 ms`
    pub fn summary_line(&self) -> String {
        format!(
            "Published {} messages {} in {} ms",
            group_thousands(self.message_count as u64),
            self.strategy.description(),
            group_thousands(self.elapsed_ms)
        )
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary_line())
    }
}

/// Format with `,` thousands separators.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Runs a fixed workload against one confirm channel.
pub struct ConfirmPublisher {
    channel: Arc<dyn ConfirmChannel>,
    target: PublishTarget,
    config: StrategyConfig,
}

impl ConfirmPublisher {
    pub fn new(
        channel: Arc<dyn ConfirmChannel>,
        target: PublishTarget,
        config: StrategyConfig,
    ) -> Self {
        Self {
            channel,
            target,
            config,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Run `strategy`, logging nacks.
    pub async fn run(&self, strategy: PublishStrategy) -> ConfirmResult<PublishReport> {
        match strategy {
            PublishStrategy::Individual => self.publish_individually().await,
            PublishStrategy::Batched => self.publish_in_batches().await,
            PublishStrategy::Asynchronous => {
                self.publish_asynchronously(Arc::new(LogNackReporter)).await
            }
        }
    }

    /// Publish, then block on the confirm, one message at a time.
    pub async fn publish_individually(&self) -> ConfirmResult<PublishReport> {
        self.config.validate()?;
        self.channel.enable_confirms().await?;
        info!(count = self.config.message_count, "Publishing messages individually");

        let started = Instant::now();
        for i in 0..self.config.message_count {
            self.publish_body(&i.to_string()).await?;
            self.wait_for_confirms(i + 1).await?;
        }

        let report = PublishReport::new(
            PublishStrategy::Individual,
            self.config.message_count,
            started.elapsed(),
            0,
        );
        info!(elapsed_ms = report.elapsed_ms, "Individual publishing finished");
        Ok(report)
    }

    /// Publish in batches of `batch_size`, blocking on confirms after each
    /// batch and once more for a trailing partial batch.
    pub async fn publish_in_batches(&self) -> ConfirmResult<PublishReport> {
        self.config.validate()?;
        self.channel.enable_confirms().await?;
        info!(
            count = self.config.message_count,
            batch_size = self.config.batch_size,
            "Publishing messages in batches"
        );

        let started = Instant::now();
        let mut unconfirmed = 0;
        for i in 0..self.config.message_count {
            self.publish_body(&i.to_string()).await?;
            unconfirmed += 1;

            if unconfirmed == self.config.batch_size {
                self.wait_for_confirms(i + 1).await?;
                unconfirmed = 0;
            }
        }
        if unconfirmed > 0 {
            self.wait_for_confirms(self.config.message_count).await?;
        }

        let report = PublishReport::new(
            PublishStrategy::Batched,
            self.config.message_count,
            started.elapsed(),
            0,
        );
        info!(elapsed_ms = report.elapsed_ms, "Batched publishing finished");
        Ok(report)
    }

    /// Publish without blocking on confirms; `reporter` sees every nack.
    ///
    /// Each message is recorded in the outstanding set before it is sent, so a
    /// confirm can never arrive for an unknown sequence number. Fails with
    /// [`ConfirmError::DrainTimeout`] if the set does not drain in time.
    pub async fn publish_asynchronously(
        &self,
        reporter: Arc<dyn NackReporter<String>>,
    ) -> ConfirmResult<PublishReport> {
        self.config.validate()?;

        let outstanding = Arc::new(OutstandingSet::new());
        let handler = Arc::new(ConfirmationHandler::new(outstanding.clone(), reporter));
        self.channel.enable_confirms().await?;
        self.channel.register_confirm_listener(handler.clone());
        info!(
            count = self.config.message_count,
            "Publishing messages with asynchronous confirms"
        );

        let started = Instant::now();
        for i in 0..self.config.message_count {
            let body = i.to_string();
            let sequence = self.channel.next_sequence_number();
            outstanding.insert(sequence, body.clone())?;
            self.publish_body(&body).await?;
        }

        let drained = wait_until_empty(
            &outstanding,
            self.config.drain_timeout,
            self.config.drain_poll_interval,
        )
        .await;
        if !drained {
            let remaining = outstanding.len();
            error!(
                outstanding = remaining,
                first = ?outstanding.first_outstanding(),
                timeout_ms = self.config.drain_timeout.as_millis() as u64,
                "Messages not confirmed in time"
            );
            return Err(ConfirmError::DrainTimeout {
                timeout: self.config.drain_timeout,
                outstanding: remaining,
            });
        }

        let stats = handler.stats();
        let report = PublishReport::new(
            PublishStrategy::Asynchronous,
            self.config.message_count,
            started.elapsed(),
            stats.nacks,
        );
        info!(
            elapsed_ms = report.elapsed_ms,
            acks = stats.acks,
            nacks = stats.nacks,
            "Asynchronous publishing finished"
        );
        Ok(report)
    }

    async fn publish_body(&self, body: &str) -> ConfirmResult<()> {
        self.channel
            .publish(
                &self.target.exchange,
                &self.target.routing_key,
                &self.target.properties,
                body.as_bytes(),
            )
            .await?;
        Ok(())
    }

    async fn wait_for_confirms(&self, published: usize) -> ConfirmResult<()> {
        if let Err(e) = self.channel.wait_for_confirms(self.config.confirm_timeout).await {
            error!(published, error = %e, "Confirm wait failed");
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{AckPolicy, SimulatedChannel};
    use crate::{CollectingNackReporter, TransportError};

    fn small_config(message_count: usize) -> StrategyConfig {
        StrategyConfig {
            message_count,
            batch_size: 100,
            confirm_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(5),
            drain_poll_interval: Duration::from_millis(5),
        }
    }

    fn publisher(channel: Arc<SimulatedChannel>, config: StrategyConfig) -> ConfirmPublisher {
        ConfirmPublisher::new(channel, PublishTarget::queue("confirms-test"), config)
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_016), "1,016");
        assert_eq!(group_thousands(50_000), "50,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_summary_lines() {
        let individual = PublishReport::new(
            PublishStrategy::Individual,
            50_000,
            Duration::from_millis(7_172),
            0,
        );
        assert_eq!(
            individual.summary_line(),
            "Published 50,000 messages individually in 7,172 ms"
        );

        let batched =
            PublishReport::new(PublishStrategy::Batched, 50_000, Duration::from_millis(1_016), 0);
        assert_eq!(
            batched.summary_line(),
            "Published 50,000 messages in batch in 1,016 ms"
        );

        let asynchronous = PublishReport::new(
            PublishStrategy::Asynchronous,
            50_000,
            Duration::from_millis(636),
            0,
        );
        assert_eq!(
            asynchronous.to_string(),
            "Published 50,000 messages and handled confirms asynchronously in 636 ms"
        );
    }

    #[test]
    fn test_report_serializes_strategy_in_snake_case() {
        let report =
            PublishReport::new(PublishStrategy::Asynchronous, 10, Duration::from_millis(3), 1);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "asynchronous");
        assert_eq!(json["elapsed_ms"], 3);
        assert_eq!(json["nacked"], 1);
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = StrategyConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfirmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_config() {
        let config = StrategyConfig::default();
        assert_eq!(config.message_count, 50_000);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.confirm_timeout, Duration::from_secs(5));
        assert_eq!(config.drain_timeout, Duration::from_secs(60));
        assert_eq!(config.drain_poll_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_individual_waits_after_every_message() {
        let channel = Arc::new(SimulatedChannel::new(AckPolicy::CumulativeEvery(10)));
        let report = publisher(channel.clone(), small_config(5))
            .publish_individually()
            .await
            .unwrap();

        assert_eq!(report.message_count, 5);
        assert_eq!(channel.wait_points(), vec![1, 2, 3, 4, 5]);
        let bodies: Vec<Vec<u8>> = channel.published().into_iter().map(|m| m.body).collect();
        let expected: Vec<Vec<u8>> = (0..5).map(|i: u32| i.to_string().into_bytes()).collect();
        assert_eq!(bodies, expected);
    }

    #[tokio::test]
    async fn test_batched_waits_per_batch_and_remainder() {
        let channel = Arc::new(SimulatedChannel::new(AckPolicy::CumulativeEvery(10)));
        publisher(channel.clone(), small_config(250))
            .publish_in_batches()
            .await
            .unwrap();

        assert_eq!(channel.wait_points(), vec![100, 200, 250]);
    }

    #[tokio::test]
    async fn test_batched_exact_multiple_has_no_trailing_wait() {
        let channel = Arc::new(SimulatedChannel::new(AckPolicy::Individual));
        publisher(channel.clone(), small_config(200))
            .publish_in_batches()
            .await
            .unwrap();

        assert_eq!(channel.wait_points(), vec![100, 200]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_individual_timeout_is_fatal() {
        let channel = Arc::new(SimulatedChannel::new(AckPolicy::Never));
        let err = publisher(channel.clone(), small_config(3))
            .publish_individually()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConfirmError::Transport(TransportError::ConfirmTimeout { .. })
        ));
        // Nothing after the first unconfirmed message was sent
        assert_eq!(channel.published_count(), 1);
    }

    #[tokio::test]
    async fn test_batched_nack_is_fatal() {
        let channel = Arc::new(SimulatedChannel::with_nacks(AckPolicy::Individual, [150]));
        let err = publisher(channel.clone(), small_config(250))
            .publish_in_batches()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConfirmError::Transport(TransportError::Nacked { count: 1 })
        ));
        assert_eq!(channel.published_count(), 200);
    }

    #[tokio::test]
    async fn test_asynchronous_drains_with_cumulative_confirms() {
        let channel = Arc::new(SimulatedChannel::new(AckPolicy::CumulativeEvery(10)));
        let report = publisher(channel.clone(), small_config(1_000))
            .run(PublishStrategy::Asynchronous)
            .await
            .unwrap();

        assert_eq!(report.strategy, PublishStrategy::Asynchronous);
        assert_eq!(report.nacked, 0);
        assert_eq!(channel.published_count(), 1_000);
        assert!(channel.wait_points().is_empty());
    }

    #[tokio::test]
    async fn test_asynchronous_reports_nacks_and_still_drains() {
        let channel = Arc::new(SimulatedChannel::with_nacks(
            AckPolicy::CumulativeEvery(10),
            [15],
        ));
        let reporter = Arc::new(CollectingNackReporter::new());
        let report = publisher(channel, small_config(100))
            .publish_asynchronously(reporter.clone())
            .await
            .unwrap();

        assert_eq!(report.nacked, 1);
        let nacked = reporter.take();
        assert_eq!(nacked.len(), 1);
        assert_eq!(nacked[0].sequence, 20);
        assert!(nacked[0].multiple);
        // Sequence 20 carries body "19"
        assert_eq!(nacked[0].descriptor.as_deref(), Some("19"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_asynchronous_drain_timeout_carries_outstanding_count() {
        let channel = Arc::new(SimulatedChannel::new(AckPolicy::CumulativeEvery(10)));
        let err = publisher(channel, small_config(25))
            .publish_asynchronously(Arc::new(LogNackReporter))
            .await
            .unwrap_err();

        match err {
            ConfirmError::DrainTimeout {
                timeout,
                outstanding,
            } => {
                assert_eq!(timeout, Duration::from_secs(5));
                assert_eq!(outstanding, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
