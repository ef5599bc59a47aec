//! Broker connection used by every command.

use amqp_channel::{AmqpConfirmChannel, AmqpSession};
use anyhow::{Context, Result};
use confirm_tracking::simulated::{AckPolicy, SimulatedChannel};
use confirm_tracking::ConfirmChannel;
use confirms_config_and_utils::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Cumulative confirm interval of the in-process broker.
const SIMULATED_CONFIRM_EVERY: u64 = 10;

/// Quiet period after which the in-process broker confirms the trailing range.
const SIMULATED_IDLE_FLUSH: Duration = Duration::from_millis(5);

/// Where publishes go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerTarget {
    Amqp { uri: String, display_uri: String },
    Simulated { nacks: Vec<u64> },
}

impl BrokerTarget {
    pub fn from_config(config: &Config, simulate: bool, nacks: &[u64]) -> Self {
        if simulate {
            Self::Simulated {
                nacks: nacks.to_vec(),
            }
        } else {
            Self::Amqp {
                uri: config.amqp_uri.clone(),
                display_uri: config.redacted_amqp_uri(),
            }
        }
    }
}

/// An open connection plus one channel.
pub enum BrokerLink {
    Amqp {
        session: AmqpSession,
        channel: Arc<AmqpConfirmChannel>,
    },
    Simulated(Arc<SimulatedChannel>),
}

impl BrokerLink {
    pub async fn open(target: &BrokerTarget) -> Result<Self> {
        match target {
            BrokerTarget::Amqp { uri, display_uri } => {
                let session = AmqpSession::connect(uri)
                    .await
                    .with_context(|| format!("could not connect to {display_uri}"))?;
                let channel = session
                    .open_confirm_channel()
                    .await
                    .context("could not open a channel")?;
                info!(broker = %display_uri, "Broker link open");
                Ok(Self::Amqp {
                    session,
                    channel: Arc::new(channel),
                })
            }
            BrokerTarget::Simulated { nacks } => {
                debug!(nacks = nacks.len(), "Using in-process broker");
                Ok(Self::Simulated(Arc::new(SimulatedChannel::with_nacks(
                    AckPolicy::CumulativeEveryOrIdle {
                        every: SIMULATED_CONFIRM_EVERY,
                        idle: SIMULATED_IDLE_FLUSH,
                    },
                    nacks.iter().copied(),
                ))))
            }
        }
    }

    pub fn channel(&self) -> Arc<dyn ConfirmChannel> {
        match self {
            Self::Amqp { channel, .. } => channel.clone() as Arc<dyn ConfirmChannel>,
            Self::Simulated(channel) => channel.clone() as Arc<dyn ConfirmChannel>,
        }
    }

    /// Fresh auto-delete queue for a strategy run.
    pub async fn declare_ephemeral_queue(&self) -> Result<String> {
        match self {
            Self::Amqp { channel, .. } => Ok(channel.declare_ephemeral_queue().await?),
            Self::Simulated(_) => Ok("confirms-simulated".to_string()),
        }
    }

    pub async fn declare_durable_queue(&self, name: &str) -> Result<()> {
        if let Self::Amqp { channel, .. } = self {
            channel.declare_durable_queue(name).await?;
        }
        Ok(())
    }

    pub async fn declare_topic_exchange(&self, name: &str) -> Result<()> {
        if let Self::Amqp { channel, .. } = self {
            channel.declare_topic_exchange(name).await?;
        }
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        if let Self::Amqp { session, channel } = self {
            channel.close().await?;
            session.close().await?;
        }
        Ok(())
    }
}
