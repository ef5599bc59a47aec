//! Command-line overrides layered on top of the loaded config.

use clap::Args;
use confirms_config_and_utils::Config;

/// Flags shared by every subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Broker URI
    #[arg(long, global = true)]
    pub amqp_uri: Option<String>,

    /// Messages per strategy run
    #[arg(short = 'n', long, global = true)]
    pub count: Option<usize>,

    /// Messages per confirm wait in batch mode
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,

    /// Timeout for each synchronous confirm wait, in milliseconds
    #[arg(long, global = true)]
    pub confirm_timeout_ms: Option<u64>,

    /// Timeout for the asynchronous drain, in milliseconds
    #[arg(long, global = true)]
    pub drain_timeout_ms: Option<u64>,

    /// Use an in-process broker instead of connecting
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Sequence number the in-process broker nacks (repeatable)
    #[arg(long = "simulate-nack", global = true, requires = "simulate")]
    pub simulate_nacks: Vec<u64>,
}

impl RunArgs {
    /// Apply the flags that were given; the rest keep their loaded values.
    pub fn apply(&self, config: &mut Config) {
        if let Some(uri) = &self.amqp_uri {
            config.amqp_uri = uri.clone();
        }
        if let Some(count) = self.count {
            config.message_count = count;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(timeout) = self.confirm_timeout_ms {
            config.confirm_timeout_ms = timeout;
        }
        if let Some(timeout) = self.drain_timeout_ms {
            config.drain_timeout_ms = timeout;
        }
    }
}
