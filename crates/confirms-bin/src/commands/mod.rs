//! Subcommand implementations.

mod broker;
mod confirms;
mod task;
mod topic;

pub use broker::{BrokerLink, BrokerTarget};
pub use confirms::run_strategies;
pub use task::send_task;
pub use topic::emit_topic;
