//! Publisher confirm strategy runs.

use super::{BrokerLink, BrokerTarget};
use crate::output::{self, OutputFormat};
use anyhow::{Context, Result};
use confirm_tracking::{
    ConfirmPublisher, PublishReport, PublishStrategy, PublishTarget, StrategyConfig,
};
use tracing::info;

/// Run each strategy on its own connection and print one report per run.
pub async fn run_strategies(
    strategies: &[PublishStrategy],
    config: &StrategyConfig,
    target: &BrokerTarget,
    format: OutputFormat,
) -> Result<()> {
    for &strategy in strategies {
        let report = run_strategy(strategy, config.clone(), target)
            .await
            .with_context(|| format!("{strategy} publishing failed"))?;
        output::print(&report, format);
    }
    Ok(())
}

async fn run_strategy(
    strategy: PublishStrategy,
    config: StrategyConfig,
    target: &BrokerTarget,
) -> Result<PublishReport> {
    let link = BrokerLink::open(target).await?;
    let queue = link.declare_ephemeral_queue().await?;
    info!(%strategy, queue = %queue, "Starting run");

    let publisher = ConfirmPublisher::new(link.channel(), PublishTarget::queue(queue), config);
    let result = publisher.run(strategy).await;

    // Close even when the run failed; the run's error wins
    let closed = link.close().await;
    let report = result?;
    closed?;
    Ok(report)
}
