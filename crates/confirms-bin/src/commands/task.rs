//! Work queue one-shot publisher.

use super::{BrokerLink, BrokerTarget};
use crate::output::{self, OutputFormat, SentMessage};
use anyhow::{Context, Result};
use confirm_tracking::PublishProperties;

/// Durable queue shared with the workers.
pub const TASK_QUEUE: &str = "task_queue";

/// Task body: the words joined by single spaces.
pub fn task_message(words: &[String]) -> String {
    words.join(" ")
}

/// Publish one persistent task to [`TASK_QUEUE`].
pub async fn send_task(
    words: &[String],
    target: &BrokerTarget,
    format: OutputFormat,
) -> Result<()> {
    let message = task_message(words);

    let link = BrokerLink::open(target).await?;
    let published = publish_task(&link, &message).await;
    let closed = link.close().await;
    published?;
    closed?;

    output::print(
        &SentMessage {
            exchange: String::new(),
            routing_key: TASK_QUEUE.to_string(),
            message,
        },
        format,
    );
    Ok(())
}

async fn publish_task(link: &BrokerLink, message: &str) -> Result<()> {
    link.declare_durable_queue(TASK_QUEUE).await?;
    link.channel()
        .publish(
            "",
            TASK_QUEUE,
            &PublishProperties::persistent_text(),
            message.as_bytes(),
        )
        .await
        .context("could not publish task")
}
