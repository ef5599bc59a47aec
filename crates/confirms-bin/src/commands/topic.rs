//! Topic exchange one-shot publisher.

use super::{BrokerLink, BrokerTarget};
use crate::output::{self, OutputFormat, SentMessage};
use anyhow::{Context, Result};
use confirm_tracking::PublishProperties;

pub const TOPIC_EXCHANGE: &str = "topic_logs";

const DEFAULT_ROUTING_KEY: &str = "anonymous.info";
const DEFAULT_MESSAGE: &str = "Hello World!";

/// First argument, or `anonymous.info`.
pub fn routing_key(args: &[String]) -> &str {
    args.first().map(String::as_str).unwrap_or(DEFAULT_ROUTING_KEY)
}

/// Remaining arguments joined by spaces, or `Hello World!` when there are none.
pub fn topic_message(args: &[String]) -> String {
    match args.get(1..) {
        Some(rest) if !rest.is_empty() => rest.join(" "),
        _ => DEFAULT_MESSAGE.to_string(),
    }
}

/// Publish one message to [`TOPIC_EXCHANGE`].
pub async fn emit_topic(
    args: &[String],
    target: &BrokerTarget,
    format: OutputFormat,
) -> Result<()> {
    let routing_key = routing_key(args).to_string();
    let message = topic_message(args);

    let link = BrokerLink::open(target).await?;
    let published = publish_topic(&link, &routing_key, &message).await;
    let closed = link.close().await;
    published?;
    closed?;

    output::print(
        &SentMessage {
            exchange: TOPIC_EXCHANGE.to_string(),
            routing_key,
            message,
        },
        format,
    );
    Ok(())
}

async fn publish_topic(link: &BrokerLink, routing_key: &str, message: &str) -> Result<()> {
    link.declare_topic_exchange(TOPIC_EXCHANGE).await?;
    link.channel()
        .publish(
            TOPIC_EXCHANGE,
            routing_key,
            &PublishProperties::default(),
            message.as_bytes(),
        )
        .await
        .with_context(|| format!("could not publish to {TOPIC_EXCHANGE}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults_without_arguments() {
        assert_eq!(routing_key(&[]), "anonymous.info");
        assert_eq!(topic_message(&[]), "Hello World!");
    }

    #[test]
    fn test_routing_key_only() {
        let args = args(&["kern.critical"]);
        assert_eq!(routing_key(&args), "kern.critical");
        assert_eq!(topic_message(&args), "Hello World!");
    }

    #[test]
    fn test_routing_key_and_message() {
        let args = args(&["kern.critical", "A", "critical", "kernel", "error"]);
        assert_eq!(routing_key(&args), "kern.critical");
        assert_eq!(topic_message(&args), "A critical kernel error");
    }

    #[tokio::test]
    async fn test_emit_topic_on_simulated_broker() {
        let target = BrokerTarget::Simulated { nacks: vec![] };
        emit_topic(&args(&["kern.info", "booted"]), &target, OutputFormat::Text)
            .await
            .unwrap();
    }
}
