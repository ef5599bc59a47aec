//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use std::fmt;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `value` as its display line or as JSON.
pub fn print<T: Serialize + fmt::Display>(value: &T, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{value}"),
        OutputFormat::Json => match serde_json::to_string(value) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{value}"),
        },
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {message}"),
        OutputFormat::Json => {
            let body = serde_json::json!({ "status": "error", "message": message });
            eprintln!("{body}");
        }
    }
}

/// A one-shot message handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub exchange: String,
    pub routing_key: String,
    pub message: String,
}

impl fmt::Display for SentMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exchange.is_empty() {
            write!(f, " [x] Sent '{}'", self.message)
        } else {
            write!(f, " [x] Sent '{}':'{}'", self.routing_key, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sent_to_default_exchange() {
        let sent = SentMessage {
            exchange: String::new(),
            routing_key: "task_queue".to_string(),
            message: "Hello...".to_string(),
        };
        assert_eq!(sent.to_string(), " [x] Sent 'Hello...'");
    }

    #[test]
    fn test_sent_to_named_exchange() {
        let sent = SentMessage {
            exchange: "topic_logs".to_string(),
            routing_key: "kern.critical".to_string(),
            message: "A critical kernel error".to_string(),
        };
        assert_eq!(
            sent.to_string(),
            " [x] Sent 'kern.critical':'A critical kernel error'"
        );

        let json = serde_json::to_value(&sent).unwrap();
        assert_eq!(json["routing_key"], "kern.critical");
    }
}
