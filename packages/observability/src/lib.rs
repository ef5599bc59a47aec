//! # Observability
//!
//! Logging setup shared by the publisher-confirms binaries.
//!
//! Services call [`init_with_config`] once at startup and then use the plain
//! `tracing` macros. Every event is written as one JSON object per line to
//! the configured log file, and optionally mirrored to stderr in the compact
//! human format.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "publisher-confirms".into(),
//!     default_level: "debug".into(),
//!     log_path: Some(paths.log_file()),
//!     also_stderr: true,
//! })?;
//! tracing::info!(count = 50_000, "publishing");
//! ```
//!
//! `RUST_LOG` takes precedence over `default_level` when set.

mod file_sink;
mod json_layer;

use std::io;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use file_sink::{LogFile, LogFileWriter};
pub use json_layer::{JsonLayer, LogRecord};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name stamped on every JSONL record.
    pub service_name: String,

    /// Default filter directive (e.g. "debug", "info,lapin=warn").
    pub default_level: String,

    /// JSONL output file. No file output when `None`.
    pub log_path: Option<PathBuf>,

    /// Mirror events to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

impl LogConfig {
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_level))
    }
}

/// Initialize logging with defaults: stderr only, `info` level.
pub fn init(service_name: &str) -> io::Result<()> {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

/// Install the global subscriber described by `config`.
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    let json_layer = match &config.log_path {
        Some(path) => {
            let file = LogFile::open(path)?;
            Some(JsonLayer::new(config.service_name.clone(), file).with_filter(config.filter()))
        }
        None => None,
    };

    let stderr_layer = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(config.filter())
    });

    tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(io::Error::other)?;

    if let Some(path) = &config.log_path {
        tracing::debug!(log_path = %path.display(), "observability initialized");
    }
    Ok(())
}

pub use tracing::{debug, error, info, trace, warn, Level};
