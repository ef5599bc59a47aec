//! Logging initialization for the publisher tools.
//!
//! Events go to `~/.publisher-confirms/logs/confirms.jsonl` as JSONL and are
//! mirrored to stderr.

use crate::{CoreError, CoreResult, Paths};
use observability::LogConfig;
use tracing::Level;

/// Service name stamped on every log record.
pub const SERVICE_NAME: &str = "publisher-confirms";

/// Parse a log level name, case-insensitively. `warning` is taken as `warn`.
pub fn parse_level(level: &str) -> CoreResult<Level> {
    let name = level.trim();
    if name.eq_ignore_ascii_case("warning") {
        return Ok(Level::WARN);
    }
    name.parse::<Level>().map_err(|_| CoreError::InvalidSetting {
        field: "log_level",
        reason: format!("unknown level '{level}'"),
    })
}

/// Install the global subscriber.
///
/// `RUST_LOG` still overrides `level` when set.
pub fn init_logging(level: &str, paths: &Paths) -> CoreResult<()> {
    let level = parse_level(level)?;
    paths.ensure_dirs()?;

    observability::init_with_config(LogConfig {
        service_name: SERVICE_NAME.into(),
        // lapin is chatty at debug
        default_level: format!("{},lapin=warn", level.as_str().to_ascii_lowercase()),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    })?;
    Ok(())
}
