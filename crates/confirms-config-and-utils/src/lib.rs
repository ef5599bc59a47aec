//! Configuration, paths and logging setup for the publisher-confirms tools.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_AMQP_URI, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level, SERVICE_NAME};
pub use paths::Paths;
