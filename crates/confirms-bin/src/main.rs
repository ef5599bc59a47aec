//! publisher-confirms - publish workloads with broker confirms.
//!
//! Runs the individual, batched and asynchronous confirm strategies against an
//! AMQP broker (or an in-process one with `--simulate`), plus the one-shot
//! `task` and `topic` publishers.

mod commands;
mod output;
mod settings;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::BrokerTarget;
use confirm_tracking::PublishStrategy;
use confirms_config_and_utils::{init_logging, Config, Paths};
use output::OutputFormat;
use settings::RunArgs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Publish messages with publisher confirms.
#[derive(Parser)]
#[command(name = "publisher-confirms")]
#[command(about = "Compare publisher confirm strategies against an AMQP broker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory holding config.json and logs/
    #[arg(long, env = "CONFIRMS_HOME", global = true)]
    base_dir: Option<PathBuf>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum Commands {
    /// Wait for each message's confirm before publishing the next
    Individual,
    /// Wait for confirms after every batch
    Batch,
    /// Track confirms asynchronously and drain at the end
    Async,
    /// Run all three strategies in turn
    All,
    /// Send a persistent task to the durable work queue
    Task {
        /// Task words; dots make workers sleep
        words: Vec<String>,
    },
    /// Send a message to the topic exchange
    Topic {
        /// Routing key followed by message words
        args: Vec<String>,
    },
}

impl Commands {
    fn strategies(&self) -> &'static [PublishStrategy] {
        match self {
            Commands::Individual => &[PublishStrategy::Individual],
            Commands::Batch => &[PublishStrategy::Batched],
            Commands::Async => &[PublishStrategy::Asynchronous],
            Commands::All => &PublishStrategy::ALL,
            Commands::Task { .. } | Commands::Topic { .. } => &[],
        }
    }
}

/// Config file, then environment, then flags.
fn load_config(cli: &Cli, paths: &Paths) -> Result<Config> {
    let mut config = Config::load(paths)
        .with_context(|| format!("could not load {}", paths.config_file().display()))?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    cli.run.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let paths = match &cli.base_dir {
        Some(dir) => Paths::with_base_dir(dir.clone()),
        None => Paths::new()?,
    };
    let config = load_config(&cli, &paths)?;
    init_logging(&config.log_level, &paths).context("could not initialize logging")?;
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let target = BrokerTarget::from_config(&config, cli.run.simulate, &cli.run.simulate_nacks);
    let command = cli.command.unwrap_or(Commands::All);

    match &command {
        Commands::Task { words } => commands::send_task(words, &target, cli.format).await,
        Commands::Topic { args } => commands::emit_topic(args, &target, cli.format).await,
        strategy_command => {
            let strategy_config = config.strategy_config();
            info!(
                count = strategy_config.message_count,
                batch_size = strategy_config.batch_size,
                simulate = cli.run.simulate,
                "Running publisher confirm strategies"
            );
            commands::run_strategies(
                strategy_command.strategies(),
                &strategy_config,
                &target,
                cli.format,
            )
            .await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let format = cli.format;

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{e:#}"), format);
        std::process::exit(1);
    }
}
