//! epochwise CLI: drive the loop runtime from the terminal.
//!
//! Runs `train`, `evaluate` or `fit` on a synthetic linear-regression task
//! and prints the final progress.

mod commands;
mod regression;

use clap::Parser;
use epochwise_core::config::{LogConfig, load_config};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// epochwise: train/evaluate/fit loop runner
#[derive(Parser, Debug)]
#[command(name = "epochwise", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print the final report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Synthetic dataset parameters shared by every run command.
#[derive(clap::Args, Debug, Clone)]
pub struct DataArgs {
    /// Number of training samples
    #[arg(long, default_value = "256")]
    samples: usize,

    /// Number of held-out samples for evaluation
    #[arg(long, default_value = "64")]
    eval_samples: usize,

    /// Samples per batch
    #[arg(long, default_value = "16")]
    batch_size: usize,

    /// RNG seed for data generation
    #[arg(long, default_value = "42")]
    seed: u64,

    /// SGD learning rate
    #[arg(long, default_value = "0.05")]
    learning_rate: f64,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Train the model
    Train {
        /// Number of epochs
        #[arg(short, long)]
        epochs: Option<usize>,
        /// Total step cap across epochs
        #[arg(long)]
        max_steps: Option<usize>,
        /// Step cap per epoch
        #[arg(long)]
        max_steps_per_epoch: Option<usize>,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Run a single evaluation epoch on an untrained model
    Evaluate {
        /// Step cap for the epoch
        #[arg(long)]
        max_steps_per_epoch: Option<usize>,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Train with periodic evaluation
    Fit {
        /// Number of train epochs
        #[arg(short, long)]
        epochs: Option<usize>,
        /// Total train step cap
        #[arg(long)]
        max_train_steps: Option<usize>,
        /// Evaluate every N train epochs
        #[arg(long, conflicts_with = "every_n_steps")]
        every_n_epochs: Option<usize>,
        /// Evaluate every N train steps
        #[arg(long)]
        every_n_steps: Option<usize>,
        /// Train step cap per epoch
        #[arg(long)]
        max_train_steps_per_epoch: Option<usize>,
        /// Eval step cap per epoch
        #[arg(long)]
        max_eval_steps_per_epoch: Option<usize>,
        /// Stop after this many evaluations without improvement
        #[arg(long)]
        patience: Option<usize>,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Write the default configuration to the user config path
    Init,
    /// Show the resolved configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = commands::config_overrides(&cli.command);
    let config = load_config(cli.config.as_deref(), Some(&overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let _guard = init_tracing(cli.verbose, cli.quiet, &config.log);

    commands::handle_command(cli.command, config, cli.json)
}

/// Human-readable stderr logging, plus a JSON file log when a log directory
/// is configured. The returned guard flushes the file writer on drop.
fn init_tracing(verbose: u8, quiet: bool, log: &LogConfig) -> Option<WorkerGuard> {
    let filter = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let (json_layer, guard) = match &log.directory {
        Some(dir) => {
            let _ = std::fs::create_dir_all(dir);
            let file_appender = tracing_appender::rolling::daily(dir, "epochwise.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}
