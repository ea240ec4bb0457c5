//! SafeWatch CLI: replays detection logs, prints the alert timeline and
//! serves the alert gateway.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// SafeWatch: PPE violation tracking and debounced safety alerts
#[derive(Parser, Debug)]
#[command(name = "safewatch", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (store paths are resolved against it)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Replay a recorded detection log through the pipeline
    Run {
        /// JSON-lines detection log, one frame per line
        log: PathBuf,
        /// Serve the alert gateway while replaying, and keep serving afterwards
        #[arg(long)]
        serve: bool,
        /// Pace the replay at this many frames per second
        #[arg(long)]
        fps: Option<f64>,
    },
    /// Serve the alert gateway over the existing store
    Serve,
    /// Print recent alerts from the durable history
    History {
        /// Maximum number of alerts (defaults to store.history_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the in-memory alert timeline restored from the snapshot
    Alerts,
    /// Print the class table with risk categories and colors
    Classes,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = safewatch_core::config::log_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "safewatch.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
