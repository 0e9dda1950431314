//! OrchestraAI CLI: terminal front-end for deep research sessions.
//!
//! Runs an interactive research REPL and offers subcommands for browsing the
//! research history and managing configuration.

mod commands;
mod repl;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// OrchestraAI: multi-turn deep research from your terminal
#[derive(Parser, Debug)]
#[command(name = "orchestra", version, about, long_about = None)]
struct Cli {
    /// Research topic to start with (starts interactive mode either way)
    topic: Option<String>,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the built-in offline agent instead of the remote deployment
    #[arg(long)]
    offline: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Browse completed research sessions
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum HistoryAction {
    /// List recorded sessions, most recent first
    List {
        /// Maximum number of sessions to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print the report of one session
    Show {
        /// Position in `history list` (1 = most recent)
        #[arg(default_value = "1")]
        index: usize,
    },
    /// Save the report of one session as Markdown
    Export {
        /// Position in `history list` (1 = most recent)
        index: usize,
        /// Destination file (defaults to a name derived from the topic)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
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
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = orchestra_core::config::data_dir().join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "orchestra.log");
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

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace, cli.config.as_deref());
    }

    let config =
        orchestra_core::config::load_config(Some(&workspace), cli.config.as_deref())
            .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if !cli.quiet && cli.config.is_none() && !orchestra_core::config_exists(Some(&workspace)) {
        println!("\n  No configuration found; using defaults.");
        println!("  Run `orchestra config init` to create one.\n");
    }
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    repl::run_interactive(config, workspace, cli.topic, cli.offline).await
}
