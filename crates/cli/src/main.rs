//! WardOps CLI entry point.
//!
//! Commands:
//! - `onboard`  Write a default config
//! - `config`   Validate and print the active config
//! - `agent`    Interactive or single-message ward assistant
//! - `tasks`    Dispatch demo tasks and watch live progress

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "wardops",
    about = "WardOps: hospital ward operations assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Validate and print the active configuration
    Config {
        /// Only print the config file path
        #[arg(long)]
        path: bool,
    },

    /// Talk to the ward assistant
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Dispatch a few demo tasks and stream their progress
    Tasks {
        /// How long to watch the live task map
        #[arg(short, long, default_value_t = 20)]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Config { path: true } => commands::config_cmd::path().await?,
        Commands::Config { path: false } => commands::config_cmd::show().await?,
        Commands::Agent { message } => commands::agent::run(message).await?,
        Commands::Tasks { seconds } => commands::tasks::run(seconds).await?,
    }

    Ok(())
}
