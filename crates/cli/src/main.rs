//! Madoguchi CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the LINE webhook server
//! - `chat`    — Talk to the relay from the terminal
//! - `rank`    — Show which services a message would surface
//! - `doctor`  — Check credentials, catalog, and journal

use clap::{Parser, Subcommand};
use madoguchi_config::AppConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "madoguchi",
    about = "Madoguchi — child-rearing support relay for LINE",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.madoguchi/config.toml)
    #[arg(short, long, global = true, env = "MADOGUCHI_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP webhook server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,

        /// Override the bind address
        #[arg(long)]
        host: Option<String>,
    },

    /// Interactive console chat through the same pipeline
    Chat {
        /// User id for the console session
        #[arg(short, long, default_value = "local_user")]
        user: String,
    },

    /// Rank catalog services against a message
    Rank {
        /// The message to rank against
        query: String,

        /// Maximum matches (default: catalog.limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Before parsing, so `.env` can also supply MADOGUCHI_CONFIG.
    let env_file = AppConfig::load_env_file(None);
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Some(path) = env_file {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port, host } => commands::serve::run(config_path, port, host).await?,
        Commands::Chat { user } => commands::chat::run(config_path, user).await?,
        Commands::Rank { query, limit, json } => {
            commands::rank::run(config_path, &query, limit, json)?
        }
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
