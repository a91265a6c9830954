//! Pincer CLI: the main entry point.
//!
//! Commands:
//! - `agent` — Single-message or interactive chat against the engine
//! - `run`   — Serve the message bus: stdin lines in, replies out

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pincer", about = "Pincer — agent execution engine", version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent
    Agent {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Session key to read and append to
        #[arg(short, long, default_value = "cli:direct")]
        session: String,

        /// Print the reply as it is generated
        #[arg(long)]
        stream: bool,
    },

    /// Consume the message bus until Ctrl+C
    Run,
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
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Agent {
            message,
            session,
            stream,
        } => commands::agent::run(message, session, stream).await?,
        Commands::Run => commands::run::run().await?,
    }

    Ok(())
}
