//! haylink CLI
//!
//! Command-line tools that run the connector against the in-memory
//! reference server.
//!
//! # Commands
//!
//! - `demo` - Subscribe every point of a sample site and print the tree after each poll
//! - `tree` - Print the navigation tree discovered from the sample site
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// haylink command-line tools.
#[derive(Parser)]
#[command(name = "haylink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe every point and print the tree after each poll
    Demo {
        /// Number of poll cycles to run
        #[arg(short, long, default_value = "3")]
        polls: usize,

        /// Poll interval in milliseconds
        #[arg(short, long, default_value = "500")]
        interval_ms: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the discovered navigation tree
    Tree {
        /// Navigation levels fetched eagerly below the root
        #[arg(short, long, default_value = "2")]
        depth: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Demo {
            polls,
            interval_ms,
            format,
        } => {
            let format = format.parse()?;
            commands::demo::run(polls, interval_ms, format).await?;
        }
        Commands::Tree { depth, format } => {
            let format = format.parse()?;
            commands::tree::run(depth, format).await?;
        }
        Commands::Version => {
            println!("haylink CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
