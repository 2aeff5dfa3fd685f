//! Safe Sniper - Solana token safety screener and position lifecycle bot
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - A SAFE classification is a heuristic, not a guarantee. Tokens still rug.
//! - Take profit and stop loss are checked once per cycle and can gap.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use safe_sniper::cli::commands;
use safe_sniper::config::Config;

/// Safe Sniper - screen new Solana tokens and trade the safe ones
#[derive(Parser)]
#[command(name = "sniper")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the discovery, assessment and trading loop
    Start {
        /// Quote swaps but never submit them
        #[arg(long)]
        dry_run: bool,

        /// Skip the live-trading confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Assess a single token and print the per-source breakdown
    Assess {
        /// Token mint address
        mint: String,

        /// Print the assessment as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one discovery pass and list the candidates
    Discover,

    /// Show current configuration (secrets masked)
    Config,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::from_default_env().add_directive("safe_sniper=info".parse().unwrap());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Start { dry_run, yes } => commands::start(&config, dry_run, yes).await,
        Commands::Assess { mint, json } => commands::assess(&config, &mint, json).await,
        Commands::Discover => commands::discover(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
