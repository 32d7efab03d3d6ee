use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[clap(name = "auction-cli", version)]
pub struct Cli {
    /// Database connection string; overrides DATABASE_URL
    #[clap(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Emit logs as JSON lines (also enabled by APP_ENV=production)
    #[clap(long, global = true)]
    pub json_logs: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create tables if they do not exist
    Migrate,

    /// Load ad units, candidates and budgets from a JSON fixtures file
    Seed {
        fixtures: PathBuf,
    },

    /// Run one auction for a JSON bid request and print the result
    Run {
        request: PathBuf,

        /// Also print the engine counters after the auction
        #[clap(long)]
        counters: bool,
    },
}
