pub mod cli;
pub mod fixtures;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use auction::config::AuctionConfig;
use auction::db::Db;
use auction::engine::AuctionEngine;
use auction::metrics::counters::Counters;
use auction::store::AuctionStores;
use auction::store::sqlx_store::SqlxAuctionStore;
use cli::{Cli, Command};
use common::logger::init_logger;
use fixtures::{Fixtures, load_request};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let json = cli.json_logs || std::env::var("APP_ENV").is_ok_and(|v| v == "production");
    init_logger("auction-cli", json);

    let mut cfg = AuctionConfig::from_env();
    if let Some(url) = cli.database_url {
        cfg.database_url = url;
    }

    let db = Db::connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    let store = Arc::new(SqlxAuctionStore::new(db.pool.clone()));

    match cli.command {
        Command::Migrate => {
            db.migrate().await?;
            tracing::info!("migrations applied");
        }

        Command::Seed { fixtures } => {
            db.migrate().await?;
            Fixtures::load(&fixtures)?.seed(&store).await?;
        }

        Command::Run { request, counters } => {
            let request = load_request(&request)?;
            let engine = AuctionEngine::new(AuctionStores::shared(store), &cfg, Counters::default());

            let result = engine.run_auction(&request).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if counters {
                println!("{}", serde_json::to_string_pretty(&engine.counters().snapshot())?);
            }
        }
    }

    Ok(())
}
