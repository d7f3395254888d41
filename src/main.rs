use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tracing::info;

mod config;
mod database;
mod discord;
mod extractor;
mod fetcher;
mod models;
mod reconciler;
mod scraper;
mod selector;
mod traits;
mod vehicle_scout;

use config::Config;
use vehicle_scout::VehicleScout;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    info!("Starting Vehicle Scout");

    let config = Config::from_env()?;
    let scout = VehicleScout::new(config).await?;

    // Cooperative cancellation: the pipeline checks this flag at its
    // suspension points and flushes what it has produced so far.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing up...");
            flag.store(true, Ordering::SeqCst);
        }
    });

    scout.run(&shutdown).await?;

    info!("Script finished, scraping complete!");
    Ok(())
}
