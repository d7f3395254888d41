use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::Result;
use chrono::{Datelike, Utc};
use tracing::info;

use crate::config::Config;
use crate::database::Database;
use crate::discord::DiscordNotifier;
use crate::extractor::Extractor;
use crate::fetcher::HttpFetcher;
use crate::reconciler::Reconciler;
use crate::scraper::PageWalker;
use crate::selector::{FilterRules, NotificationSelector};
use crate::traits::SiteSelectors;

/// Wires the pipeline together: scrape, reconcile, notify.
pub struct VehicleScout {
    config: Config,
    selectors: SiteSelectors,
    fetcher: HttpFetcher,
    database: Database,
    notifier: DiscordNotifier,
}

impl VehicleScout {
    pub async fn new(config: Config) -> Result<Self> {
        let fetcher = HttpFetcher::new()?;
        let database = Database::connect(&config.database_url).await?;
        let notifier = DiscordNotifier::new(config.webhook_url.clone());

        Ok(Self {
            config,
            selectors: SiteSelectors::default(),
            fetcher,
            database,
            notifier,
        })
    }

    pub async fn run(&self, shutdown: &AtomicBool) -> Result<()> {
        let started = Instant::now();

        let year_threshold = self.config.year_threshold(i64::from(Utc::now().year()));
        info!("Year threshold for this run: {year_threshold}");

        let extractor = Extractor::new(&self.selectors, year_threshold)?;
        let walker = PageWalker::new(&self.fetcher, &extractor, &self.selectors, &self.config)?;
        let summary = walker.scrape(&self.database, shutdown).await?;
        info!(
            "Scrape pass done: {} pages, {} inserted, {} skipped",
            summary.pages_scraped, summary.inserted, summary.skipped
        );

        let reconciler = Reconciler::new(&self.fetcher, &self.selectors)?;
        let removed = reconciler.reconcile(&self.database, shutdown).await?;
        info!("Reconciliation removed {} listings", removed.len());

        let selector = NotificationSelector::new(&self.notifier, FilterRules::default());
        let notified = selector.select_and_send(&self.database).await?;
        info!("Sent {notified} listings to Discord");

        let (minutes, seconds) = {
            let total = started.elapsed().as_secs();
            (total / 60, total % 60)
        };
        if minutes > 0 {
            info!("Time taken: {minutes} minutes and {seconds} seconds");
        } else {
            info!("Time taken: {seconds} seconds");
        }

        Ok(())
    }
}
