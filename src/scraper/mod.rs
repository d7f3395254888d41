//! Pagination walker: drives the extractor across the configured number of
//! stock-list pages, with bounded retry-and-refresh per page and buffered,
//! batched writes to the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use scraper::{Html, Selector};
use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::database::Database;
use crate::extractor::Extractor;
use crate::models::Listing;
use crate::traits::{FetchPage, SiteSelectors};

/// How often and how long to re-poll a fetched page whose listing rows have
/// not materialized yet.
const ROW_POLL_ATTEMPTS: u32 = 3;
const ROW_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
pub struct ScrapeSummary {
    pub pages_scraped: u32,
    pub inserted: usize,
    pub skipped: usize,
}

/// Per-page fetch lifecycle: {Fetching -> Success | Retrying(n) -> Abandoned}.
enum PageState {
    Fetching,
    Retrying(u32),
    Abandoned,
}

enum PageError {
    /// Network/driver hiccup; worth a refresh and retry.
    Transient(anyhow::Error),
    /// The page itself errored; retrying won't help.
    Unexpected(anyhow::Error),
}

pub struct PageWalker<'a> {
    fetcher: &'a dyn FetchPage,
    extractor: &'a Extractor,
    row_selector: Selector,
    config: &'a Config,
}

impl<'a> PageWalker<'a> {
    pub fn new(
        fetcher: &'a dyn FetchPage,
        extractor: &'a Extractor,
        selectors: &SiteSelectors,
        config: &'a Config,
    ) -> Result<Self> {
        let row_selector = Selector::parse(selectors.listing_row)
            .map_err(|e| anyhow::anyhow!("failed to parse listing row selector: {e:?}"))?;

        Ok(Self {
            fetcher,
            extractor,
            row_selector,
            config,
        })
    }

    /// Walk pages 1..=num_pages, writing extracted listings to the store in
    /// batches of `commit_every` pages. An operator interrupt (the shutdown
    /// flag, checked at the top of each retry loop) stops the walk early and
    /// flushes whatever has been produced so far.
    pub async fn scrape(&self, db: &Database, shutdown: &AtomicBool) -> Result<ScrapeSummary> {
        let mut summary = ScrapeSummary::default();
        let mut buffer: Vec<Listing> = Vec::new();
        let mut pages_since_commit = 0u32;

        'pages: for page_number in 1..=self.config.num_pages {
            sleep(self.config.delay).await;
            let url = self.config.page_url(page_number);
            let mut state = PageState::Fetching;

            loop {
                let attempts = match state {
                    PageState::Fetching => 0,
                    PageState::Retrying(n) => n,
                    PageState::Abandoned => {
                        error!("Giving up on page {page_number}");
                        break;
                    }
                };

                if shutdown.load(Ordering::SeqCst) {
                    info!("Interrupt detected, stopping the walk");
                    break 'pages;
                }

                match self.process_page(&url).await {
                    Ok((listings, skipped)) => {
                        buffer.extend(listings);
                        summary.skipped += skipped;
                        summary.pages_scraped += 1;
                        pages_since_commit += 1;

                        if pages_since_commit >= self.config.commit_every {
                            Self::flush(db, &mut buffer, &mut summary).await;
                            pages_since_commit = 0;
                        }

                        info!("Page {page_number} processed successfully");
                        break;
                    }
                    Err(PageError::Transient(e)) => {
                        error!("Error on page {page_number}: {e}");
                        state = if attempts + 1 >= self.config.max_retries {
                            PageState::Abandoned
                        } else {
                            info!("Refreshing page {page_number}...");
                            PageState::Retrying(attempts + 1)
                        };
                    }
                    Err(PageError::Unexpected(e)) => {
                        error!("Unexpected error on page {page_number}: {e}");
                        state = PageState::Abandoned;
                    }
                }
            }
        }

        Self::flush(db, &mut buffer, &mut summary).await;
        info!("Total pages successfully scraped: {}", summary.pages_scraped);
        Ok(summary)
    }

    /// Fetch one page and extract its listing rows, re-polling a bounded
    /// number of times when the rows have not materialized yet.
    async fn process_page(&self, url: &str) -> Result<(Vec<Listing>, usize), PageError> {
        for attempt in 0..ROW_POLL_ATTEMPTS {
            if attempt > 0 {
                sleep(ROW_POLL_INTERVAL).await;
            }

            let html = self.fetcher.fetch(url).await.map_err(classify)?;

            // Scope so the document is dropped before the next await point.
            let extracted = {
                let document = Html::parse_document(&html);
                let rows: Vec<_> = document.select(&self.row_selector).collect();

                if rows.is_empty() {
                    None
                } else {
                    let mut listings = Vec::new();
                    let mut skipped = 0usize;

                    for row in rows {
                        match self.extractor.extract(row) {
                            Ok(listing) => listings.push(listing),
                            Err(reason) => {
                                info!("Skipping listing: {reason}");
                                skipped += 1;
                            }
                        }
                    }

                    Some((listings, skipped))
                }
            };

            if let Some(result) = extracted {
                return Ok(result);
            }
        }

        Err(PageError::Transient(anyhow::anyhow!(
            "listing rows did not appear at {url}"
        )))
    }

    async fn flush(db: &Database, buffer: &mut Vec<Listing>, summary: &mut ScrapeSummary) {
        if buffer.is_empty() {
            return;
        }

        // A failed commit only loses the current batch; those pages are
        // rescraped harmlessly on the next run.
        match db.insert_batch(buffer).await {
            Ok(inserted) => summary.inserted += inserted,
            Err(e) => error!("Error committing batch of {} listings: {e}", buffer.len()),
        }

        buffer.clear();
    }
}

fn classify(e: anyhow::Error) -> PageError {
    match e.downcast_ref::<reqwest::Error>() {
        Some(re) if re.is_status() => PageError::Unexpected(e),
        _ => PageError::Transient(e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;

    use super::*;

    /// Replays a scripted sequence of fetch results.
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<String, String>>>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<String, String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl FetchPage for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(html)) => Ok(html),
                Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                None => Err(anyhow::anyhow!("no scripted response for {url}")),
            }
        }
    }

    fn test_config(num_pages: u32) -> Config {
        Config {
            base_url: "https://example.com/stocklist/page_{page}".to_string(),
            num_pages,
            delay: Duration::from_secs(0),
            max_retries: 3,
            base_year: 2009,
            start_increment_year: 2100,
            commit_every: 20,
            database_url: "sqlite::memory:".to_string(),
            webhook_url: None,
        }
    }

    fn page_with_rows(rows: &[(&str, &str, &str)]) -> String {
        let rows: String = rows
            .iter()
            .map(|(ref_no, year, price)| {
                format!(
                    r#"<div class="stocklist-row">
                        <div class="make-model"><a href="https://example.com/vehicle/{ref_no}">{year} TOYOTA COROLLA</a></div>
                        <span class="veh-stock-no">Ref No. {ref_no}</span>
                        <div class="year"><p class="val">{year}</p></div>
                        <p class="total-price">{price}</p>
                    </div>"#
                )
            })
            .collect();
        format!("<html><body>{rows}</body></html>")
    }

    async fn run_walker(
        fetcher: &ScriptedFetcher,
        config: &Config,
        db: &Database,
        shutdown: &AtomicBool,
    ) -> ScrapeSummary {
        let selectors = SiteSelectors::default();
        let extractor = Extractor::new(&selectors, config.base_year).unwrap();
        let walker = PageWalker::new(fetcher, &extractor, &selectors, config).unwrap();
        walker.scrape(db, shutdown).await.unwrap()
    }

    #[tokio::test]
    async fn scrapes_and_stores_listings() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page_with_rows(&[
            ("BM700551", "2005", "$12,345"),
            ("BM800662", "2007", "$8,000"),
        ]))]);
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let shutdown = AtomicBool::new(false);

        let summary = run_walker(&fetcher, &test_config(1), &db, &shutdown).await;

        assert_eq!(summary.pages_scraped, 1);
        assert_eq!(summary.inserted, 2);
        let stored = db.all().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].total_price, 12_345.0);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let fetcher = ScriptedFetcher::new(vec![
            Err("connection reset".to_string()),
            Ok(page_with_rows(&[("BM700551", "2005", "$12,345")])),
        ]);
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let shutdown = AtomicBool::new(false);

        let summary = run_walker(&fetcher, &test_config(1), &db, &shutdown).await;

        assert_eq!(summary.pages_scraped, 1);
        assert_eq!(summary.inserted, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_abandon_the_page_but_not_the_run() {
        let fetcher = ScriptedFetcher::new(vec![
            Err("boom".to_string()),
            Err("boom".to_string()),
            Err("boom".to_string()),
            Ok(page_with_rows(&[("BM800662", "2007", "$8,000")])),
        ]);
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let shutdown = AtomicBool::new(false);

        let summary = run_walker(&fetcher, &test_config(2), &db, &shutdown).await;

        assert_eq!(summary.pages_scraped, 1);
        assert_eq!(db.all().await.unwrap().len(), 1);
        assert_eq!(db.all().await.unwrap()[0].ref_no, "BM800662");
    }

    #[tokio::test]
    async fn rescrape_of_unchanged_page_inserts_no_duplicates() {
        let page = page_with_rows(&[("BM700551", "2005", "$12,345")]);
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let shutdown = AtomicBool::new(false);

        for _ in 0..2 {
            let fetcher = ScriptedFetcher::new(vec![Ok(page.clone())]);
            run_walker(&fetcher, &test_config(1), &db, &shutdown).await;
        }

        assert_eq!(db.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn skipped_listings_are_counted_not_stored() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page_with_rows(&[
            ("BM700551", "2005", "SOLD"),
            ("BM800662", "2015", "$9,000"),
            ("BM900773", "2006", "$7,500"),
        ]))]);
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let shutdown = AtomicBool::new(false);

        let summary = run_walker(&fetcher, &test_config(1), &db, &shutdown).await;

        assert_eq!(summary.skipped, 2);
        assert_eq!(db.all().await.unwrap().len(), 1);
        assert_eq!(db.all().await.unwrap()[0].ref_no, "BM900773");
    }

    #[tokio::test]
    async fn interrupt_stops_the_walk_before_fetching() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page_with_rows(&[(
            "BM700551", "2005", "$12,345",
        )]))]);
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let shutdown = AtomicBool::new(true);

        let summary = run_walker(&fetcher, &test_config(5), &db, &shutdown).await;

        assert_eq!(summary.pages_scraped, 0);
        assert!(db.all().await.unwrap().is_empty());
    }
}
