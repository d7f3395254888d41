//! Availability reconciliation: revisit every stored listing's detail page
//! and prune the ones that are no longer purchasable. A full O(n) sweep,
//! deliberately conservative: a record is only deleted on positive evidence
//! that it is sold, under offer, or no longer priced.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use scraper::{Html, Selector};
use tracing::{error, info};

use crate::database::Database;
use crate::traits::{FetchPage, SiteSelectors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Available,
    Unavailable,
    /// The re-fetch failed; no verdict either way.
    Unknown,
}

pub struct Reconciler<'a> {
    fetcher: &'a dyn FetchPage,
    price_selector: Selector,
}

impl<'a> Reconciler<'a> {
    pub fn new(fetcher: &'a dyn FetchPage, selectors: &SiteSelectors) -> Result<Self> {
        let price_selector = Selector::parse(selectors.price)
            .map_err(|e| anyhow::anyhow!("failed to parse price selector: {e:?}"))?;

        Ok(Self {
            fetcher,
            price_selector,
        })
    }

    /// Sweep the whole store, deleting listings whose detail page now shows
    /// them as sold, under offer, or priced "ASK". Returns the removed
    /// ref numbers.
    pub async fn reconcile(&self, db: &Database, shutdown: &AtomicBool) -> Result<Vec<String>> {
        let listings = db.all().await?;
        let mut removed = Vec::new();

        for listing in listings {
            if shutdown.load(Ordering::SeqCst) {
                info!("Interrupt detected, stopping reconciliation");
                break;
            }

            match self.check_status(&listing.link).await {
                Availability::Unavailable => {
                    info!(
                        "Vehicle {} has been sold or is under offer, removing from database",
                        listing.ref_no
                    );
                    db.delete(&listing.ref_no).await?;
                    removed.push(listing.ref_no);
                }
                Availability::Available => {
                    info!("Vehicle {} is still available", listing.ref_no);
                }
                // Never delete on an ambiguous signal.
                Availability::Unknown => {}
            }
        }

        Ok(removed)
    }

    async fn check_status(&self, link: &str) -> Availability {
        let html = match self.fetcher.fetch(link).await {
            Ok(html) => html,
            Err(e) => {
                error!("Error accessing {link}: {e}");
                return Availability::Unknown;
            }
        };

        let document = Html::parse_document(&html);
        let Some(price_element) = document.select(&self.price_selector).next() else {
            // Absence of price markup is not evidence of removal.
            info!("No price information found for {link}");
            return Availability::Available;
        };

        let price = price_element
            .text()
            .collect::<String>()
            .trim()
            .to_uppercase();
        if price.contains("SOLD") || price.contains("UNDER OFFER") || price == "ASK" {
            Availability::Unavailable
        } else {
            Availability::Available
        }
    }
}
