//! Traits and interfaces for the external collaborators: the page fetcher
//! and the outbound notifier. Both are seams so the pipeline can be driven
//! against canned pages in tests.

use anyhow::Result;
use async_trait::async_trait;

/// Fetches one rendered listing page.
#[async_trait]
pub trait FetchPage: Send + Sync {
    /// Fetch `url` and return the document text, or an error on a
    /// network/driver failure. Transient failures are the caller's problem;
    /// the fetcher does not retry.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Delivers one notification message.
#[async_trait]
pub trait Notify: Send + Sync {
    /// Send `text` to the channel. An `Ok` return means confirmed delivery;
    /// callers must not flip any sent-flags on `Err`.
    async fn send(&self, text: &str) -> Result<()>;
}

/// CSS selectors for the parts of a stock-list page. Tied to the target
/// site's markup; configuration constants, not protocol.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Container selector for one vehicle listing
    pub listing_row: &'static str,
    /// Title link within the listing row (also carries the detail-page href)
    pub title_link: &'static str,
    /// Reference number element
    pub stock_no: &'static str,
    pub mileage: &'static str,
    pub year: &'static str,
    pub engine: &'static str,
    pub transmission: &'static str,
    pub location: &'static str,
    /// Detailed-spec table within the listing row
    pub spec_table: &'static str,
    /// Fuel-type cell
    pub fuel_cell: &'static str,
    /// Seats cell
    pub seats_cell: &'static str,
    /// Total-price element, present on both list rows and detail pages
    pub price: &'static str,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            listing_row: ".stocklist-row",
            title_link: ".make-model a",
            stock_no: ".veh-stock-no",
            mileage: ".mileage p.val",
            year: ".year p.val",
            engine: ".engine p.val",
            transmission: ".trans p.val",
            location: "p.val.stock-area",
            spec_table: ".table-detailed-spec",
            fuel_cell: "td.td-3rd",
            seats_cell: "td.td-4th",
            price: "p.total-price",
        }
    }
}
