//! Notification selection: filter un-notified listings against the rule
//! set, dispatch one batched message, and flip sent-flags on confirmed
//! delivery only.

use anyhow::Result;
use tracing::{error, info};

use crate::database::Database;
use crate::models::Listing;
use crate::traits::Notify;

const HEADER: &str = "Hello Sir, I found some cars you might like:";
const NOTHING_NEW: &str = "Update:\nThere are no more links to send that meet the requirements.";

/// What a listing must satisfy to be worth a notification. All predicates
/// must hold; a missing numeric field fails its predicate.
#[derive(Debug, Clone)]
pub struct FilterRules {
    /// Brand allow-list, matched as case-sensitive substrings of the title.
    pub brands: Vec<String>,
    pub max_year: i64,
    pub max_mileage: i64,
    pub max_price: f64,
    pub transmissions: Vec<String>,
    pub fuel_types: Vec<String>,
    pub auction_grades: Vec<String>,
    pub locations: Vec<String>,
    /// Courtesy cap on links per dispatch, not a correctness requirement.
    pub max_links: usize,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            brands: strings(&["TOYOTA", "LEXUS", "HONDA", "NISSAN", "SUBARU"]),
            max_year: 2020,
            max_mileage: 180_000,
            max_price: 20_000.0,
            transmissions: strings(&["AT", "CVT"]),
            fuel_types: strings(&["Petrol"]),
            auction_grades: strings(&["3", "3.5", "4"]),
            locations: strings(&["Kobe", "Osaka", "Tokyo", "Nagoya", "Yokohama", "Fukuoka"]),
            max_links: 6,
        }
    }
}

impl FilterRules {
    pub fn meets_requirements(&self, listing: &Listing) -> bool {
        self.brands.iter().any(|b| listing.title.contains(b.as_str()))
            && listing.mileage.is_some_and(|m| m <= self.max_mileage)
            && listing.year.is_some_and(|y| y <= self.max_year)
            && self.transmissions.contains(&listing.transmission)
            && self.fuel_types.contains(&listing.fuel_type)
            && self.auction_grades.contains(&listing.auction_grade)
            && self.locations.contains(&listing.location)
            && listing.total_price <= self.max_price
    }
}

pub struct NotificationSelector<'a> {
    notifier: &'a dyn Notify,
    rules: FilterRules,
}

impl<'a> NotificationSelector<'a> {
    pub fn new(notifier: &'a dyn Notify, rules: FilterRules) -> Self {
        Self { notifier, rules }
    }

    /// Send one message with the links of qualifying un-notified listings,
    /// capped at `max_links`, and mark them sent on confirmed delivery.
    /// With nothing to send, a fixed heartbeat message goes out instead so
    /// the channel can distinguish "no matches" from a dead scraper.
    /// Returns the number of listings marked as notified.
    pub async fn select_and_send(&self, db: &Database) -> Result<usize> {
        let candidates = db.unnotified().await?;
        let qualifying: Vec<&Listing> = candidates
            .iter()
            .filter(|listing| self.rules.meets_requirements(listing))
            .take(self.rules.max_links)
            .collect();

        if qualifying.is_empty() {
            if let Err(e) = self.notifier.send(NOTHING_NEW).await {
                error!("Failed to send heartbeat notification: {e}");
            }
            return Ok(0);
        }

        let links: Vec<&str> = qualifying.iter().map(|l| l.link.as_str()).collect();
        let message = format!("{HEADER}\n{}", links.join("\n"));

        match self.notifier.send(&message).await {
            Ok(()) => {
                for listing in &qualifying {
                    db.mark_notified(&listing.ref_no).await?;
                }
                info!("Notified about {} listings", qualifying.len());
                Ok(qualifying.len())
            }
            Err(e) => {
                // Flags stay unset, so the batch goes out on the next run.
                error!("Failed to send notification: {e}");
                Ok(0)
            }
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}
