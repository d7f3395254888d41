//! Data models for vehicle listings and Discord webhook payloads

use serde::Serialize;

/// A vehicle listing scraped from the stock list, keyed by reference number.
///
/// Numeric fields are `None` when the source page did not carry a parseable
/// value; text fields are empty strings in that case. `total_price` is
/// always present: a listing whose price cannot be resolved is rejected at
/// extraction time and never constructed.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Listing {
    pub ref_no: String,
    pub year: Option<i64>,
    pub title: String,
    pub mileage: Option<i64>,
    pub engine_size: Option<i64>,
    pub engine_code: String,
    pub model_code: String,
    pub transmission: String,
    pub drive: String,
    pub steering: String,
    pub doors: Option<i64>,
    pub seats: Option<i64>,
    pub fuel_type: String,
    pub auction_grade: String,
    pub total_price: f64,
    pub link: String,
    pub colour: String,
    pub location: String,
    #[sqlx(rename = "sent_to_discord")]
    pub notified: bool,
}

/// Discord webhook message payload
#[derive(Debug, Serialize)]
pub struct DiscordMessage {
    pub content: String,
}

#[cfg(test)]
impl Listing {
    /// A minimal valid listing for tests; override fields as needed.
    pub fn sample(ref_no: &str) -> Self {
        Self {
            ref_no: ref_no.to_string(),
            year: Some(2005),
            title: "TOYOTA COROLLA".to_string(),
            mileage: Some(92_000),
            engine_size: Some(1_500),
            engine_code: "1NZ-FE".to_string(),
            model_code: "NZE121".to_string(),
            transmission: "AT".to_string(),
            drive: "2WD".to_string(),
            steering: "RHD".to_string(),
            doors: Some(4),
            seats: Some(5),
            fuel_type: "Petrol".to_string(),
            auction_grade: "4".to_string(),
            total_price: 4_350.0,
            link: format!("https://example.com/vehicle/{ref_no}"),
            colour: "Silver".to_string(),
            location: "Kobe".to_string(),
            notified: false,
        }
    }
}
