use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Runtime configuration, read once from the environment at startup and
/// passed explicitly to every component.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listing page URL template with a `{page}` placeholder.
    pub base_url: String,
    /// Number of listing pages to walk per run.
    pub num_pages: u32,
    /// Pause before each page fetch.
    pub delay: Duration,
    /// Retry budget per page on transient fetch failure.
    pub max_retries: u32,
    /// Latest eligible model year before the yearly increment kicks in.
    pub base_year: i64,
    /// Calendar year from which the threshold grows by one per year.
    pub start_increment_year: i64,
    /// Commit buffered inserts every this many successful pages.
    pub commit_every: u32,
    pub database_url: String,
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_url: env::var("BASE_URL").context("BASE_URL is not set")?,
            num_pages: env::var("NUM_PAGES")
                .context("NUM_PAGES is not set")?
                .parse()
                .context("NUM_PAGES must be an integer")?,
            delay: Duration::from_secs(
                env::var("DELAY")
                    .context("DELAY is not set")?
                    .parse()
                    .context("DELAY must be an integer (seconds)")?,
            ),
            max_retries: env::var("MAX_RETRIES")
                .context("MAX_RETRIES is not set")?
                .parse()
                .context("MAX_RETRIES must be an integer")?,
            base_year: parse_or("BASE_YEAR", 2009)?,
            start_increment_year: parse_or("START_INCREMENT_YEAR", 2024)?,
            commit_every: parse_or("COMMIT_EVERY", 20)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:vehicles.db".to_string()),
            webhook_url: env::var("DISCORD_WEBHOOK_URL").ok(),
        })
    }

    pub fn page_url(&self, page_number: u32) -> String {
        self.base_url.replace("{page}", &page_number.to_string())
    }

    /// Latest model year eligible for storage. The base year is bumped by
    /// one per calendar year elapsed since `start_increment_year`, so the
    /// rule does not need a config change every January.
    pub fn year_threshold(&self, current_year: i64) -> i64 {
        if current_year >= self.start_increment_year {
            self.base_year + (current_year - self.start_increment_year + 1)
        } else {
            self.base_year
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("{key} is not a valid value")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_years(base_year: i64, start_increment_year: i64) -> Config {
        Config {
            base_url: "https://example.com/stocklist/page_{page}".to_string(),
            num_pages: 5,
            delay: Duration::from_secs(0),
            max_retries: 3,
            base_year,
            start_increment_year,
            commit_every: 20,
            database_url: "sqlite::memory:".to_string(),
            webhook_url: None,
        }
    }

    #[test]
    fn threshold_is_base_year_before_increment_start() {
        let config = config_with_years(2009, 2024);
        assert_eq!(config.year_threshold(2023), 2009);
    }

    #[test]
    fn threshold_grows_one_per_year_from_increment_start() {
        let config = config_with_years(2009, 2024);
        assert_eq!(config.year_threshold(2024), 2010);
        assert_eq!(config.year_threshold(2026), 2012);
    }

    #[test]
    fn page_url_substitutes_page_number() {
        let config = config_with_years(2009, 2024);
        assert_eq!(
            config.page_url(3),
            "https://example.com/stocklist/page_3"
        );
    }
}
