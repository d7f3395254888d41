use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;

use crate::traits::FetchPage;

/// Production page fetcher on top of reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36")
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FetchPage for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        // A reqwest status error here lets the walker tell "the server
        // rejected this page" apart from a transport hiccup.
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }
}

impl Clone for HttpFetcher {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
        }
    }
}
