pub mod extractor;
pub mod sources;

pub use extractor::extract_content;
pub use sources::{default_sources, load_sources, Source};

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Timeout fetching: {0}")]
    Timeout(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Blocked (Status {status}) for {url}")]
    Blocked { status: u16, url: String },
    #[error("No content extracted from: {0}")]
    NoContent(String),
}

/// Anything that can turn a URL into cleaned page text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn scrape_url(&self, url: &str) -> Result<String, FetchError>;
}

/// One GET per page with a browser user agent and a fixed timeout.
/// Failures are returned to the caller; nothing is retried.
#[derive(Clone)]
pub struct WebScraper {
    client: Client,
}

impl WebScraper {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        Ok(Self { client })
    }

    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        log::debug!("Fetching {}", url);

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Http(e.to_string())
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Blocked { status: status.as_u16(), url: url.to_string() });
        }

        response.text().await.map_err(|e| FetchError::Http(e.to_string()))
    }
}

#[async_trait]
impl PageFetcher for WebScraper {
    async fn scrape_url(&self, url: &str) -> Result<String, FetchError> {
        let html = self.fetch_html(url).await?;
        extract_content(&html).ok_or_else(|| FetchError::NoContent(url.to_string()))
    }
}
