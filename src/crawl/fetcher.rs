//! Page fetching
//!
//! The crawl loop only sees the [`Fetch`] trait. [`HttpFetcher`] is the
//! reqwest-backed implementation used by the binary; tests substitute an
//! in-memory site.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::CrawlConfig;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Content too large: {0} bytes")]
    ContentTooLarge(usize),
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
}

/// Raw fetch result handed to the parser
///
/// Missing content or content type means the page cannot be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedPage {
    /// The requested URL
    pub url: String,
    /// Where redirects ended, if anywhere else
    pub final_url: Option<String>,
    pub content: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

impl FetchedPage {
    /// URL that relative links resolve against
    pub fn effective_url(&self) -> &str {
        self.final_url.as_deref().unwrap_or(&self.url)
    }
}

/// Source of page bytes
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// HTTP fetcher built on a shared reqwest client
pub struct HttpFetcher {
    client: reqwest::Client,
    max_content_size: usize,
}

impl HttpFetcher {
    pub fn new(config: &CrawlConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            max_content_size: config.max_content_size,
        })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        let response = self.client.get(parsed).send().await?;

        let status = response.status();
        let final_url = response.url().as_str();
        let final_url = (final_url != url).then(|| final_url.to_string());

        if !status.is_success() {
            debug!("{} returned {}", url, status);
            return Ok(FetchedPage {
                url: url.to_string(),
                final_url,
                content: None,
                content_type: None,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        if let Some(len) = response.content_length() {
            if len as usize > self.max_content_size {
                return Err(FetchError::ContentTooLarge(len as usize));
            }
        }

        let body = response.bytes().await?;
        if body.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(body.len()));
        }

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            content: Some(body.to_vec()),
            content_type,
        })
    }
}
