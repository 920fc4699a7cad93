use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;

use crate::config::FetcherConfig;
use crate::news::article::Article;
use crate::sources::FeedJob;

const FEED_ACCEPT: &str = "application/rss+xml, application/xml, text/xml";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("invalid feed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A parsed feed, reduced to what the pipeline keeps.
#[derive(Debug, Clone, Default)]
pub struct RawFeed {
    pub title: Option<String>,
    pub articles: Vec<Article>,
}

impl RawFeed {
    pub fn parse(body: &[u8]) -> Result<Self, FetchError> {
        let feed = feed_rs::parser::parse(body)?;

        Ok(Self {
            title: feed.title.map(|t| t.content),
            articles: feed.entries.into_iter().map(Article::from_entry).collect(),
        })
    }
}

/// Retrieves and parses a single feed endpoint, one attempt per call.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError>;
}

pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError> {
        let response = self.client.get(url).header(ACCEPT, FEED_ACCEPT).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        RawFeed::parse(&body)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`: `base_delay * 2^attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.checked_pow(attempt).unwrap_or(u32::MAX))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FeedOutcome {
    Success {
        category: String,
        url: String,
        articles: Vec<Article>,
    },
    Failure {
        category: String,
        url: String,
        error: String,
    },
}

/// Wraps a [`FeedSource`] with a per-attempt timeout and exponential backoff.
pub struct Fetcher {
    source: Arc<dyn FeedSource>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl Fetcher {
    pub fn new(source: Arc<dyn FeedSource>, retry: RetryPolicy, timeout: Duration) -> Self {
        Self {
            source,
            retry,
            timeout,
        }
    }

    pub fn from_config(source: Arc<dyn FeedSource>, config: &FetcherConfig) -> Self {
        Self::new(
            source,
            RetryPolicy {
                max_retries: config.max_retries,
                base_delay: Duration::from_millis(config.retry_delay_ms),
            },
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Never fails: exhausting the retry budget yields [`FeedOutcome::Failure`].
    pub async fn fetch(&self, job: &FeedJob) -> FeedOutcome {
        let max_retries = self.retry.max_retries;
        let mut attempt = 0;

        loop {
            let result = tokio::time::timeout(self.timeout, self.source.fetch(&job.url)).await;

            let error = match result {
                Ok(Ok(feed)) => {
                    tracing::debug!(
                        url = %job.url,
                        title = feed.title.as_deref().unwrap_or_default(),
                        items = feed.articles.len(),
                        attempt,
                        "fetched feed"
                    );
                    return FeedOutcome::Success {
                        category: job.category.clone(),
                        url: job.url.clone(),
                        articles: feed.articles,
                    };
                }
                Ok(Err(e)) => e,
                Err(_) => FetchError::Timeout(self.timeout),
            };

            if attempt >= max_retries {
                return FeedOutcome::Failure {
                    category: job.category.clone(),
                    url: job.url.clone(),
                    error: error.to_string(),
                };
            }

            let delay = self.retry.delay(attempt);
            tracing::warn!(
                url = %job.url,
                error = %error,
                "retry {}/{} in {}ms",
                attempt + 1,
                max_retries,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
