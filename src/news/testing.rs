//! Scripted feed sources and stores shared by the pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;

use crate::news::article::Article;
use crate::news::fetcher::{FeedSource, FetchError, RawFeed};
use crate::news::store::{CachePayload, CacheStore, StoreError};

pub fn article(link: &str, published: DateTime<Utc>) -> Article {
    Article {
        title: format!("{link} - Example Wire"),
        link: link.to_string(),
        pub_date: Some(published.to_rfc2822()),
        source: "Example Wire".into(),
        description: String::new(),
    }
}

#[derive(Clone)]
enum Script {
    Feed(Vec<Article>),
    Fail,
    Flaky(usize, Vec<Article>),
    Slow(Duration, Vec<Article>),
}

#[derive(Default)]
pub struct ScriptedSource {
    scripts: HashMap<String, Script>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(mut self, url: &str, articles: Vec<Article>) -> Self {
        self.scripts.insert(url.into(), Script::Feed(articles));
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.scripts.insert(url.into(), Script::Fail);
        self
    }

    /// Fails `failures` times, then serves `articles`.
    pub fn flaky(mut self, url: &str, failures: usize, articles: Vec<Article>) -> Self {
        self.scripts.insert(url.into(), Script::Flaky(failures, articles));
        self
    }

    pub fn slow(mut self, url: &str, delay: Duration, articles: Vec<Article>) -> Self {
        self.scripts.insert(url.into(), Script::Slow(delay, articles));
        self
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for ScriptedSource {
    async fn fetch(&self, url: &str) -> Result<RawFeed, FetchError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(url.to_string()).or_insert(0);
            *n += 1;
            *n
        };

        let articles = match self.scripts.get(url).cloned() {
            Some(Script::Feed(articles)) => articles,
            Some(Script::Flaky(failures, articles)) if call > failures => articles,
            Some(Script::Slow(delay, articles)) => {
                tokio::time::sleep(delay).await;
                articles
            }
            Some(Script::Fail) | Some(Script::Flaky(..)) => {
                return Err(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE))
            }
            None => return Err(FetchError::Status(StatusCode::NOT_FOUND)),
        };

        Ok(RawFeed {
            title: None,
            articles,
        })
    }
}

/// A store whose writes always fail and which never holds a record.
#[derive(Default)]
pub struct FailingStore {
    pub writes: AtomicUsize,
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn read(&self) -> Result<Option<CachePayload>, StoreError> {
        Ok(None)
    }

    async fn write(&self, _payload: &CachePayload) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only file system",
        )))
    }
}
