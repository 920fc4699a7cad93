use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::news::article::Article;

/// Processed articles keyed by category name, in registry order.
pub type CategoryBucket = IndexMap<String, Vec<Article>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedError {
    pub category: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub fetch_time_ms: u64,
    pub feeds_total: usize,
    pub feeds_succeeded: usize,
    pub feeds_failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FeedError>,
}

/// Snapshot of one completed aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePayload {
    /// Creation instant, epoch milliseconds.
    pub timestamp: i64,
    pub last_updated: String,
    pub stats: RunStats,
    pub categories: CategoryBucket,
}

impl CachePayload {
    pub fn new(created_at: DateTime<Utc>, stats: RunStats, categories: CategoryBucket) -> Self {
        Self {
            timestamp: created_at.timestamp_millis(),
            last_updated: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            stats,
            categories,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        let millis = now.timestamp_millis().saturating_sub(self.timestamp);
        Duration::from_millis(millis.max(0) as u64)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed cache record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Durable home of the latest [`CachePayload`].
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    async fn read(&self) -> Result<Option<CachePayload>, StoreError>;
    async fn write(&self, payload: &CachePayload) -> Result<(), StoreError>;
}

/// Single pretty-printed JSON file.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn read(&self) -> Result<Option<CachePayload>, StoreError> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&raw)?))
    }

    async fn write(&self, payload: &CachePayload) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let body = serde_json::to_vec_pretty(payload)?;
        tokio::fs::write(&self.path, body).await?;

        tracing::debug!(path = %self.path.display(), "wrote cache record");
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    record: RwLock<Option<CachePayload>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(payload: CachePayload) -> Self {
        Self {
            record: RwLock::new(Some(payload)),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn read(&self) -> Result<Option<CachePayload>, StoreError> {
        Ok(self.record.read().await.clone())
    }

    async fn write(&self, payload: &CachePayload) -> Result<(), StoreError> {
        *self.record.write().await = Some(payload.clone());
        Ok(())
    }
}
