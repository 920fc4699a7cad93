use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tracing::Instrument as _;

use crate::news::aggregator::{Aggregation, Aggregator};
use crate::news::store::{CachePayload, CacheStore, RunStats};
use crate::sources::Registry;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NewsError {
    #[error("no feed sources configured")]
    EmptyRegistry,
    #[error("aggregation run aborted: {0}")]
    RunAborted(String),
}

/// Introspection of the durable record, without fetching.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_stale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

type SharedRun = Shared<BoxFuture<'static, Result<Arc<CachePayload>, NewsError>>>;

struct InFlight {
    id: u64,
    run: SharedRun,
}

type RunSlot = Arc<Mutex<Option<InFlight>>>;

struct Pipeline {
    aggregator: Aggregator,
    registry: Registry,
    store: Arc<dyn CacheStore>,
    last_timestamp: AtomicI64,
    seeded: OnceCell<()>,
}

impl Pipeline {
    async fn run(&self) -> Result<CachePayload, NewsError> {
        if self.registry.is_empty() {
            return Err(NewsError::EmptyRegistry);
        }

        self.seed_timestamp().await;

        let Aggregation { categories, stats } = self.aggregator.run_all(&self.registry).await;
        let payload = CachePayload::new(self.stamp(), stats, categories);

        // The payload is still served when persistence fails; the next
        // request will find no record and fetch again.
        if let Err(e) = self.store.write(&payload).await {
            tracing::error!(error = %e, "failed to write cache, serving in-memory result");
        }

        Ok(payload)
    }

    /// Raises the high-water mark to the stored record's timestamp, once per
    /// process.
    async fn seed_timestamp(&self) {
        self.seeded
            .get_or_init(|| async {
                if let Ok(Some(stored)) = self.store.read().await {
                    self.last_timestamp.fetch_max(stored.timestamp, Ordering::SeqCst);
                }
            })
            .await;
    }

    /// Current instant, never earlier than a previous stamp.
    fn stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let previous = self
            .last_timestamp
            .fetch_max(now.timestamp_millis(), Ordering::SeqCst);

        if previous > now.timestamp_millis() {
            DateTime::from_timestamp_millis(previous).unwrap_or(now)
        } else {
            now
        }
    }
}

/// TTL-governed front of the aggregation pipeline. At most one run is in
/// flight at a time; concurrent callers share its result.
pub struct NewsCache {
    pipeline: Arc<Pipeline>,
    ttl: Duration,
    in_flight: RunSlot,
    next_run: AtomicU64,
}

impl NewsCache {
    pub fn new(
        aggregator: Aggregator,
        registry: Registry,
        store: Arc<dyn CacheStore>,
        ttl: Duration,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                aggregator,
                registry,
                store,
                last_timestamp: AtomicI64::new(i64::MIN),
                seeded: OnceCell::new(),
            }),
            ttl,
            in_flight: Arc::new(Mutex::new(None)),
            next_run: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the stored payload while fresh, unless `force` is set.
    /// Otherwise runs the aggregation and returns its payload whether or
    /// not it could be persisted.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, force: bool) -> Result<Arc<CachePayload>, NewsError> {
        if !force {
            if let Some(payload) = self.read_fresh().await {
                tracing::info!(last_updated = %payload.last_updated, "serving cached news");
                return Ok(Arc::new(payload));
            }
        }

        self.refresh().await
    }

    pub async fn info(&self) -> CacheInfo {
        let payload = match self.pipeline.store.read().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return CacheInfo::default(),
            Err(e) => {
                tracing::debug!(error = %e, "cache record unreadable");
                return CacheInfo::default();
            }
        };

        let age = payload.age(Utc::now());
        let age_ms = age.as_millis() as u64;

        CacheInfo {
            exists: true,
            last_updated: Some(payload.last_updated),
            age_ms: Some(age_ms),
            age_hours: Some((age_ms as f64 / 360_000.0).round() / 10.0),
            is_stale: Some(age >= self.ttl),
            stats: Some(payload.stats),
        }
    }

    async fn read_fresh(&self) -> Option<CachePayload> {
        match self.pipeline.store.read().await {
            Ok(Some(payload)) if payload.is_fresh(Utc::now(), self.ttl) => Some(payload),
            Ok(Some(payload)) => {
                tracing::debug!(last_updated = %payload.last_updated, "cache record is stale");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable cache record");
                None
            }
        }
    }

    async fn refresh(&self) -> Result<Arc<CachePayload>, NewsError> {
        let run = {
            let mut slot = self.in_flight.lock().await;
            match slot.as_ref() {
                Some(current) => {
                    tracing::debug!(run = current.id, "joining in-flight refresh");
                    current.run.clone()
                }
                None => {
                    let id = self.next_run.fetch_add(1, Ordering::Relaxed);
                    let run = self.spawn_run(id);
                    *slot = Some(InFlight {
                        id,
                        run: run.clone(),
                    });
                    run
                }
            }
        };

        run.await
    }

    /// The run lives on its own task so callers going away do not cancel it.
    /// That task empties the slot once the run settles, whether or not anyone
    /// is still waiting on it.
    fn spawn_run(&self, id: u64) -> SharedRun {
        let pipeline = self.pipeline.clone();
        let slot = self.in_flight.clone();

        let handle = tokio::spawn(
            async move {
                let run = tokio::spawn(async move { pipeline.run().await }.in_current_span());
                let result = match run.await {
                    Ok(result) => result.map(Arc::new),
                    Err(e) => Err(NewsError::RunAborted(e.to_string())),
                };

                let mut slot = slot.lock().await;
                if slot.as_ref().is_some_and(|current| current.id == id) {
                    *slot = None;
                }

                result
            }
            .in_current_span(),
        );

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(NewsError::RunAborted(e.to_string())),
            }
        }
        .boxed()
        .shared()
    }
}
