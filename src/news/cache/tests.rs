use std::sync::atomic::Ordering;

use chrono::Duration as ChronoDuration;
use tracing_test::traced_test;

use super::*;
use crate::news::fetcher::{Fetcher, RetryPolicy};
use crate::news::processor::Processor;
use crate::news::store::{CategoryBucket, FileStore, MemoryStore};
use crate::news::testing::{article, FailingStore, ScriptedSource};
use crate::sources::SourceCategory;

const FEED: &str = "https://feed.example/rss";
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

fn single_feed_registry() -> Registry {
    Registry::new(vec![SourceCategory {
        name: "X".into(),
        feeds: vec![FEED.into()],
    }])
}

fn news_cache(source: Arc<ScriptedSource>, store: Arc<dyn CacheStore>) -> NewsCache {
    let fetcher = Fetcher::new(
        source,
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        },
        Duration::from_secs(1),
    );
    let aggregator = Aggregator::new(Arc::new(fetcher), Processor::default(), 5);

    NewsCache::new(aggregator, single_feed_registry(), store, DAY)
}

fn working_source() -> Arc<ScriptedSource> {
    Arc::new(ScriptedSource::new().feed(FEED, vec![article("L1", Utc::now())]))
}

fn record_aged(age: ChronoDuration) -> CachePayload {
    let mut categories = CategoryBucket::new();
    categories.insert("X".into(), vec![article("OLD", Utc::now() - age)]);
    CachePayload::new(Utc::now() - age, RunStats::default(), categories)
}

#[tokio::test]
async fn fresh_record_is_served_without_fetching() {
    let source = working_source();
    let cache = news_cache(source.clone(), Arc::new(MemoryStore::new()));

    let first = cache.get(false).await.unwrap();
    let second = cache.get(false).await.unwrap();

    assert_eq!(source.total_calls(), 1);
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(second.categories["X"][0].link, "L1");
}

#[tokio::test]
async fn forced_refresh_always_runs() {
    let source = working_source();
    let cache = news_cache(source.clone(), Arc::new(MemoryStore::new()));

    let first = cache.get(false).await.unwrap();
    let forced = cache.get(true).await.unwrap();
    let again = cache.get(true).await.unwrap();

    assert_eq!(source.total_calls(), 3);
    assert!(forced.timestamp >= first.timestamp);
    assert!(again.timestamp >= forced.timestamp);
}

#[tokio::test]
async fn stale_record_triggers_aggregation() {
    let source = working_source();
    let store = Arc::new(MemoryStore::with_record(record_aged(ChronoDuration::hours(30))));
    let cache = news_cache(source.clone(), store.clone());

    let payload = cache.get(false).await.unwrap();

    assert_eq!(source.total_calls(), 1);
    assert_eq!(payload.categories["X"][0].link, "L1");
    let stored = store.read().await.unwrap().map(|p| p.timestamp);
    assert_eq!(stored, Some(payload.timestamp));
}

#[tokio::test]
async fn record_within_ttl_is_returned_unchanged() {
    let source = working_source();
    let record = record_aged(ChronoDuration::hours(23));
    let cache = news_cache(source.clone(), Arc::new(MemoryStore::with_record(record.clone())));

    let payload = cache.get(false).await.unwrap();

    assert_eq!(source.total_calls(), 0);
    assert_eq!(*payload, record);
}

#[tokio::test]
#[traced_test]
async fn persistence_failure_still_serves_and_refetches() {
    let source = working_source();
    let store = Arc::new(FailingStore::default());
    let cache = news_cache(source.clone(), store.clone());

    let first = cache.get(false).await.unwrap();
    let second = cache.get(false).await.unwrap();

    assert_eq!(first.categories["X"].len(), 1);
    assert_eq!(second.categories["X"].len(), 1);
    assert_eq!(source.total_calls(), 2);
    assert_eq!(store.writes.load(Ordering::SeqCst), 2);
    assert!(!cache.info().await.exists);
    assert!(logs_contain("failed to write cache"));
}

#[tokio::test]
async fn corrupt_record_is_a_cache_miss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("news.json");
    std::fs::write(&path, b"not json at all").unwrap();

    let source = working_source();
    let cache = news_cache(source.clone(), Arc::new(FileStore::new(&path)));

    assert_eq!(cache.info().await, CacheInfo::default());

    let payload = cache.get(false).await.unwrap();
    assert_eq!(source.total_calls(), 1);

    let info = cache.info().await;
    assert!(info.exists);
    assert_eq!(info.is_stale, Some(false));
    assert_eq!(info.last_updated.as_deref(), Some(payload.last_updated.as_str()));
}

#[tokio::test]
async fn info_reports_staleness_at_ttl_boundary() {
    let source = working_source();

    let expired = news_cache(
        source.clone(),
        Arc::new(MemoryStore::with_record(record_aged(ChronoDuration::hours(24)))),
    );
    let info = expired.info().await;
    assert!(info.exists);
    assert_eq!(info.is_stale, Some(true));
    assert_eq!(info.age_hours, Some(24.0));

    let fresh = news_cache(
        source.clone(),
        Arc::new(MemoryStore::with_record(record_aged(ChronoDuration::hours(23)))),
    );
    assert_eq!(fresh.info().await.is_stale, Some(false));

    assert_eq!(source.total_calls(), 0);
}

#[tokio::test]
async fn concurrent_refreshes_share_one_run() {
    let source = Arc::new(ScriptedSource::new().slow(
        FEED,
        Duration::from_millis(100),
        vec![article("L1", Utc::now())],
    ));
    let cache = Arc::new(news_cache(source.clone(), Arc::new(MemoryStore::new())));

    let callers: Vec<_> = (0..5)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get(i % 2 == 0).await })
        })
        .collect();

    let mut timestamps = Vec::new();
    for caller in callers {
        timestamps.push(caller.await.unwrap().unwrap().timestamp);
    }

    assert_eq!(source.total_calls(), 1);
    assert!(timestamps.windows(2).all(|w| w[0] == w[1]));
}

#[tokio::test]
async fn abandoned_refresh_does_not_satisfy_the_next_one() {
    let source = Arc::new(ScriptedSource::new().slow(
        FEED,
        Duration::from_millis(50),
        vec![article("L1", Utc::now())],
    ));
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(news_cache(source.clone(), store.clone()));

    let abandoned = tokio::spawn({
        let cache = cache.clone();
        async move { cache.get(true).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    abandoned.abort();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(source.total_calls(), 1);
    let finished = store.read().await.unwrap().map(|p| p.timestamp);
    assert!(finished.is_some());

    let forced = cache.get(true).await.unwrap();

    assert_eq!(source.total_calls(), 2);
    assert!(Some(forced.timestamp) > finished);
}

#[tokio::test]
async fn new_timestamps_never_fall_behind_the_stored_record() {
    let ahead = record_aged(ChronoDuration::hours(-1));
    let cache = news_cache(working_source(), Arc::new(MemoryStore::with_record(ahead.clone())));

    let payload = cache.get(true).await.unwrap();

    assert!(payload.timestamp >= ahead.timestamp);
    assert_ne!(payload.categories["X"][0].link, "OLD");
}

#[tokio::test]
async fn empty_registry_is_an_error() {
    let fetcher = Fetcher::new(working_source(), RetryPolicy::default(), Duration::from_secs(1));
    let cache = NewsCache::new(
        Aggregator::new(Arc::new(fetcher), Processor::default(), 5),
        Registry::default(),
        Arc::new(MemoryStore::new()),
        DAY,
    );

    assert!(matches!(cache.get(false).await, Err(NewsError::EmptyRegistry)));
}
