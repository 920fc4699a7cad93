use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;

use crate::config::Config;
use crate::news::aggregator::Aggregator;
use crate::news::fetcher::{Fetcher, HttpFeedSource};
use crate::news::processor::Processor;
use crate::news::store::{CacheStore, FileStore, MemoryStore};
use crate::news::NewsCache;
use crate::sources::Registry;

pub struct Global {
    pub config: Config,
    pub news: NewsCache,
    pub started_at: std::time::Instant,
}

impl Global {
    pub fn init(config: Config) -> anyhow::Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.fetcher.user_agent)
            .timeout(Duration::from_secs(config.fetcher.timeout_secs))
            .build()
            .context("http client")?;

        let registry = Registry::from_config(&config.sources);
        tracing::info!(
            categories = registry.categories().count(),
            feeds = registry.jobs().len(),
            "loaded source registry"
        );

        let store: Arc<dyn CacheStore> = if config.cache.persist {
            tracing::info!(path = %config.cache.path, "persisting news cache to disk");
            Arc::new(FileStore::new(&config.cache.path))
        } else {
            tracing::info!("news cache is memory only");
            Arc::new(MemoryStore::new())
        };

        let fetcher = Fetcher::from_config(Arc::new(HttpFeedSource::new(http_client)), &config.fetcher);
        let aggregator = Aggregator::new(
            Arc::new(fetcher),
            Processor::from_limits(&config.limits),
            config.limits.per_feed,
        );
        let news = NewsCache::new(
            aggregator,
            registry,
            store,
            Duration::from_secs(config.cache.ttl_secs),
        );

        Ok(Self::new(config, news))
    }

    pub fn new(config: Config, news: NewsCache) -> Arc<Self> {
        Arc::new(Self {
            config,
            news,
            started_at: std::time::Instant::now(),
        })
    }
}
