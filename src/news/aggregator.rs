use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::Instrument as _;

use crate::news::article::Article;
use crate::news::fetcher::{FeedOutcome, Fetcher};
use crate::news::processor::Processor;
use crate::news::store::{CategoryBucket, FeedError, RunStats};
use crate::sources::Registry;

/// Result of one fan-out/fan-in run, ready to be stamped into a payload.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub categories: CategoryBucket,
    pub stats: RunStats,
}

pub struct Aggregator {
    fetcher: Arc<Fetcher>,
    processor: Processor,
    per_feed: usize,
}

impl Aggregator {
    pub fn new(fetcher: Arc<Fetcher>, processor: Processor, per_feed: usize) -> Self {
        Self {
            fetcher,
            processor,
            per_feed,
        }
    }

    /// Fetches every feed of every category concurrently. Individual feed
    /// failures are recorded in the stats and never abort the run.
    #[tracing::instrument(name = "aggregate", skip_all)]
    pub async fn run_all(&self, registry: &Registry) -> Aggregation {
        let jobs = registry.jobs();
        let started = Instant::now();

        tracing::info!(feeds = jobs.len(), "fetching fresh news from all sources");

        let handles: Vec<_> = jobs
            .iter()
            .cloned()
            .map(|job| {
                let fetcher = self.fetcher.clone();
                tokio::spawn(async move { fetcher.fetch(&job).await }.in_current_span())
            })
            .collect();

        let settled = futures_util::future::join_all(handles).await;

        let mut raw: CategoryBucket = registry
            .categories()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        let mut stats = RunStats {
            feeds_total: jobs.len(),
            ..RunStats::default()
        };

        for (job, result) in jobs.iter().zip(settled) {
            let outcome = result.unwrap_or_else(|e| FeedOutcome::Failure {
                category: job.category.clone(),
                url: job.url.clone(),
                error: format!("fetch task aborted: {e}"),
            });

            match outcome {
                FeedOutcome::Success {
                    category, articles, ..
                } => {
                    stats.feeds_succeeded += 1;
                    raw.entry(category)
                        .or_default()
                        .extend(articles.into_iter().take(self.per_feed));
                }
                FeedOutcome::Failure {
                    category,
                    url,
                    error,
                } => {
                    stats.feeds_failed += 1;
                    stats.errors.push(FeedError {
                        category,
                        url,
                        error,
                    });
                }
            }
        }

        stats.fetch_time_ms = started.elapsed().as_millis() as u64;

        let now = Utc::now();
        let categories = raw
            .into_iter()
            .map(|(name, articles): (String, Vec<Article>)| {
                (name, self.processor.process(articles, now))
            })
            .collect();

        tracing::info!(
            elapsed_ms = stats.fetch_time_ms,
            "fetch complete, {}/{} feeds OK",
            stats.feeds_succeeded,
            stats.feeds_total
        );
        if !stats.errors.is_empty() {
            tracing::warn!(errors = ?stats.errors, "feed errors");
        }

        Aggregation { categories, stats }
    }
}
