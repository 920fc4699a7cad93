pub mod aggregator;
pub mod article;
pub mod cache;
pub mod fetcher;
pub mod processor;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use article::Article;
pub use cache::{CacheInfo, NewsCache, NewsError};
pub use store::{CachePayload, RunStats};
