use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::config::LimitsConfig;
use crate::news::article::Article;

/// Cleans one category's raw articles: dedup, recency filter, sort, cap.
#[derive(Debug, Clone, Copy)]
pub struct Processor {
    pub max_articles: usize,
    pub max_age: Duration,
}

impl Default for Processor {
    fn default() -> Self {
        Self {
            max_articles: 8,
            max_age: Duration::days(30),
        }
    }
}

impl Processor {
    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self {
            max_articles: limits.per_category,
            max_age: Duration::days(limits.max_age_days),
        }
    }

    pub fn process(&self, articles: Vec<Article>, now: DateTime<Utc>) -> Vec<Article> {
        let cutoff = now - self.max_age;

        let mut dated: Vec<(DateTime<Utc>, Article)> = dedup_by_link(articles)
            .into_iter()
            .filter_map(|a| a.published_at().map(|at| (at, a)))
            .filter(|(at, _)| *at >= cutoff)
            .collect();

        dated.sort_by(|(a, _), (b, _)| b.cmp(a));
        dated.truncate(self.max_articles);

        dated.into_iter().map(|(_, a)| a).collect()
    }
}

/// Last occurrence of a link supplies the article; the first occurrence fixes
/// its position.
fn dedup_by_link(articles: Vec<Article>) -> Vec<Article> {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(articles.len());
    let mut unique: Vec<Article> = Vec::with_capacity(articles.len());

    for article in articles {
        match index.get(&article.link) {
            Some(&i) => unique[i] = article,
            None => {
                index.insert(article.link.clone(), unique.len());
                unique.push(article);
            }
        }
    }

    unique
}
