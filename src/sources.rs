use serde::{Deserialize, Serialize};

/// A named group of feed endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCategory {
    pub name: String,
    #[serde(default)]
    pub feeds: Vec<String>,
}

/// One unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedJob {
    pub category: String,
    pub url: String,
}

/// Read-only mapping from category name to its ordered feed URLs.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    categories: Vec<SourceCategory>,
}

impl Registry {
    pub fn new(categories: Vec<SourceCategory>) -> Self {
        Self { categories }
    }

    /// Uses `configured` when it names at least one category, otherwise the
    /// built-in Google News searches.
    pub fn from_config(configured: &[SourceCategory]) -> Self {
        if configured.is_empty() {
            Self::builtin()
        } else {
            Self::new(configured.to_vec())
        }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(name, feeds)| SourceCategory {
                    name: (*name).to_string(),
                    feeds: feeds.iter().map(google_news_url).collect(),
                })
                .collect(),
        )
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|c| c.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// One job per (category, url) pair, in registry order.
    pub fn jobs(&self) -> Vec<FeedJob> {
        self.categories
            .iter()
            .flat_map(|c| {
                c.feeds.iter().map(move |url| FeedJob {
                    category: c.name.clone(),
                    url: url.clone(),
                })
            })
            .collect()
    }
}

struct Search {
    query: &'static str,
    region: Region,
}

#[derive(Clone, Copy)]
enum Region {
    Us,
    Ca,
}

impl Region {
    fn params(self) -> &'static str {
        match self {
            Self::Us => "hl=en-US&gl=US&ceid=US:en",
            Self::Ca => "hl=en-CA&gl=CA&ceid=CA:en",
        }
    }
}

fn google_news_url(search: &Search) -> String {
    format!(
        "https://news.google.com/rss/search?q={}&{}",
        search.query,
        search.region.params()
    )
}

const fn us(query: &'static str) -> Search {
    Search { query, region: Region::Us }
}

const fn ca(query: &'static str) -> Search {
    Search { query, region: Region::Ca }
}

static BUILTIN: &[(&str, &[Search])] = &[
    (
        "Vertical Software & Private Equity",
        &[us("vertical+software+private+equity"), us("software+buyout+private+equity")],
    ),
    (
        "Layoffs & Hiring in Canada",
        &[ca("layoffs+canada"), ca("hiring+trends+canada")],
    ),
    (
        "CEO Talent Insights",
        &[us("CEO+talent+leadership"), us("executive+hiring+trends")],
    ),
    (
        "Talent Intelligence",
        &[us("talent+intelligence+HR+analytics"), us("workforce+analytics+talent")],
    ),
    (
        "LinkedIn Insights",
        &[us("linkedin+data+insights"), us("linkedin+hiring+trends")],
    ),
    (
        "Tech & AI Startups in Canada",
        &[ca("AI+startups+canada"), ca("tech+startups+toronto+vancouver")],
    ),
];
