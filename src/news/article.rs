use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Label used when neither the entry nor its title names a publisher.
pub const DEFAULT_SOURCE: &str = "Google News";

static TRAILING_SOURCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" - ([^-]+)$").expect("valid source regex"));
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Identity of the article; duplicates are collapsed on this.
    pub link: String,
    /// Publish date as carried by the feed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    pub source: String,
    #[serde(default)]
    pub description: String,
}

impl Article {
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.pub_date.as_deref().and_then(parse_date)
    }

    pub(crate) fn from_entry(entry: feed_rs::model::Entry) -> Self {
        let title = entry.title.map(|t| t.content).unwrap_or_default();
        let link = entry
            .links
            .into_iter()
            .next()
            .map(|l| l.href)
            .unwrap_or_default();
        let pub_date = entry.published.or(entry.updated).map(|d| d.to_rfc2822());
        let source = entry
            .authors
            .into_iter()
            .map(|p| p.name)
            .find(|n| !n.trim().is_empty())
            .unwrap_or_else(|| extract_source(&title));
        let description = entry
            .summary
            .map(|t| t.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|html| snippet(&html))
            .unwrap_or_default();

        Self {
            title,
            link,
            pub_date,
            source,
            description,
        }
    }
}

/// Accepts RFC 2822 (RSS) and RFC 3339 (Atom) dates.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Google News titles end in `" - Publisher"`.
pub fn extract_source(title: &str) -> String {
    TRAILING_SOURCE
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string())
}

/// Plain-text rendering of an HTML fragment.
pub fn snippet(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}
