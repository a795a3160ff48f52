//! News record

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use url::Url;
use validator::Validate;

use super::paper::collapse_whitespace;

/// Maximum age of a news item at insert time
pub const NEWS_FRESHNESS_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    /// Surrogate key, zero until stored
    pub id: i64,

    #[validate(length(min = 1, max = 1000))]
    pub title: String,

    pub link: String,

    /// Feed or publisher name
    pub source: String,

    /// Upstream family: `rss`, `newsapi`, `orz`, ...
    pub platform: String,

    pub author: Option<String>,

    pub description: Option<String>,

    pub image_url: Option<String>,

    pub tags: BTreeSet<String>,

    pub published_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl NewsItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        source: impl Into<String>,
        platform: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            title: collapse_whitespace(&title.into()),
            link: link.into().trim().to_string(),
            source: source.into(),
            platform: platform.into(),
            author: None,
            description: None,
            image_url: None,
            tags: BTreeSet::new(),
            published_at,
            created_at: Utc::now(),
        }
    }

    /// Exact dedup key: hash of the normalized link, or of the title when
    /// the item carries no link
    pub fn dedup_key(&self) -> String {
        let basis = if self.link.is_empty() {
            format!("title:{}", self.title.to_lowercase())
        } else {
            format!("link:{}", normalize_link(&self.link))
        };
        hex::encode(Sha256::digest(basis.as_bytes()))
    }

    /// True when the item is still inside the freshness window at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.published_at <= Duration::hours(NEWS_FRESHNESS_HOURS)
    }

    /// Publication time rendered in the audience's local offset
    pub fn published_local(&self, offset_hours: i32) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap_or_else(|| Utc.fix());
        self.published_at.with_timezone(&offset)
    }
}

/// Canonical form of a link for exact dedup.
///
/// Lowercases scheme and host (the `url` crate does this), drops the
/// fragment and a trailing slash. Unparseable links are trimmed and lowercased.
pub fn normalize_link(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut url) => {
            url.set_fragment(None);
            let mut text = url.to_string();
            if text.ends_with('/') && url.path() != "/" {
                text.pop();
            } else if url.path() == "/" && url.query().is_none() {
                text = text.trim_end_matches('/').to_string();
            }
            text
        }
        Err(_) => raw.trim().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_link() {
        assert_eq!(
            normalize_link("HTTPS://Example.COM/post/1/#comments"),
            "https://example.com/post/1"
        );
        assert_eq!(normalize_link("https://example.com/"), "https://example.com");
        assert_eq!(
            normalize_link("https://example.com/a?b=1"),
            "https://example.com/a?b=1"
        );
        assert_eq!(normalize_link("  not a url "), "not a url");
    }

    #[test]
    fn test_dedup_key_ignores_link_cosmetics() {
        let now = Utc::now();
        let a = NewsItem::new("A", "https://example.com/x", "Feed", "rss", now);
        let b = NewsItem::new("B", "HTTPS://EXAMPLE.com/x/#top", "Feed", "rss", now);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_dedup_key_falls_back_to_title() {
        let now = Utc::now();
        let a = NewsItem::new("Same Title", "", "Feed", "orz", now);
        let b = NewsItem::new("same title", "", "Other", "orz", now);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn test_freshness_window() {
        let now = Utc::now();
        let fresh = NewsItem::new("t", "https://e.com/1", "f", "rss", now - Duration::hours(23));
        let stale = NewsItem::new("t", "https://e.com/2", "f", "rss", now - Duration::hours(25));
        assert!(fresh.is_fresh(now));
        assert!(!stale.is_fresh(now));
    }

    #[test]
    fn test_published_local_shifts_offset() {
        let utc = DateTime::parse_from_rfc3339("2025-01-01T20:00:00Z").unwrap().to_utc();
        let item = NewsItem::new("t", "https://e.com/1", "f", "rss", utc);
        assert_eq!(item.published_local(8).format("%Y-%m-%d %H:%M").to_string(), "2025-01-02 04:00");
    }
}
