//! Upstream source adapters
//!
//! Each adapter turns one provider's wire format into [`CanonicalRecord`]s.
//! The [`Fetcher`](crate::fetcher::Fetcher) drives adapters unit by unit:
//! `work_units` lists the schedulable pieces of a pass and `fetch` runs
//! one of them. Record-level problems (a bad date, an empty title) are
//! logged and dropped inside the adapter; an `Err` means the whole unit
//! failed.

pub mod arxiv;
pub mod filter;
pub mod github;
pub mod newsapi;
pub mod orz;
pub mod rss;
pub mod video;

pub use arxiv::ArxivAdapter;
pub use filter::KeywordFilter;
pub use github::GithubReadmeAdapter;
pub use newsapi::NewsApiAdapter;
pub use orz::OrzAdapter;
pub use rss::RssAdapter;
pub use video::VideoAdapter;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use robodigest_common::config::{FetchConfig, GithubRepoConfig, KeywordQuery};
use robodigest_common::{CanonicalRecord, SharedStore, SourceKind};
use tokio_util::sync::CancellationToken;

use crate::errors::FetchError;

/// Everything one pass shares with the adapters it drives
#[derive(Clone)]
pub struct FetchContext {
    pub cancel: CancellationToken,
    pub config: FetchConfig,
    pub store: SharedStore,
    /// Reference instant for date windows and freshness checks
    pub now: DateTime<Utc>,
}

impl FetchContext {
    pub fn new(cancel: CancellationToken, config: FetchConfig, store: SharedStore) -> Self {
        Self {
            cancel,
            config,
            store,
            now: Utc::now(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What a work unit points at
#[derive(Debug, Clone, PartialEq)]
pub enum UnitTarget {
    /// The adapter's whole configured source list in one go
    All,
    Keyword(KeywordQuery),
    Channel(i64),
    Repo(GithubRepoConfig),
}

/// The smallest schedulable piece of a pass
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    /// Human-readable name shown as the progress `currentKey`
    pub key: String,
    pub target: UnitTarget,
}

impl WorkUnit {
    pub fn all(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            target: UnitTarget::All,
        }
    }

    pub fn keyword(query: KeywordQuery) -> Self {
        Self {
            key: query.label.clone(),
            target: UnitTarget::Keyword(query),
        }
    }

    pub fn channel(uid: i64) -> Self {
        Self {
            key: uid.to_string(),
            target: UnitTarget::Channel(uid),
        }
    }

    pub fn repo(repo: GithubRepoConfig) -> Self {
        Self {
            key: format!("{}/{}", repo.owner, repo.repo),
            target: UnitTarget::Repo(repo),
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider name used in logs and metrics
    fn name(&self) -> &'static str;

    /// The pass this adapter contributes to
    fn kind(&self) -> SourceKind;

    /// Units in run order. An adapter with nothing to do (for example a
    /// missing credential) returns an empty list.
    fn work_units(&self, ctx: &FetchContext) -> Vec<WorkUnit>;

    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError>;
}

/// Parse the timestamp shapes upstream feeds use.
///
/// Zoned forms (RFC 2822, RFC 3339) keep their offset; naive forms are
/// read as UTC; bare integers are epoch seconds, or milliseconds when
/// they are too large to be seconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.to_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.to_utc());
    }
    if let Ok(epoch) = raw.parse::<i64>() {
        return if epoch > 100_000_000_000 {
            DateTime::from_timestamp_millis(epoch)
        } else {
            DateTime::from_timestamp(epoch, 0)
        };
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
    {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Reject a unit handed to the wrong adapter
pub(crate) fn unexpected_unit(adapter: &str, unit: &WorkUnit) -> FetchError {
    FetchError::Config(format!("{adapter} cannot run unit '{}'", unit.key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp_shapes() {
        let expected = DateTime::parse_from_rfc3339("2025-01-02T04:00:00Z").unwrap().to_utc();
        assert_eq!(parse_timestamp("Wed, 01 Jan 2025 23:00:00 -0500"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02T12:00:00+08:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-01-02 04:00:00"), Some(expected));
        assert_eq!(parse_timestamp("1735790400"), Some(expected));
        assert_eq!(parse_timestamp("1735790400000"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_unit_keys() {
        assert_eq!(WorkUnit::channel(42).key, "42");
        let unit = WorkUnit::repo(GithubRepoConfig {
            owner: "acme".into(),
            repo: "jobs".into(),
            heading_pattern: "^## Jobs".into(),
        });
        assert_eq!(unit.key, "acme/jobs");
    }
}
