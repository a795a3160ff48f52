//! Typed persistence for aggregated records
//!
//! `Store` is the only long-lived shared mutable resource in the
//! pipeline. Every operation is atomic with respect to concurrent
//! readers. Two backends implement it:
//! - [`MemoryStore`]: process-local tables, used by tests and `memory://`
//! - [`crate::db::SeaStore`]: SeaORM over Postgres or SQLite

mod memory;

#[cfg(test)]
pub(crate) mod contract;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::db::{DbPool, SeaStore};
use crate::errors::Result;
use crate::records::{
    JobPosting, NewsItem, Paper, PaperTitle, Supplement, Video, VideoAggregate, VideoChannel,
};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 200;

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Skipped,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Created => "created",
            UpsertOutcome::Updated => "updated",
            UpsertOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

/// Read-path filter shared by every listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    pub category: Option<String>,
    pub uid: Option<i64>,
    pub limit: u64,
    pub offset: u64,
    pub order: SortOrder,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            category: None,
            uid: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
            order: SortOrder::Desc,
        }
    }
}

impl ListFilter {
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn uid(mut self, uid: i64) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Limit clamped to `1..=MAX_PAGE_SIZE`
    pub fn effective_limit(&self) -> u64 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Selection for the enricher
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupplementQuery {
    /// Only papers published on or after this date
    pub published_since: Option<NaiveDate>,
    /// Papers refreshed at or after this instant are fresh and skipped
    pub stale_before: DateTime<Utc>,
    pub limit: Option<u64>,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Backend connectivity check
    async fn ping(&self) -> Result<()>;

    // Papers

    /// Insert or merge. Uncategorized papers are never stored and a
    /// merge never downgrades a category to the sentinel.
    async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome>;

    async fn find_paper(&self, id: &str) -> Result<Option<Paper>>;

    async fn list_papers(&self, filter: &ListFilter) -> Result<Page<Paper>>;

    async fn count_papers(&self, category: Option<&str>) -> Result<u64>;

    /// Latest `update_date` across papers, optionally within one category
    async fn max_updated_at(&self, category: Option<&str>) -> Result<Option<NaiveDate>>;

    async fn all_titles_minimal(&self) -> Result<Vec<PaperTitle>>;

    async fn papers_needing_supplement(&self, query: &SupplementQuery) -> Result<Vec<Paper>>;

    /// Apply enrichment results; returns false when the paper is gone
    async fn update_paper_supplement(
        &self,
        id: &str,
        supplement: &Supplement,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    // News

    /// Insert by dedup key; an existing key is a skip
    async fn upsert_news(&self, item: &NewsItem) -> Result<UpsertOutcome>;

    async fn list_news(&self, filter: &ListFilter) -> Result<Page<NewsItem>>;

    /// Delete news published before `cutoff`; returns rows removed
    async fn prune_news_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    // Jobs

    async fn upsert_job(&self, job: &JobPosting) -> Result<UpsertOutcome>;

    async fn list_jobs(&self, filter: &ListFilter) -> Result<Page<JobPosting>>;

    // Channels and videos

    /// Insert or merge; merged counters never decrease
    async fn upsert_channel(&self, channel: &VideoChannel) -> Result<UpsertOutcome>;

    async fn find_channel(&self, uid: i64) -> Result<Option<VideoChannel>>;

    async fn list_channels(&self, filter: &ListFilter) -> Result<Page<VideoChannel>>;

    /// Stamp a failed fetch on a known channel; returns false if unknown
    async fn record_channel_error(&self, uid: i64, message: &str, at: DateTime<Utc>) -> Result<bool>;

    async fn upsert_video(&self, video: &Video) -> Result<UpsertOutcome>;

    /// Visible videos, newest first; `filter.uid` narrows to one channel
    async fn list_videos(&self, filter: &ListFilter) -> Result<Page<Video>>;

    async fn set_video_deleted(&self, bvid: &str, deleted: bool) -> Result<bool>;

    /// Totals over a channel's visible videos
    async fn video_aggregate(&self, uid: i64) -> Result<VideoAggregate>;
}

pub type SharedStore = Arc<dyn Store>;

/// Open the backend named by `database.url`
pub async fn connect(config: &DatabaseConfig) -> Result<SharedStore> {
    if config.url.starts_with("memory://") {
        tracing::info!("Using in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let pool = DbPool::new(config).await?;
    let store = SeaStore::new(pool);
    if config.bootstrap {
        store.bootstrap().await?;
    }
    Ok(Arc::new(store))
}
