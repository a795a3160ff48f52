//! In-process store backend

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use validator::Validate;

use super::{ListFilter, Page, SortOrder, Store, SupplementQuery, UpsertOutcome};
use crate::errors::Result;
use crate::records::{
    JobPosting, NewsItem, Paper, PaperTitle, Supplement, Video, VideoAggregate, VideoChannel,
};

#[derive(Debug, Default)]
struct Tables {
    papers: BTreeMap<String, Paper>,
    news: HashMap<String, NewsItem>,
    jobs: HashMap<String, JobPosting>,
    channels: BTreeMap<i64, VideoChannel>,
    videos: BTreeMap<String, Video>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Store backed by in-memory maps behind one lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(mut rows: Vec<T>, filter: &ListFilter, cmp: impl Fn(&T, &T) -> Ordering) -> Page<T> {
    rows.sort_by(|a, b| match filter.order {
        SortOrder::Desc => cmp(b, a),
        SortOrder::Asc => cmp(a, b),
    });
    let total = rows.len() as u64;
    let limit = filter.effective_limit();
    let items = rows
        .into_iter()
        .skip(filter.offset as usize)
        .take(limit as usize)
        .collect();
    Page {
        items,
        total,
        limit,
        offset: filter.offset,
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome> {
        paper.validate()?;
        if paper.is_uncategorized() {
            return Ok(UpsertOutcome::Skipped);
        }
        let mut tables = self.tables.write().await;
        match tables.papers.get(&paper.id) {
            Some(existing) => {
                let merged = existing.merged_with(paper, Utc::now());
                tables.papers.insert(paper.id.clone(), merged);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                tables.papers.insert(paper.id.clone(), paper.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn find_paper(&self, id: &str) -> Result<Option<Paper>> {
        Ok(self.tables.read().await.papers.get(id).cloned())
    }

    async fn list_papers(&self, filter: &ListFilter) -> Result<Page<Paper>> {
        let tables = self.tables.read().await;
        let rows = tables
            .papers
            .values()
            .filter(|p| filter.category.as_deref().map_or(true, |c| p.category == c))
            .cloned()
            .collect();
        Ok(paginate(rows, filter, |a, b| {
            a.publish_date.cmp(&b.publish_date).then_with(|| a.id.cmp(&b.id))
        }))
    }

    async fn count_papers(&self, category: Option<&str>) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables
            .papers
            .values()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .count() as u64)
    }

    async fn max_updated_at(&self, category: Option<&str>) -> Result<Option<NaiveDate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .papers
            .values()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .map(|p| p.update_date)
            .max())
    }

    async fn all_titles_minimal(&self) -> Result<Vec<PaperTitle>> {
        let tables = self.tables.read().await;
        Ok(tables
            .papers
            .values()
            .map(|p| PaperTitle {
                id: p.id.clone(),
                title: p.title.clone(),
            })
            .collect())
    }

    async fn papers_needing_supplement(&self, query: &SupplementQuery) -> Result<Vec<Paper>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Paper> = tables
            .papers
            .values()
            .filter(|p| query.published_since.map_or(true, |since| p.publish_date >= since))
            .filter(|p| p.supplement_updated_at.map_or(true, |at| at < query.stale_before))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.publish_date.cmp(&a.publish_date).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = query.limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn update_paper_supplement(
        &self,
        id: &str,
        supplement: &Supplement,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.papers.get_mut(id) {
            Some(paper) => {
                *paper = paper.with_supplement(supplement, at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_news(&self, item: &NewsItem) -> Result<UpsertOutcome> {
        item.validate()?;
        let key = item.dedup_key();
        let mut tables = self.tables.write().await;
        if tables.news.contains_key(&key) {
            return Ok(UpsertOutcome::Skipped);
        }
        let mut row = item.clone();
        row.id = tables.next_id();
        tables.news.insert(key, row);
        Ok(UpsertOutcome::Created)
    }

    async fn list_news(&self, filter: &ListFilter) -> Result<Page<NewsItem>> {
        let tables = self.tables.read().await;
        let rows = tables.news.values().cloned().collect();
        Ok(paginate(rows, filter, |a, b| {
            a.published_at.cmp(&b.published_at).then_with(|| a.id.cmp(&b.id))
        }))
    }

    async fn prune_news_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.news.len();
        tables.news.retain(|_, item| item.published_at >= cutoff);
        Ok((before - tables.news.len()) as u64)
    }

    async fn upsert_job(&self, job: &JobPosting) -> Result<UpsertOutcome> {
        job.validate()?;
        let key = job.dedup_key();
        let mut tables = self.tables.write().await;
        if tables.jobs.contains_key(&key) {
            return Ok(UpsertOutcome::Skipped);
        }
        let mut row = job.clone();
        row.id = tables.next_id();
        tables.jobs.insert(key, row);
        Ok(UpsertOutcome::Created)
    }

    async fn list_jobs(&self, filter: &ListFilter) -> Result<Page<JobPosting>> {
        let tables = self.tables.read().await;
        let rows = tables.jobs.values().cloned().collect();
        Ok(paginate(rows, filter, |a, b| {
            a.source_date.cmp(&b.source_date).then_with(|| a.id.cmp(&b.id))
        }))
    }

    async fn upsert_channel(&self, channel: &VideoChannel) -> Result<UpsertOutcome> {
        channel.validate()?;
        let mut tables = self.tables.write().await;
        match tables.channels.get(&channel.uid) {
            Some(existing) => {
                let merged = existing.merged_with(channel, Utc::now());
                tables.channels.insert(channel.uid, merged);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                tables.channels.insert(channel.uid, channel.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn find_channel(&self, uid: i64) -> Result<Option<VideoChannel>> {
        Ok(self.tables.read().await.channels.get(&uid).cloned())
    }

    async fn list_channels(&self, filter: &ListFilter) -> Result<Page<VideoChannel>> {
        let tables = self.tables.read().await;
        let rows = tables.channels.values().cloned().collect();
        Ok(paginate(rows, filter, |a, b| {
            a.counters.fans.cmp(&b.counters.fans).then_with(|| b.uid.cmp(&a.uid))
        }))
    }

    async fn record_channel_error(&self, uid: i64, message: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.channels.get_mut(&uid) {
            Some(channel) => {
                channel.last_fetch_error = Some(message.to_string());
                channel.last_fetch_at = Some(at);
                channel.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_video(&self, video: &Video) -> Result<UpsertOutcome> {
        video.validate()?;
        let mut tables = self.tables.write().await;
        match tables.videos.get(&video.bvid) {
            Some(existing) => {
                let merged = existing.merged_with(video, Utc::now());
                tables.videos.insert(video.bvid.clone(), merged);
                Ok(UpsertOutcome::Updated)
            }
            None => {
                tables.videos.insert(video.bvid.clone(), video.clone());
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn list_videos(&self, filter: &ListFilter) -> Result<Page<Video>> {
        let tables = self.tables.read().await;
        let rows = tables
            .videos
            .values()
            .filter(|v| !v.is_deleted)
            .filter(|v| filter.uid.map_or(true, |uid| v.uid == uid))
            .cloned()
            .collect();
        Ok(paginate(rows, filter, |a, b| {
            a.pubdate.cmp(&b.pubdate).then_with(|| a.bvid.cmp(&b.bvid))
        }))
    }

    async fn set_video_deleted(&self, bvid: &str, deleted: bool) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.videos.get_mut(bvid) {
            Some(video) => {
                video.is_deleted = deleted;
                video.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn video_aggregate(&self, uid: i64) -> Result<VideoAggregate> {
        let tables = self.tables.read().await;
        Ok(VideoAggregate::from_videos(
            tables.videos.values().filter(|v| v.uid == uid),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn test_memory_store_contract() {
        let store = MemoryStore::new();
        contract::run_all(&store).await;
    }
}
