//! Relational `Store` backend
//!
//! Every upsert reads the current row, merges in memory and writes the
//! full row back. Those reads go to the primary, since a lagging replica
//! would turn every known row into a failed insert. An insert that loses
//! a race against a concurrent writer surfaces as a unique violation and
//! is retried once as an update. Listings and lookups read the replica.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use tracing::{debug, warn};
use validator::Validate;

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use crate::records::{
    JobPosting, NewsItem, Paper, PaperTitle, Supplement, Video, VideoAggregate, VideoChannel,
};
use crate::store::{ListFilter, Page, SortOrder, Store, SupplementQuery, UpsertOutcome};

fn direction(order: SortOrder) -> Order {
    match order {
        SortOrder::Desc => Order::Desc,
        SortOrder::Asc => Order::Asc,
    }
}

fn page<M, T: From<M>>(rows: Vec<M>, total: u64, filter: &ListFilter) -> Page<T> {
    Page {
        items: rows.into_iter().map(T::from).collect(),
        total,
        limit: filter.effective_limit(),
        offset: filter.offset,
    }
}

/// SeaORM-backed store
#[derive(Clone)]
pub struct SeaStore {
    pool: DbPool,
}

impl SeaStore {
    /// Create a new store with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes when missing
    pub async fn bootstrap(&self) -> Result<()> {
        self.pool.bootstrap().await
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    async fn merge_paper(&self, existing: &Paper, incoming: &Paper) -> Result<UpsertOutcome> {
        let merged = existing.merged_with(incoming, Utc::now());
        PaperActiveModel::from(&merged).update(self.write_conn()).await?;
        Ok(UpsertOutcome::Updated)
    }

    async fn merge_channel(&self, existing: &VideoChannel, incoming: &VideoChannel) -> Result<UpsertOutcome> {
        let merged = existing.merged_with(incoming, Utc::now());
        ChannelActiveModel::from(&merged).update(self.write_conn()).await?;
        Ok(UpsertOutcome::Updated)
    }

    async fn merge_video(&self, existing: &Video, incoming: &Video) -> Result<UpsertOutcome> {
        let merged = existing.merged_with(incoming, Utc::now());
        VideoActiveModel::from(&merged).update(self.write_conn()).await?;
        Ok(UpsertOutcome::Updated)
    }

    async fn current_paper(&self, id: &str) -> Result<Option<Paper>> {
        Ok(PaperEntity::find_by_id(id.to_string())
            .one(self.write_conn())
            .await?
            .map(Paper::from))
    }

    async fn current_channel(&self, uid: i64) -> Result<Option<VideoChannel>> {
        Ok(ChannelEntity::find_by_id(uid)
            .one(self.write_conn())
            .await?
            .map(VideoChannel::from))
    }

    async fn current_video(&self, bvid: &str) -> Result<Option<Video>> {
        Ok(VideoEntity::find_by_id(bvid.to_string())
            .one(self.write_conn())
            .await?
            .map(Video::from))
    }

    fn vanished(kind: &str, id: impl std::fmt::Display) -> AppError {
        AppError::Storage {
            message: format!("{kind} {id} vanished during upsert retry"),
        }
    }
}

#[async_trait]
impl Store for SeaStore {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Paper Operations
    // ========================================================================

    async fn upsert_paper(&self, paper: &Paper) -> Result<UpsertOutcome> {
        paper.validate()?;
        if paper.is_uncategorized() {
            return Ok(UpsertOutcome::Skipped);
        }

        if let Some(existing) = self.current_paper(&paper.id).await? {
            return self.merge_paper(&existing, paper).await;
        }

        match PaperEntity::insert(PaperActiveModel::from(paper))
            .exec_without_returning(self.write_conn())
            .await
        {
            Ok(_) => Ok(UpsertOutcome::Created),
            Err(err) => {
                let err = AppError::from(err);
                if !err.is_unique_violation() {
                    return Err(err);
                }
                warn!(id = %paper.id, "Paper inserted concurrently, retrying as update");
                let existing = self
                    .current_paper(&paper.id)
                    .await?
                    .ok_or_else(|| Self::vanished("paper", &paper.id))?;
                self.merge_paper(&existing, paper).await
            }
        }
    }

    async fn find_paper(&self, id: &str) -> Result<Option<Paper>> {
        Ok(PaperEntity::find_by_id(id.to_string())
            .one(self.read_conn())
            .await?
            .map(Paper::from))
    }

    async fn list_papers(&self, filter: &ListFilter) -> Result<Page<Paper>> {
        let mut query = PaperEntity::find();
        if let Some(ref category) = filter.category {
            query = query.filter(PaperColumn::Category.eq(category.as_str()));
        }
        let total = query.clone().count(self.read_conn()).await?;
        let rows = query
            .order_by(PaperColumn::PublishDate, direction(filter.order))
            .order_by(PaperColumn::Id, direction(filter.order))
            .offset(filter.offset)
            .limit(filter.effective_limit())
            .all(self.read_conn())
            .await?;
        Ok(page(rows, total, filter))
    }

    async fn count_papers(&self, category: Option<&str>) -> Result<u64> {
        let mut query = PaperEntity::find();
        if let Some(category) = category {
            query = query.filter(PaperColumn::Category.eq(category));
        }
        Ok(query.count(self.read_conn()).await?)
    }

    async fn max_updated_at(&self, category: Option<&str>) -> Result<Option<NaiveDate>> {
        let mut query = PaperEntity::find();
        if let Some(category) = category {
            query = query.filter(PaperColumn::Category.eq(category));
        }
        Ok(query
            .order_by_desc(PaperColumn::UpdateDate)
            .one(self.read_conn())
            .await?
            .map(|m| m.update_date))
    }

    async fn all_titles_minimal(&self) -> Result<Vec<PaperTitle>> {
        let rows: Vec<(String, String)> = PaperEntity::find()
            .select_only()
            .column(PaperColumn::Id)
            .column(PaperColumn::Title)
            .into_tuple()
            .all(self.read_conn())
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, title)| PaperTitle { id, title })
            .collect())
    }

    async fn papers_needing_supplement(&self, query: &SupplementQuery) -> Result<Vec<Paper>> {
        let mut select = PaperEntity::find().filter(
            Condition::any()
                .add(PaperColumn::SupplementUpdatedAt.is_null())
                .add(PaperColumn::SupplementUpdatedAt.lt(query.stale_before)),
        );
        if let Some(since) = query.published_since {
            select = select.filter(PaperColumn::PublishDate.gte(since));
        }
        let rows = select
            .order_by_desc(PaperColumn::PublishDate)
            .order_by_asc(PaperColumn::Id)
            .limit(query.limit)
            .all(self.read_conn())
            .await?;
        Ok(rows.into_iter().map(Paper::from).collect())
    }

    async fn update_paper_supplement(
        &self,
        id: &str,
        supplement: &Supplement,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(paper) = self.current_paper(id).await? else {
            return Ok(false);
        };
        let enriched = paper.with_supplement(supplement, at);
        PaperActiveModel::from(&enriched).update(self.write_conn()).await?;
        Ok(true)
    }

    // ========================================================================
    // News Operations
    // ========================================================================

    async fn upsert_news(&self, item: &NewsItem) -> Result<UpsertOutcome> {
        item.validate()?;
        let key = item.dedup_key();
        let exists = NewsEntity::find()
            .filter(NewsColumn::DedupKey.eq(key.as_str()))
            .count(self.write_conn())
            .await?
            > 0;
        if exists {
            return Ok(UpsertOutcome::Skipped);
        }

        match NewsEntity::insert(NewsActiveModel::from(item))
            .exec_without_returning(self.write_conn())
            .await
        {
            Ok(_) => Ok(UpsertOutcome::Created),
            Err(err) => {
                let err = AppError::from(err);
                if err.is_unique_violation() {
                    debug!(link = %item.link, "News item inserted concurrently");
                    Ok(UpsertOutcome::Skipped)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_news(&self, filter: &ListFilter) -> Result<Page<NewsItem>> {
        let query = NewsEntity::find();
        let total = query.clone().count(self.read_conn()).await?;
        let rows = query
            .order_by(NewsColumn::PublishedAt, direction(filter.order))
            .order_by(NewsColumn::Id, direction(filter.order))
            .offset(filter.offset)
            .limit(filter.effective_limit())
            .all(self.read_conn())
            .await?;
        Ok(page(rows, total, filter))
    }

    async fn prune_news_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = NewsEntity::delete_many()
            .filter(NewsColumn::PublishedAt.lt(cutoff))
            .exec(self.write_conn())
            .await?;
        Ok(result.rows_affected)
    }

    // ========================================================================
    // Job Operations
    // ========================================================================

    async fn upsert_job(&self, job: &JobPosting) -> Result<UpsertOutcome> {
        job.validate()?;
        let key = job.dedup_key();
        let exists = JobEntity::find()
            .filter(JobColumn::DedupKey.eq(key.as_str()))
            .count(self.write_conn())
            .await?
            > 0;
        if exists {
            return Ok(UpsertOutcome::Skipped);
        }

        match JobEntity::insert(JobActiveModel::from(job))
            .exec_without_returning(self.write_conn())
            .await
        {
            Ok(_) => Ok(UpsertOutcome::Created),
            Err(err) => {
                let err = AppError::from(err);
                if err.is_unique_violation() {
                    Ok(UpsertOutcome::Skipped)
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_jobs(&self, filter: &ListFilter) -> Result<Page<JobPosting>> {
        let query = JobEntity::find();
        let total = query.clone().count(self.read_conn()).await?;
        let rows = query
            .order_by(JobColumn::SourceDate, direction(filter.order))
            .order_by(JobColumn::Id, direction(filter.order))
            .offset(filter.offset)
            .limit(filter.effective_limit())
            .all(self.read_conn())
            .await?;
        Ok(page(rows, total, filter))
    }

    // ========================================================================
    // Channel and Video Operations
    // ========================================================================

    async fn upsert_channel(&self, channel: &VideoChannel) -> Result<UpsertOutcome> {
        channel.validate()?;
        if let Some(existing) = self.current_channel(channel.uid).await? {
            return self.merge_channel(&existing, channel).await;
        }

        match ChannelEntity::insert(ChannelActiveModel::from(channel))
            .exec_without_returning(self.write_conn())
            .await
        {
            Ok(_) => Ok(UpsertOutcome::Created),
            Err(err) => {
                let err = AppError::from(err);
                if !err.is_unique_violation() {
                    return Err(err);
                }
                warn!(uid = channel.uid, "Channel inserted concurrently, retrying as update");
                let existing = self
                    .current_channel(channel.uid)
                    .await?
                    .ok_or_else(|| Self::vanished("channel", channel.uid))?;
                self.merge_channel(&existing, channel).await
            }
        }
    }

    async fn find_channel(&self, uid: i64) -> Result<Option<VideoChannel>> {
        Ok(ChannelEntity::find_by_id(uid)
            .one(self.read_conn())
            .await?
            .map(VideoChannel::from))
    }

    async fn list_channels(&self, filter: &ListFilter) -> Result<Page<VideoChannel>> {
        let query = ChannelEntity::find();
        let total = query.clone().count(self.read_conn()).await?;
        let tie = match filter.order {
            SortOrder::Desc => Order::Asc,
            SortOrder::Asc => Order::Desc,
        };
        let rows = query
            .order_by(ChannelColumn::Fans, direction(filter.order))
            .order_by(ChannelColumn::Uid, tie)
            .offset(filter.offset)
            .limit(filter.effective_limit())
            .all(self.read_conn())
            .await?;
        Ok(page(rows, total, filter))
    }

    async fn record_channel_error(&self, uid: i64, message: &str, at: DateTime<Utc>) -> Result<bool> {
        let Some(mut channel) = self.current_channel(uid).await? else {
            return Ok(false);
        };
        channel.last_fetch_error = Some(message.to_string());
        channel.last_fetch_at = Some(at);
        channel.updated_at = at;
        ChannelActiveModel::from(&channel).update(self.write_conn()).await?;
        Ok(true)
    }

    async fn upsert_video(&self, video: &Video) -> Result<UpsertOutcome> {
        video.validate()?;
        if let Some(existing) = self.current_video(&video.bvid).await? {
            return self.merge_video(&existing, video).await;
        }

        match VideoEntity::insert(VideoActiveModel::from(video))
            .exec_without_returning(self.write_conn())
            .await
        {
            Ok(_) => Ok(UpsertOutcome::Created),
            Err(err) => {
                let err = AppError::from(err);
                if !err.is_unique_violation() {
                    return Err(err);
                }
                let existing = self
                    .current_video(&video.bvid)
                    .await?
                    .ok_or_else(|| Self::vanished("video", &video.bvid))?;
                self.merge_video(&existing, video).await
            }
        }
    }

    async fn list_videos(&self, filter: &ListFilter) -> Result<Page<Video>> {
        let mut query = VideoEntity::find().filter(VideoColumn::IsDeleted.eq(false));
        if let Some(uid) = filter.uid {
            query = query.filter(VideoColumn::Uid.eq(uid));
        }
        let total = query.clone().count(self.read_conn()).await?;
        let rows = query
            .order_by(VideoColumn::Pubdate, direction(filter.order))
            .order_by(VideoColumn::Bvid, direction(filter.order))
            .offset(filter.offset)
            .limit(filter.effective_limit())
            .all(self.read_conn())
            .await?;
        Ok(page(rows, total, filter))
    }

    async fn set_video_deleted(&self, bvid: &str, deleted: bool) -> Result<bool> {
        let Some(mut video) = self.current_video(bvid).await? else {
            return Ok(false);
        };
        video.is_deleted = deleted;
        video.updated_at = Utc::now();
        VideoActiveModel::from(&video).update(self.write_conn()).await?;
        Ok(true)
    }

    async fn video_aggregate(&self, uid: i64) -> Result<VideoAggregate> {
        let rows: Vec<Video> = VideoEntity::find()
            .filter(VideoColumn::Uid.eq(uid))
            .filter(VideoColumn::IsDeleted.eq(false))
            .all(self.read_conn())
            .await?
            .into_iter()
            .map(Video::from)
            .collect();
        Ok(VideoAggregate::from_videos(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;
    use sea_orm::{ConnectOptions, Database};

    async fn memory_conn() -> DatabaseConnection {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1).sqlx_logging(false);
        Database::connect(opts).await.unwrap()
    }

    async fn sqlite_store() -> SeaStore {
        let store = SeaStore::new(DbPool::from_connection(memory_conn().await));
        store.bootstrap().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_sea_store_contract() {
        let store = sqlite_store().await;
        contract::run_all(&store).await;
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let store = sqlite_store().await;
        store.bootstrap().await.unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_paper_round_trips_json_columns() {
        let store = sqlite_store().await;
        let mut paper = Paper::new("2501.30001", "Dexterous hands", NaiveDate::from_ymd_opt(2025, 1, 9).unwrap())
            .with_category("Operation/Dexterous Manipulation");
        paper.authors = vec!["A. Author".into(), "B. Author".into()];
        paper.affiliations = Some(vec!["Lab".into()]);
        store.upsert_paper(&paper).await.unwrap();

        let found = store.find_paper("2501.30001").await.unwrap().unwrap();
        assert_eq!(found.authors, paper.authors);
        assert_eq!(found.affiliations, paper.affiliations);
    }

    #[tokio::test]
    async fn test_upserts_ignore_a_lagging_replica() {
        let primary = memory_conn().await;
        let replica = memory_conn().await;
        DbPool::from_connection(replica.clone()).bootstrap().await.unwrap();
        let store = SeaStore::new(DbPool {
            primary,
            replica: Some(replica),
        });
        store.bootstrap().await.unwrap();

        let paper = Paper::new("2501.30002", "Grasping in clutter", NaiveDate::from_ymd_opt(2025, 1, 9).unwrap())
            .with_category("Operation/Grasp");
        assert_eq!(store.upsert_paper(&paper).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_paper(&paper).await.unwrap(), UpsertOutcome::Updated);
        // Replica never caught up
        assert!(store.find_paper("2501.30002").await.unwrap().is_none());

        let news = NewsItem::new("Humanoid robots", "https://n.example/1", "feed", "rss", Utc::now());
        assert_eq!(store.upsert_news(&news).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_news(&news).await.unwrap(), UpsertOutcome::Skipped);

        let channel = VideoChannel::new(7, "RoboLab", Default::default());
        assert_eq!(store.upsert_channel(&channel).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_channel(&channel).await.unwrap(), UpsertOutcome::Updated);
        assert!(store.record_channel_error(7, "timeout", Utc::now()).await.unwrap());

        let video = Video::new("BV1aa", 7, "Humanoid demo", Utc::now());
        assert_eq!(store.upsert_video(&video).await.unwrap(), UpsertOutcome::Created);
        assert_eq!(store.upsert_video(&video).await.unwrap(), UpsertOutcome::Updated);
        assert!(store.set_video_deleted("BV1aa", true).await.unwrap());
    }
}
