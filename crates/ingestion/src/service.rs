//! Core API consumed by the HTTP edge and the headless binary
//!
//! [`Aggregator`] wires adapters, fetchers, the enricher and the
//! scheduler from one [`AppConfig`] and exposes the small surface the
//! edge needs: trigger, cancel, progress and listings.

use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use robodigest_common::config::AppConfig;
use robodigest_common::records::{JobPosting, NewsItem, Paper, Video, VideoChannel};
use robodigest_common::store::{ListFilter, Page};
use robodigest_common::{AppError, Classifier, ProgressHub, ProgressSnapshot, SharedStore, SourceKind};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::enricher::Enricher;
use crate::fetcher::Fetcher;
use crate::http::build_client;
use crate::scheduler::{Pipeline, Scheduler, TriggerError};
use crate::sources::{
    ArxivAdapter, GithubReadmeAdapter, KeywordFilter, NewsApiAdapter, OrzAdapter, RssAdapter, SourceAdapter,
    VideoAdapter,
};

/// Reason reported when a trigger loses the overlap check
pub const ALREADY_RUNNING: &str = "already-running";

/// Answer to a manual trigger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub progress: ProgressSnapshot,
}

/// Record families exposed for listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Papers,
    News,
    Jobs,
    Channels,
    Videos,
}

/// News row with its publication time in the presentation offset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsView {
    #[serde(flatten)]
    pub item: NewsItem,
    pub published_local: DateTime<FixedOffset>,
}

/// One page of any listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Items {
    Papers(Page<Paper>),
    News(Page<NewsView>),
    Jobs(Page<JobPosting>),
    Channels(Page<VideoChannel>),
    Videos(Page<Video>),
}

impl Items {
    pub fn total(&self) -> u64 {
        match self {
            Items::Papers(p) => p.total,
            Items::News(p) => p.total,
            Items::Jobs(p) => p.total,
            Items::Channels(p) => p.total,
            Items::Videos(p) => p.total,
        }
    }
}

#[derive(Clone)]
pub struct Aggregator {
    store: SharedStore,
    scheduler: Scheduler,
    local_offset_hours: i32,
}

impl Aggregator {
    /// Build the full pipeline from configuration
    pub fn new(config: &AppConfig, store: SharedStore) -> Result<Self, AppError> {
        let client = build_client(&config.fetch).map_err(|e| AppError::config(e.to_string()))?;
        let progress = Arc::new(ProgressHub::new());
        let classifier = Arc::new(Classifier::new());
        let threshold = config.dedup.similarity_threshold;

        let fetcher = |kind: SourceKind, adapters: Vec<Arc<dyn SourceAdapter>>| {
            Fetcher::new(kind, adapters, progress.clone(), classifier.clone(), threshold)
        };
        let fetchers = build_adapters(config, &client)?
            .into_iter()
            .map(|(kind, adapters)| fetcher(kind, adapters))
            .collect();

        let enricher = Enricher::new(
            client,
            config.supplement.clone(),
            config.credentials.s2_api_key.clone(),
            store.clone(),
            config.rate_limits.supplement,
        );

        let pipeline = Pipeline::new(fetchers, Some(enricher), progress.clone(), config.fetch.clone(), store.clone());
        Ok(Self::from_parts(store, Scheduler::new(pipeline, progress), config.fetch.local_offset_hours))
    }

    /// Assemble from prebuilt pieces
    pub fn from_parts(store: SharedStore, scheduler: Scheduler, local_offset_hours: i32) -> Self {
        Self {
            store,
            scheduler,
            local_offset_hours,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Start a run of `kind` unless one is already in flight
    pub fn trigger_fetch(&self, kind: SourceKind) -> Result<TriggerResponse, AppError> {
        match self.scheduler.trigger_now(kind) {
            Ok(progress) => Ok(TriggerResponse {
                accepted: true,
                reason: None,
                progress,
            }),
            Err(TriggerError::AlreadyRunning(progress)) => {
                info!(%kind, running = ?progress.kind, "Trigger rejected, run in progress");
                Ok(TriggerResponse {
                    accepted: false,
                    reason: Some(ALREADY_RUNNING.to_string()),
                    progress,
                })
            }
            Err(TriggerError::NotConfigured(kind)) => Err(AppError::Validation {
                message: format!("no sources configured for {kind}"),
                field: Some("kind".to_string()),
            }),
            Err(TriggerError::ShuttingDown) => Err(AppError::ServiceUnavailable {
                message: "shutting down".to_string(),
            }),
        }
    }

    /// Returns false when no run of `kind` is live
    pub fn cancel_fetch(&self, kind: SourceKind) -> bool {
        self.scheduler.cancel(kind)
    }

    pub fn get_progress(&self) -> ProgressSnapshot {
        self.scheduler.progress().snapshot()
    }

    pub async fn list_items(&self, kind: ItemKind, filter: &ListFilter) -> Result<Items, AppError> {
        Ok(match kind {
            ItemKind::Papers => Items::Papers(self.store.list_papers(filter).await?),
            ItemKind::News => {
                let offset = self.local_offset_hours;
                Items::News(self.store.list_news(filter).await?.map(|item| NewsView {
                    published_local: item.published_local(offset),
                    item,
                }))
            }
            ItemKind::Jobs => Items::Jobs(self.store.list_jobs(filter).await?),
            ItemKind::Channels => Items::Channels(self.store.list_channels(filter).await?),
            ItemKind::Videos => Items::Videos(self.store.list_videos(filter).await?),
        })
    }

    /// Soft-delete a video so listings and aggregates skip it
    pub async fn hide_video(&self, bvid: &str) -> Result<(), AppError> {
        if self.store.set_video_deleted(bvid, true).await? {
            info!(bvid, "Video hidden");
            Ok(())
        } else {
            Err(AppError::NotFound {
                resource_type: "video".to_string(),
                id: bvid.to_string(),
            })
        }
    }

    /// Register cron jobs when scheduling is enabled
    pub async fn start(&self, config: &AppConfig) -> Result<(), AppError> {
        if !config.schedule.enabled {
            info!("Scheduling disabled, manual triggers only");
            return Ok(());
        }
        self.scheduler.start(&config.schedule.crons).await
    }

    pub async fn shutdown(&self, grace: Duration) {
        self.scheduler.shutdown(grace).await;
    }
}

/// Adapters grouped by the kind of pass they feed
fn build_adapters(
    config: &AppConfig,
    client: &Client,
) -> Result<Vec<(SourceKind, Vec<Arc<dyn SourceAdapter>>)>, AppError> {
    let sources = &config.sources;
    let limits = &config.rate_limits;
    let credentials = &config.credentials;
    let filter = KeywordFilter::new(&config.filters);

    let papers: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(ArxivAdapter::new(
        client.clone(),
        sources.arxiv.clone(),
        config.keyword_queries()?,
        limits.arxiv,
    ))];
    let news: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(RssAdapter::new(client.clone(), sources.rss.clone(), filter.clone(), limits.rss)),
        Arc::new(NewsApiAdapter::new(
            client.clone(),
            sources.newsapi.clone(),
            credentials.newsapi_key.clone(),
            filter.clone(),
            limits.newsapi,
        )),
        Arc::new(OrzAdapter::new(client.clone(), sources.orz.clone(), filter, limits.orz)),
    ];
    let jobs: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(GithubReadmeAdapter::new(
        client.clone(),
        sources.github.clone(),
        credentials.github_token.clone(),
        limits.github,
    ))];
    let videos: Vec<Arc<dyn SourceAdapter>> = vec![Arc::new(VideoAdapter::new(
        client.clone(),
        sources.video.clone(),
        credentials.bilibili_sessdata.clone(),
        limits.video,
    ))];

    Ok(vec![
        (SourceKind::Papers, papers),
        (SourceKind::News, news),
        (SourceKind::Jobs, jobs),
        (SourceKind::Videos, videos),
    ])
}
