//! RSS 2.0 / Atom feed adapter
//!
//! All configured feeds form a single unit fetched through a bounded
//! worker pool. A feed that fails does not sink the others; the unit
//! only fails when every feed did.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use robodigest_common::config::{FeedConfig, RateLimitPolicy, RssSourceConfig};
use robodigest_common::records::NewsItem;
use robodigest_common::{CanonicalRecord, SourceKind};
use tracing::{debug, info, instrument, warn};

use super::{parse_timestamp, unexpected_unit, FetchContext, KeywordFilter, SourceAdapter, UnitTarget, WorkUnit};
use crate::errors::FetchError;
use crate::http::send_text;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "rss";
const PLATFORM: &str = "rss";

pub struct RssAdapter {
    client: Client,
    config: RssSourceConfig,
    filter: KeywordFilter,
    limiter: RateLimiter,
}

impl RssAdapter {
    pub fn new(client: Client, config: RssSourceConfig, filter: KeywordFilter, policy: RateLimitPolicy) -> Self {
        let policy = RateLimitPolicy {
            concurrency: config.workers.max(1),
            ..policy
        };
        Self {
            client,
            config,
            filter,
            limiter: RateLimiter::new(PROVIDER, policy),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    async fn get(&self, ctx: &FetchContext, url: &str) -> Result<String, FetchError> {
        self.limiter
            .run(&ctx.cancel, || send_text(PROVIDER, self.client.get(url)))
            .await
    }

    /// Fetch one feed, retrying over plain HTTP when TLS verification fails
    async fn fetch_body(&self, ctx: &FetchContext, feed: &FeedConfig) -> Result<String, FetchError> {
        match self.get(ctx, &feed.url).await {
            Err(e) if is_tls_failure(&e) && feed.url.starts_with("https://") => {
                let fallback = feed.url.replacen("https://", "http://", 1);
                warn!(feed = %feed.name, error = %e, url = %fallback, "TLS verification failed, retrying over HTTP");
                self.get(ctx, &fallback).await
            }
            other => other,
        }
    }

    #[instrument(skip(self, ctx), fields(source = PROVIDER, feed = %feed.name))]
    async fn fetch_feed(&self, ctx: &FetchContext, feed: &FeedConfig) -> Result<Vec<NewsItem>, FetchError> {
        let body = self.fetch_body(ctx, feed).await?;
        let items = parse_feed(&feed.name, &body)?;
        let parsed = items.len();

        let kept: Vec<NewsItem> = items
            .into_iter()
            .filter(|item| item.is_fresh(ctx.now))
            .filter(|item| {
                let text = format!("{} {}", item.title, item.description.as_deref().unwrap_or(""));
                self.filter.accepts(&text, feed.strict)
            })
            .collect();

        debug!(parsed, kept = kept.len(), "Parsed feed");
        Ok(kept)
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        if self.config.feeds.is_empty() {
            return Vec::new();
        }
        vec![WorkUnit::all("rss feeds")]
    }

    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        if unit.target != UnitTarget::All {
            return Err(unexpected_unit(PROVIDER, unit));
        }

        let pending: Vec<_> = self
            .config
            .feeds
            .iter()
            .map(|feed| async move { (feed.name.clone(), self.fetch_feed(ctx, feed).await) })
            .collect();
        let results: Vec<(String, Result<Vec<NewsItem>, FetchError>)> = stream::iter(pending)
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        let mut records = Vec::new();
        let mut failures = Vec::new();
        for (name, result) in results {
            match result {
                Ok(items) => records.extend(items.into_iter().map(CanonicalRecord::News)),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    warn!(source = PROVIDER, feed = %name, error = %e, "Feed failed");
                    failures.push(e);
                }
            }
        }

        if failures.len() == self.config.feeds.len() {
            if let Some(first) = failures.into_iter().next() {
                return Err(first);
            }
        }
        info!(source = PROVIDER, items = records.len(), "Feeds fetched");
        Ok(records)
    }
}

fn is_tls_failure(err: &FetchError) -> bool {
    match err {
        FetchError::TransientNetwork { message, .. } => {
            let message = message.to_lowercase();
            ["certificate", "tls", "ssl"].iter().any(|m| message.contains(m))
        }
        _ => false,
    }
}

/// Parse an RSS 2.0 document, falling back to Atom
pub fn parse_feed(feed_name: &str, body: &str) -> Result<Vec<NewsItem>, FetchError> {
    if let Ok(channel) = rss::Channel::read_from(body.as_bytes()) {
        return Ok(channel
            .items()
            .iter()
            .filter_map(|item| rss_item(feed_name, item))
            .collect());
    }
    match atom_syndication::Feed::read_from(body.as_bytes()) {
        Ok(feed) => Ok(feed
            .entries()
            .iter()
            .filter_map(|entry| atom_entry(feed_name, entry))
            .collect()),
        Err(e) => Err(FetchError::malformed(PROVIDER, format!("neither RSS nor Atom: {e}"), body)),
    }
}

fn rss_item(feed_name: &str, item: &rss::Item) -> Option<NewsItem> {
    let title = item.title().map(str::trim).filter(|t| !t.is_empty());
    let Some(title) = title else {
        debug!(feed = feed_name, "Dropping item without title");
        return None;
    };

    let dc = item.dublin_core_ext();
    let published: Option<DateTime<Utc>> = item
        .pub_date()
        .and_then(parse_timestamp)
        .or_else(|| dc.and_then(|dc| dc.dates().first()).and_then(|d| parse_timestamp(d)));
    let Some(published) = published else {
        debug!(feed = feed_name, title, "Dropping item without a usable date");
        return None;
    };

    let link = item
        .link()
        .or_else(|| item.guid().filter(|g| g.is_permalink()).map(|g| g.value()))
        .unwrap_or_default();

    let mut news = NewsItem::new(title, link, feed_name, PLATFORM, published);
    news.description = item.description().map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    news.author = item
        .author()
        .map(str::to_string)
        .or_else(|| dc.and_then(|dc| dc.creators().first().cloned()));
    news.image_url = item
        .enclosure()
        .filter(|e| e.mime_type().starts_with("image/"))
        .map(|e| e.url().to_string());
    news.tags = item
        .categories()
        .iter()
        .map(|c| c.name().trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    Some(news)
}

fn atom_entry(feed_name: &str, entry: &atom_syndication::Entry) -> Option<NewsItem> {
    let title = entry.title().as_str().trim();
    if title.is_empty() {
        return None;
    }
    let published = entry.published().unwrap_or(entry.updated()).to_utc();
    let link = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .map(|l| l.href().to_string())
        .unwrap_or_default();

    let mut news = NewsItem::new(title, link, feed_name, PLATFORM, published);
    news.description = entry
        .summary()
        .map(|s| s.as_str().trim().to_string())
        .filter(|s| !s.is_empty());
    news.author = entry.authors().first().map(|a| a.name().to_string());
    news.tags = entry
        .categories()
        .iter()
        .map(|c| c.term().to_string())
        .collect();
    Some(news)
}
