//! NewsAPI `/v2/everything` adapter
//!
//! A single request per pass: up to five configured queries joined with
//! OR over the lookback window. Without `NEWSAPI_KEY` the adapter
//! contributes no units.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use robodigest_common::config::{NewsApiSourceConfig, RateLimitPolicy};
use robodigest_common::records::NewsItem;
use robodigest_common::{CanonicalRecord, SourceKind};
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::{parse_timestamp, unexpected_unit, FetchContext, KeywordFilter, SourceAdapter, UnitTarget, WorkUnit};
use crate::errors::FetchError;
use crate::http::{parse_json, send_text};
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "newsapi";
const MAX_QUERIES: usize = 5;

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Article {
    #[serde(default)]
    source: Option<ArticleSource>,
    author: Option<String>,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    url_to_image: Option<String>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

pub struct NewsApiAdapter {
    client: Client,
    config: NewsApiSourceConfig,
    api_key: Option<String>,
    filter: KeywordFilter,
    limiter: RateLimiter,
}

impl NewsApiAdapter {
    pub fn new(
        client: Client,
        config: NewsApiSourceConfig,
        api_key: Option<String>,
        filter: KeywordFilter,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            client,
            config,
            api_key,
            filter,
            limiter: RateLimiter::new(PROVIDER, policy),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        if self.api_key.is_none() {
            info!(source = PROVIDER, "NEWSAPI_KEY not set, skipping");
            return Vec::new();
        }
        if self.config.queries.is_empty() {
            return Vec::new();
        }
        vec![WorkUnit::all("newsapi")]
    }

    #[instrument(skip(self, ctx, unit), fields(source = PROVIDER))]
    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        if unit.target != UnitTarget::All {
            return Err(unexpected_unit(PROVIDER, unit));
        }
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(FetchError::Config("NEWSAPI_KEY not set".into()));
        };

        let query = join_queries(&self.config.queries);
        let to = ctx.now.date_naive();
        let from = to - Duration::days(i64::from(self.config.lookback_days));
        let from_s = from.format("%Y-%m-%d").to_string();
        let to_s = to.format("%Y-%m-%d").to_string();
        let page_size = self.config.page_size.min(100).to_string();
        let url = format!("{}/v2/everything", self.config.base_url.trim_end_matches('/'));

        let body = self
            .limiter
            .run(&ctx.cancel, || {
                let request = self
                    .client
                    .get(&url)
                    .header("X-Api-Key", api_key)
                    .query(&[
                        ("q", query.as_str()),
                        ("from", from_s.as_str()),
                        ("to", to_s.as_str()),
                        ("sortBy", "publishedAt"),
                        ("pageSize", page_size.as_str()),
                    ]);
                send_text(PROVIDER, request)
            })
            .await?;

        let response: EverythingResponse = parse_json(PROVIDER, &body)?;
        if response.status != "ok" {
            let code = response.code.unwrap_or_default();
            let message = response.message.unwrap_or_default();
            return Err(if code == "rateLimited" {
                FetchError::rate_limited(PROVIDER)
            } else {
                FetchError::upstream(PROVIDER, 200, format!("{code}: {message}"))
            });
        }

        let received = response.articles.len();
        let records: Vec<CanonicalRecord> = response
            .articles
            .into_iter()
            .filter_map(article_to_news)
            .filter(|item| {
                let text = format!("{} {}", item.title, item.description.as_deref().unwrap_or(""));
                self.filter.accepts(&text, false)
            })
            .map(CanonicalRecord::News)
            .collect();
        debug!(received, kept = records.len(), "NewsAPI articles parsed");
        Ok(records)
    }
}

/// Parenthesised OR of the first [`MAX_QUERIES`] queries
pub fn join_queries(queries: &[String]) -> String {
    queries
        .iter()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .take(MAX_QUERIES)
        .map(|q| {
            if q.contains(' ') {
                format!("(\"{q}\")")
            } else {
                format!("({q})")
            }
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn article_to_news(article: Article) -> Option<NewsItem> {
    let title = article.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    // Placeholder the provider returns for withdrawn articles
    if title == "[Removed]" {
        return None;
    }
    let link = article.url.filter(|u| !u.is_empty())?;
    let published = article.published_at.as_deref().and_then(parse_timestamp)?;
    let source = article
        .source
        .and_then(|s| s.name)
        .unwrap_or_else(|| PROVIDER.to_string());

    let mut item = NewsItem::new(title, link, source, PROVIDER, published);
    item.author = article.author.filter(|a| !a.is_empty());
    item.description = article.description.filter(|d| !d.is_empty());
    item.image_url = article.url_to_image.filter(|u| !u.is_empty());
    Some(item)
}
