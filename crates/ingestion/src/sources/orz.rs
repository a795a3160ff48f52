//! Hot-list aggregator adapter
//!
//! Polls `/api/v1/dailynews/?platform=<p>` for each configured platform
//! in order. Items without a timestamp are stamped with the fetch time.

use async_trait::async_trait;
use reqwest::Client;
use robodigest_common::config::{OrzSourceConfig, RateLimitPolicy};
use robodigest_common::records::NewsItem;
use robodigest_common::{CanonicalRecord, SourceKind};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{parse_timestamp, unexpected_unit, FetchContext, KeywordFilter, SourceAdapter, UnitTarget, WorkUnit};
use crate::errors::FetchError;
use crate::http::send_json;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "orz";

#[derive(Debug, Deserialize)]
struct HotListResponse {
    #[serde(default)]
    status: Value,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Vec<HotItem>,
}

#[derive(Debug, Deserialize)]
struct HotItem {
    title: Option<String>,
    url: Option<String>,
    #[serde(default, alias = "description")]
    desc: Option<String>,
    #[serde(default, alias = "pubDate", alias = "publish_time", alias = "time")]
    published: Option<Value>,
}

pub struct OrzAdapter {
    client: Client,
    config: OrzSourceConfig,
    filter: KeywordFilter,
    limiter: RateLimiter,
}

impl OrzAdapter {
    pub fn new(client: Client, config: OrzSourceConfig, filter: KeywordFilter, policy: RateLimitPolicy) -> Self {
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

    async fn fetch_platform(&self, ctx: &FetchContext, platform: &str) -> Result<Vec<NewsItem>, FetchError> {
        let url = format!("{}/api/v1/dailynews/", self.config.base_url.trim_end_matches('/'));
        let response: HotListResponse = self
            .limiter
            .run(&ctx.cancel, || {
                send_json(PROVIDER, self.client.get(&url).query(&[("platform", platform)]))
            })
            .await?;

        if !status_ok(&response.status) {
            return Err(FetchError::upstream(
                PROVIDER,
                200,
                response.msg.unwrap_or_else(|| format!("status {}", response.status)),
            ));
        }

        Ok(response
            .data
            .into_iter()
            .filter_map(|item| hot_item_to_news(item, platform, ctx))
            .collect())
    }
}

#[async_trait]
impl SourceAdapter for OrzAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        if self.config.platforms.is_empty() {
            return Vec::new();
        }
        vec![WorkUnit::all("hot lists")]
    }

    #[instrument(skip(self, ctx, unit), fields(source = PROVIDER))]
    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        if unit.target != UnitTarget::All {
            return Err(unexpected_unit(PROVIDER, unit));
        }

        let mut records = Vec::new();
        let mut last_error = None;
        let mut failed = 0;
        for platform in &self.config.platforms {
            match self.fetch_platform(ctx, platform).await {
                Ok(items) => {
                    let received = items.len();
                    let kept: Vec<NewsItem> = items
                        .into_iter()
                        .filter(|item| item.is_fresh(ctx.now))
                        .filter(|item| {
                            let text = format!("{} {}", item.title, item.description.as_deref().unwrap_or(""));
                            self.filter.accepts(&text, true)
                        })
                        .collect();
                    debug!(platform = %platform, received, kept = kept.len(), "Hot list parsed");
                    records.extend(kept.into_iter().map(CanonicalRecord::News));
                }
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    warn!(platform = %platform, error = %e, "Hot list failed");
                    failed += 1;
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if failed == self.config.platforms.len() => Err(e),
            _ => Ok(records),
        }
    }
}

/// The provider reports success as `200` or `"200"`
fn status_ok(status: &Value) -> bool {
    match status {
        Value::Null => true,
        Value::Number(n) => n.as_u64() == Some(200),
        Value::String(s) => s == "200" || s.eq_ignore_ascii_case("ok") || s.eq_ignore_ascii_case("success"),
        _ => false,
    }
}

fn hot_item_to_news(item: HotItem, platform: &str, ctx: &FetchContext) -> Option<NewsItem> {
    let title = item.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let link = item.url.unwrap_or_default();
    let published = item
        .published
        .as_ref()
        .and_then(|v| match v {
            Value::String(s) => parse_timestamp(s),
            Value::Number(n) => n.as_i64().and_then(|n| parse_timestamp(&n.to_string())),
            _ => None,
        })
        .unwrap_or(ctx.now);

    let mut news = NewsItem::new(title, link, platform, PROVIDER, published);
    news.description = item.desc.filter(|d| !d.trim().is_empty());
    Some(news)
}
