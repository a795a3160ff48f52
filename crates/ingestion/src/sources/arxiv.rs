//! arXiv Atom API adapter
//!
//! One work unit per configured keyword query. Results are paged in
//! submission-date order with the date window pushed into the query
//! string, and the provider sees at most one request in flight.

use async_trait::async_trait;
use atom_syndication::{Entry, Feed};
use chrono::{Duration, NaiveDate};
use regex_lite::Regex;
use reqwest::Client;
use robodigest_common::config::{ArxivSourceConfig, KeywordQuery, RateLimitPolicy};
use robodigest_common::records::Paper;
use robodigest_common::{CanonicalRecord, SourceKind};
use std::sync::OnceLock;
use tracing::{debug, instrument, warn};

use super::{unexpected_unit, FetchContext, SourceAdapter, UnitTarget, WorkUnit};
use crate::errors::FetchError;
use crate::http::send_text;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "arxiv";

pub struct ArxivAdapter {
    client: Client,
    config: ArxivSourceConfig,
    queries: Vec<KeywordQuery>,
    limiter: RateLimiter,
}

impl ArxivAdapter {
    pub fn new(
        client: Client,
        config: ArxivSourceConfig,
        queries: Vec<KeywordQuery>,
        policy: RateLimitPolicy,
    ) -> Self {
        // One request at a time against arXiv regardless of configuration
        let policy = RateLimitPolicy {
            concurrency: 1,
            ..policy
        };
        Self {
            client,
            config,
            queries,
            limiter: RateLimiter::new(PROVIDER, policy),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// First day of the search window
    async fn window_start(&self, ctx: &FetchContext, label: &str) -> Result<NaiveDate, FetchError> {
        let today = ctx.now.date_naive();
        let floor = today - Duration::days(i64::from(ctx.config.days_back));
        if !ctx.config.enable_incremental {
            return Ok(floor);
        }
        let latest = ctx.store.max_updated_at(Some(label)).await?;
        Ok(match latest {
            Some(latest) => floor.max(latest - Duration::days(1)),
            None => floor,
        })
    }

    async fn fetch_page(
        &self,
        ctx: &FetchContext,
        search_query: &str,
        start: u32,
        page_size: u32,
    ) -> Result<Vec<Entry>, FetchError> {
        let start_s = start.to_string();
        let size_s = page_size.to_string();
        let body = self
            .limiter
            .run(&ctx.cancel, || {
                let request = self.client.get(&self.config.base_url).query(&[
                    ("search_query", search_query),
                    ("start", start_s.as_str()),
                    ("max_results", size_s.as_str()),
                    ("sortBy", "submittedDate"),
                    ("sortOrder", "descending"),
                ]);
                send_text(PROVIDER, request)
            })
            .await?;

        let feed = Feed::read_from(body.as_bytes())
            .map_err(|e| FetchError::malformed(PROVIDER, e.to_string(), &body))?;

        if let Some(error) = feed.entries().iter().find(|e| e.id().contains("/api/errors")) {
            let message = error.summary().map(|s| s.as_str().to_string()).unwrap_or_default();
            return Err(FetchError::upstream(PROVIDER, 400, message));
        }
        Ok(feed.entries().to_vec())
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Papers
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        self.queries.iter().cloned().map(WorkUnit::keyword).collect()
    }

    #[instrument(skip(self, ctx), fields(source = PROVIDER, unit = %unit.key))]
    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        let UnitTarget::Keyword(query) = &unit.target else {
            return Err(unexpected_unit(PROVIDER, unit));
        };

        let from = self.window_start(ctx, &query.label).await?;
        let to = ctx.now.date_naive();
        let search_query = build_search_query(&query.query, from, to);
        let max_results = ctx.config.max_results;
        let page_size = self.config.page_size.clamp(1, max_results.max(1));

        let mut records = Vec::new();
        let mut start = 0u32;
        while (records.len() as u32) < max_results {
            let entries = self.fetch_page(ctx, &search_query, start, page_size).await?;
            let received = entries.len() as u32;
            debug!(start, received, "Fetched arXiv page");

            for entry in &entries {
                if records.len() as u32 >= max_results {
                    break;
                }
                match entry_to_paper(entry) {
                    Ok(paper) => records.push(CanonicalRecord::Paper(paper)),
                    Err(e) => warn!(entry = %entry.id(), error = %e, "Dropping arXiv entry"),
                }
            }

            if received < page_size {
                break;
            }
            start += page_size;
        }
        Ok(records)
    }
}

/// Provider query for `raw` (terms joined by ` OR `) inside a
/// submission-date window
pub fn build_search_query(raw: &str, from: NaiveDate, to: NaiveDate) -> String {
    let terms: Vec<String> = raw
        .split(" OR ")
        .map(|t| t.trim().trim_matches('"').trim())
        .filter(|t| !t.is_empty())
        .map(|t| {
            if t.contains(':') {
                t.to_string()
            } else if t.contains(char::is_whitespace) {
                format!("all:\"{t}\"")
            } else {
                format!("all:{t}")
            }
        })
        .collect();

    format!(
        "({}) AND submittedDate:[{}0000 TO {}2359]",
        terms.join(" OR "),
        from.format("%Y%m%d"),
        to.format("%Y%m%d")
    )
}

fn entry_to_paper(entry: &Entry) -> Result<Paper, FetchError> {
    let title = entry.title().as_str().trim();
    if title.is_empty() {
        return Err(FetchError::ValidationFailed("empty title".into()));
    }
    if entry.id().trim().is_empty() {
        return Err(FetchError::ValidationFailed("missing id".into()));
    }

    let updated = entry.updated().date_naive();
    let published = entry.published().map(|d| d.date_naive()).unwrap_or(updated);

    let mut paper = Paper::new(entry.id(), title, published);
    paper.update_date = updated;
    paper.authors = entry
        .authors()
        .iter()
        .map(|a| a.name().trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let summary = entry
        .summary()
        .map(|s| s.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|s| !s.is_empty());

    if let Some(pdf) = entry
        .links()
        .iter()
        .find(|l| l.title() == Some("pdf") || l.mime_type() == Some("application/pdf"))
    {
        paper.pdf_url = pdf.href().to_string();
    }

    let comment = entry
        .extensions()
        .get("arxiv")
        .and_then(|ns| ns.get("comment"))
        .and_then(|values| values.first())
        .and_then(|ext| ext.value())
        .map(str::to_string);

    paper.code_url = comment
        .as_deref()
        .and_then(extract_code_url)
        .or_else(|| summary.as_deref().and_then(extract_code_url));
    paper.abstract_text = summary;
    Ok(paper)
}

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"https?://[^\s,;()<>"'\]\[]+"#).ok())
        .as_ref()
}

/// First repository-looking URL in free text; code hosts win over
/// other links and arXiv self-links are ignored
pub fn extract_code_url(text: &str) -> Option<String> {
    let urls: Vec<String> = url_pattern()?
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(['.', ':']).to_string())
        .filter(|u| !u.contains("arxiv.org"))
        .collect();

    const CODE_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "huggingface.co"];
    urls.iter()
        .find(|u| CODE_HOSTS.iter().any(|h| u.contains(h)))
        .or_else(|| urls.first())
        .cloned()
}
