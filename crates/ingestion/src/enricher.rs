//! Citation and affiliation enrichment from the Semantic Scholar graph API
//!
//! Selection is incremental: a paper refreshed within the freshness
//! window is never requested again. A paper the provider does not know
//! (404) is still stamped as refreshed so reruns skip it.

use chrono::{Duration, NaiveDate, Utc};
use reqwest::Client;
use robodigest_common::config::{RateLimitPolicy, SupplementConfig};
use robodigest_common::metrics::record_enrichment;
use robodigest_common::records::{Paper, Supplement};
use robodigest_common::store::SupplementQuery;
use robodigest_common::{ProgressHub, RunStatus, SharedStore, SourceKind};
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::FetchError;
use crate::http::send_json;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "semantic_scholar";

const FIELDS: &str =
    "title,authors,citationCount,influentialCitationCount,venue,year,publicationDate,authors.affiliations";

/// 429 retries wait 1s per attempt (rate-limited base of 5 x 200ms)
const BACKOFF_UNIT: StdDuration = StdDuration::from_millis(200);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphPaper {
    #[serde(default)]
    authors: Vec<GraphAuthor>,
    citation_count: Option<i64>,
    influential_citation_count: Option<i64>,
    venue: Option<String>,
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct GraphAuthor {
    #[serde(default)]
    affiliations: Vec<String>,
}

impl From<GraphPaper> for Supplement {
    fn from(paper: GraphPaper) -> Self {
        let mut affiliations: Vec<String> = Vec::new();
        for affiliation in paper.authors.into_iter().flat_map(|a| a.affiliations) {
            let affiliation = affiliation.trim().to_string();
            if !affiliation.is_empty() && !affiliations.contains(&affiliation) {
                affiliations.push(affiliation);
            }
        }
        Supplement {
            citation_count: paper.citation_count,
            influential_citation_count: paper.influential_citation_count,
            venue: paper.venue.filter(|v| !v.trim().is_empty()),
            publication_year: paper.year,
            affiliations: (!affiliations.is_empty()).then_some(affiliations),
        }
    }
}

/// Counters of one enrichment batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichSummary {
    pub selected: u64,
    pub updated: u64,
    pub not_found: u64,
    pub failed: u64,
    pub cancelled: bool,
}

impl EnrichSummary {
    pub fn message(&self) -> String {
        let mut message = format!(
            "supplement: {} selected, {} updated, {} not found, {} failed",
            self.selected, self.updated, self.not_found, self.failed
        );
        if self.cancelled {
            message.push_str(" [cancelled]");
        }
        message
    }
}

pub struct Enricher {
    client: Client,
    config: SupplementConfig,
    api_key: Option<String>,
    store: SharedStore,
    limiter: RateLimiter,
}

impl Enricher {
    pub fn new(
        client: Client,
        config: SupplementConfig,
        api_key: Option<String>,
        store: SharedStore,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            client,
            config,
            api_key,
            store,
            limiter: RateLimiter::new(PROVIDER, policy).with_backoff_unit(BACKOFF_UNIT),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    fn query(&self, published_since: Option<NaiveDate>, limit: Option<u64>, skip_fresh_days: u32) -> SupplementQuery {
        SupplementQuery {
            published_since,
            stale_before: Utc::now() - Duration::days(i64::from(skip_fresh_days)),
            limit,
        }
    }

    /// Enrich papers published within the last `days` days
    pub async fn update_recent(
        &self,
        cancel: &CancellationToken,
        days: u32,
        limit: Option<u64>,
    ) -> Result<EnrichSummary, FetchError> {
        let since = Utc::now().date_naive() - Duration::days(i64::from(days));
        let query = self.query(Some(since), limit, self.config.freshness_days);
        self.enrich(cancel, &query, None).await
    }

    /// Enrich any paper not refreshed within `skip_fresh_within_days`
    pub async fn update_all(
        &self,
        cancel: &CancellationToken,
        limit: Option<u64>,
        skip_fresh_within_days: u32,
    ) -> Result<EnrichSummary, FetchError> {
        let query = self.query(None, limit, skip_fresh_within_days);
        self.enrich(cancel, &query, None).await
    }

    /// A supplement run that owns the progress slot.
    ///
    /// With `recent_days` only papers published in that window are
    /// considered; otherwise the whole table up to the batch limit.
    pub async fn run_pass(
        &self,
        cancel: &CancellationToken,
        progress: &ProgressHub,
        recent_days: Option<u32>,
    ) -> EnrichSummary {
        let since = recent_days.map(|days| Utc::now().date_naive() - Duration::days(i64::from(days)));
        let query = self.query(since, Some(self.config.batch_limit), self.config.freshness_days);

        let (status, summary) = match self.enrich(cancel, &query, Some(progress)).await {
            Ok(summary) if summary.cancelled => (RunStatus::Cancelled, summary),
            Ok(summary) => (RunStatus::Ok, summary),
            Err(e) => {
                warn!(error = %e, "Supplement selection failed");
                let summary = EnrichSummary {
                    failed: 1,
                    ..EnrichSummary::default()
                };
                progress.finish(SourceKind::Supplement, RunStatus::Error, format!("supplement: {}", e.label()));
                return summary;
            }
        };
        progress.finish(SourceKind::Supplement, status, summary.message());
        summary
    }

    #[instrument(skip(self, cancel, progress), fields(source = PROVIDER))]
    async fn enrich(
        &self,
        cancel: &CancellationToken,
        query: &SupplementQuery,
        progress: Option<&ProgressHub>,
    ) -> Result<EnrichSummary, FetchError> {
        let papers = self.store.papers_needing_supplement(query).await?;
        let mut summary = EnrichSummary {
            selected: papers.len() as u64,
            ..EnrichSummary::default()
        };
        if let Some(progress) = progress {
            progress.set_total(summary.selected);
        }
        info!(selected = summary.selected, "Enrichment batch started");

        for (i, paper) in papers.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            match self.enrich_one(cancel, paper).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => summary.not_found += 1,
                Err(FetchError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(id = %paper.id, error = %e, "Enrichment failed, skipping paper");
                    record_enrichment("failed");
                    summary.failed += 1;
                }
            }
            if let Some(progress) = progress {
                progress.advance(
                    i as u64 + 1,
                    &paper.id,
                    format!("{}/{} papers enriched", summary.updated, summary.selected),
                );
            }
        }

        info!(
            updated = summary.updated,
            not_found = summary.not_found,
            failed = summary.failed,
            "Enrichment batch finished"
        );
        Ok(summary)
    }

    /// `Ok(false)` when the provider has no record of the paper
    async fn enrich_one(&self, cancel: &CancellationToken, paper: &Paper) -> Result<bool, FetchError> {
        let supplement = self.lookup(cancel, &paper.id).await?;
        let now = Utc::now();
        let found = supplement.is_some();
        self.store
            .update_paper_supplement(&paper.id, &supplement.unwrap_or_default(), now)
            .await?;

        if found {
            debug!(id = %paper.id, "Supplement stored");
            record_enrichment("updated");
        } else {
            debug!(id = %paper.id, "Paper unknown to provider");
            record_enrichment("not_found");
        }
        Ok(found)
    }

    async fn lookup(&self, cancel: &CancellationToken, id: &str) -> Result<Option<Supplement>, FetchError> {
        let url = format!("{}/graph/v1/paper/arXiv:{}", self.config.base_url.trim_end_matches('/'), id);
        let result = self
            .limiter
            .run(cancel, || {
                let mut request = self.client.get(&url).query(&[("fields", FIELDS)]);
                if let Some(key) = &self.api_key {
                    request = request.header("x-api-key", key);
                }
                send_json::<GraphPaper>(PROVIDER, request)
            })
            .await;

        match result {
            Ok(paper) => Ok(Some(paper.into())),
            Err(FetchError::Upstream { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
