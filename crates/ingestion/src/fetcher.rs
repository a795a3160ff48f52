//! One fetch pass for one source kind
//!
//! The fetcher walks every work unit of its adapters in declared order,
//! stores what comes back and publishes progress after each unit. A
//! failing unit is recorded and the pass moves on; only cancellation
//! ends a pass early. The caller must already own the progress slot
//! (see [`ProgressHub::try_begin`]); the fetcher always releases it.

use chrono::Duration;
use robodigest_common::dedup::TitleIndex;
use robodigest_common::metrics::{record_outcome, record_run, record_run_started};
use robodigest_common::records::{NewsItem, Paper, NEWS_FRESHNESS_HOURS};
use robodigest_common::taxonomy::UNCATEGORIZED;
use robodigest_common::{CanonicalRecord, Classifier, ProgressHub, RunStatus, SourceKind, UpsertOutcome};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::errors::FetchError;
use crate::sources::{FetchContext, SourceAdapter, UnitTarget, WorkUnit};

/// Outcome counters of one pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSummary {
    pub kind: SourceKind,
    pub status: RunStatus,
    /// Records returned by adapters
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Failed units plus records the store rejected
    pub errors: u64,
    pub units: u64,
    pub failed_units: u64,
    pub pruned: u64,
    pub last_error: Option<String>,
}

impl FetchSummary {
    fn new(kind: SourceKind, units: u64) -> Self {
        Self {
            kind,
            status: RunStatus::Running,
            total: 0,
            created: 0,
            updated: 0,
            skipped: 0,
            errors: 0,
            units,
            failed_units: 0,
            pruned: 0,
            last_error: None,
        }
    }

    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }

    /// One-line message published as the terminal progress status
    pub fn message(&self) -> String {
        let mut message = format!(
            "{}: {} created, {} updated, {} skipped",
            self.kind, self.created, self.updated, self.skipped
        );
        if self.pruned > 0 {
            message.push_str(&format!(", {} pruned", self.pruned));
        }
        if self.failed_units > 0 {
            message.push_str(&format!(", {}/{} units failed", self.failed_units, self.units));
        }
        if let Some(last) = &self.last_error {
            message.push_str(&format!(" (last error: {last})"));
        }
        if self.status == RunStatus::Cancelled {
            message.push_str(" [cancelled]");
        }
        message
    }
}

pub struct Fetcher {
    kind: SourceKind,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    progress: Arc<ProgressHub>,
    classifier: Arc<Classifier>,
    similarity_threshold: f64,
}

impl Fetcher {
    pub fn new(
        kind: SourceKind,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        progress: Arc<ProgressHub>,
        classifier: Arc<Classifier>,
        similarity_threshold: f64,
    ) -> Self {
        Self {
            kind,
            adapters,
            progress,
            classifier,
            similarity_threshold,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Run one pass and release the progress slot with its terminal status
    #[instrument(skip(self, ctx), fields(kind = %self.kind))]
    pub async fn run(&self, ctx: &FetchContext) -> FetchSummary {
        let started = Instant::now();
        let kind = self.kind;
        record_run_started(kind.as_str());

        let units: Vec<(&Arc<dyn SourceAdapter>, WorkUnit)> = self
            .adapters
            .iter()
            .flat_map(|adapter| adapter.work_units(ctx).into_iter().map(move |unit| (adapter, unit)))
            .collect();
        let mut summary = FetchSummary::new(kind, units.len() as u64);
        self.progress.set_total(summary.units);
        info!(units = summary.units, "Fetch pass started");

        let mut titles = self.title_index(ctx).await;
        let mut cancelled = false;

        for (i, (adapter, unit)) in units.iter().enumerate() {
            if ctx.is_cancelled() {
                cancelled = true;
                break;
            }
            self.progress
                .set_message(&unit.key, format!("fetching {} from {}", unit.key, adapter.name()));

            let result = tokio::select! {
                _ = ctx.cancel.cancelled() => Err(FetchError::Cancelled),
                result = adapter.fetch(ctx, unit) => result,
            };
            let result = match result {
                Ok(records) => self.store_records(ctx, records, titles.as_mut(), &mut summary).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {}
                Err(FetchError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => self.unit_failed(ctx, adapter.name(), unit, e, &mut summary).await,
            }

            self.progress.advance(
                i as u64 + 1,
                &unit.key,
                format!(
                    "{}/{} units, {} created, {} updated",
                    i + 1,
                    summary.units,
                    summary.created,
                    summary.updated
                ),
            );
        }

        if kind == SourceKind::News && !cancelled {
            self.prune_news(ctx, &mut summary).await;
        }

        summary.status = if cancelled {
            RunStatus::Cancelled
        } else if summary.units > 0 && summary.failed_units == summary.units {
            RunStatus::Error
        } else {
            RunStatus::Ok
        };

        let message = summary.message();
        self.progress.finish(kind, summary.status, message.clone());
        record_run(kind.as_str(), summary.status.as_str(), started.elapsed().as_secs_f64());
        info!(
            status = summary.status.as_str(),
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            failed_units = summary.failed_units,
            "{message}"
        );
        summary
    }

    async fn title_index(&self, ctx: &FetchContext) -> Option<TitleIndex> {
        if self.kind != SourceKind::Papers || !ctx.config.enable_dedup {
            return None;
        }
        match ctx.store.all_titles_minimal().await {
            Ok(titles) => Some(TitleIndex::from_titles(self.similarity_threshold, titles)),
            Err(e) => {
                // Identity dedup still applies without the index
                warn!(error = %e, "Could not load titles for fuzzy dedup");
                None
            }
        }
    }

    async fn store_records(
        &self,
        ctx: &FetchContext,
        records: Vec<CanonicalRecord>,
        mut titles: Option<&mut TitleIndex>,
        summary: &mut FetchSummary,
    ) -> Result<(), FetchError> {
        for record in records {
            if ctx.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            summary.total += 1;
            let label = record.label();

            if let Err(e) = record.validate() {
                debug!(record = label, error = %e, "Dropping invalid record");
                record_outcome(label, "invalid");
                summary.skipped += 1;
                continue;
            }

            let outcome = match record {
                CanonicalRecord::Paper(paper) => self.store_paper(ctx, paper, titles.as_deref_mut()).await?,
                CanonicalRecord::News(item) => store_news(ctx, &item).await?,
                CanonicalRecord::Job(job) => ctx.store.upsert_job(&job).await?,
                CanonicalRecord::Channel(channel) => ctx.store.upsert_channel(&channel).await?,
                CanonicalRecord::Video(video) => ctx.store.upsert_video(&video).await?,
            };
            record_outcome(label, outcome.as_str());
            summary.count(outcome);
        }
        Ok(())
    }

    /// Identity hit updates in place; otherwise fuzzy dedup then classify
    async fn store_paper(
        &self,
        ctx: &FetchContext,
        mut paper: Paper,
        titles: Option<&mut TitleIndex>,
    ) -> Result<UpsertOutcome, FetchError> {
        let category = self.classifier.classify(&paper.title, paper.abstract_text.as_deref());

        if let Some(existing) = ctx.store.find_paper(&paper.id).await? {
            if !ctx.config.update_paper_links {
                // Empty values are not merged over the stored row
                paper.pdf_url.clear();
                paper.code_url = None;
            }
            let category = if category == UNCATEGORIZED {
                existing.category.as_str()
            } else {
                category
            };
            return Ok(ctx.store.upsert_paper(&paper.with_category(category)).await?);
        }

        if let Some(index) = titles.as_deref() {
            if let Some(dup) = index.find_duplicate(&paper.id, &paper.title) {
                debug!(
                    id = %paper.id,
                    existing = %dup.existing_id,
                    similarity = dup.similarity,
                    "Skipping near-duplicate title"
                );
                return Ok(UpsertOutcome::Skipped);
            }
        }

        if category == UNCATEGORIZED {
            debug!(id = %paper.id, title = %paper.title, "Skipping off-domain paper");
            return Ok(UpsertOutcome::Skipped);
        }

        let paper = paper.with_category(category);
        let outcome = ctx.store.upsert_paper(&paper).await?;
        if outcome == UpsertOutcome::Created {
            if let Some(index) = titles {
                index.insert(&paper.id, &paper.title);
            }
        }
        Ok(outcome)
    }

    async fn unit_failed(
        &self,
        ctx: &FetchContext,
        source: &str,
        unit: &WorkUnit,
        error: FetchError,
        summary: &mut FetchSummary,
    ) {
        warn!(source, unit = %unit.key, error = %error, "Work unit failed");
        summary.failed_units += 1;
        summary.errors += 1;
        summary.last_error = Some(format!("{} on {}", error.label(), unit.key));

        if let UnitTarget::Channel(uid) = unit.target {
            if let Err(e) = ctx.store.record_channel_error(uid, error.label(), ctx.now).await {
                warn!(uid, error = %e, "Could not record channel error");
            }
        }
    }

    /// Delete news past the freshness window, after this pass's inserts
    async fn prune_news(&self, ctx: &FetchContext, summary: &mut FetchSummary) {
        let cutoff = ctx.now - Duration::hours(NEWS_FRESHNESS_HOURS);
        match ctx.store.prune_news_older_than(cutoff).await {
            Ok(pruned) => {
                summary.pruned = pruned;
                info!(pruned, %cutoff, "Pruned stale news");
            }
            Err(e) => {
                warn!(error = %e, "News prune failed");
                summary.errors += 1;
            }
        }
    }
}

async fn store_news(ctx: &FetchContext, item: &NewsItem) -> Result<UpsertOutcome, FetchError> {
    if !item.is_fresh(ctx.now) {
        return Ok(UpsertOutcome::Skipped);
    }
    Ok(ctx.store.upsert_news(item).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use robodigest_common::config::FetchConfig;
    use robodigest_common::records::{ChannelCounters, VideoChannel};
    use robodigest_common::store::{ListFilter, MemoryStore};
    use robodigest_common::SharedStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Adapter replaying canned results per unit key
    struct Scripted {
        kind: SourceKind,
        units: Vec<WorkUnit>,
        results: Mutex<HashMap<String, Result<Vec<CanonicalRecord>, FetchError>>>,
    }

    impl Scripted {
        fn new(kind: SourceKind) -> Self {
            Self {
                kind,
                units: Vec::new(),
                results: Mutex::new(HashMap::new()),
            }
        }

        fn unit(mut self, unit: WorkUnit, result: Result<Vec<CanonicalRecord>, FetchError>) -> Self {
            self.results.lock().unwrap().insert(unit.key.clone(), result);
            self.units.push(unit);
            self
        }
    }

    #[async_trait]
    impl SourceAdapter for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
            self.units.clone()
        }

        async fn fetch(&self, _ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
            self.results
                .lock()
                .unwrap()
                .remove(&unit.key)
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn paper(id: &str, title: &str) -> CanonicalRecord {
        CanonicalRecord::Paper(Paper::new(id, title, NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()))
    }

    fn fetcher(kind: SourceKind, adapter: Scripted, progress: Arc<ProgressHub>) -> Fetcher {
        Fetcher::new(kind, vec![Arc::new(adapter)], progress, Arc::new(Classifier::new()), 0.85)
    }

    fn ctx(store: SharedStore) -> FetchContext {
        FetchContext::new(CancellationToken::new(), FetchConfig::default(), store)
    }

    #[tokio::test]
    async fn test_failed_unit_does_not_abort_pass() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressHub::new());
        progress.try_begin(SourceKind::Papers).unwrap();

        let adapter = Scripted::new(SourceKind::Papers)
            .unit(WorkUnit::all("first"), Err(FetchError::transient("scripted", "reset")))
            .unit(
                WorkUnit::all("second"),
                Ok(vec![paper("2501.00010", "Robotic grasp planning in clutter")]),
            );
        let summary = fetcher(SourceKind::Papers, adapter, progress.clone()).run(&ctx(store.clone())).await;

        assert_eq!(summary.status, RunStatus::Ok);
        assert_eq!(summary.failed_units, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(store.count_papers(None).await.unwrap(), 1);

        let snapshot = progress.snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.progress, 2);
        assert_eq!(snapshot.kind_statuses[&SourceKind::Papers].status, RunStatus::Ok);
    }

    #[tokio::test]
    async fn test_all_units_failed_is_error() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressHub::new());
        progress.try_begin(SourceKind::Jobs).unwrap();

        let adapter = Scripted::new(SourceKind::Jobs)
            .unit(WorkUnit::all("only"), Err(FetchError::upstream("scripted", 403, "forbidden")));
        let summary = fetcher(SourceKind::Jobs, adapter, progress.clone()).run(&ctx(store)).await;

        assert_eq!(summary.status, RunStatus::Error);
        let status = &progress.snapshot().kind_statuses[&SourceKind::Jobs];
        assert_eq!(status.status, RunStatus::Error);
        assert!(status.message.contains("upstream on only"));
    }

    #[tokio::test]
    async fn test_off_domain_paper_is_not_stored() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let progress = Arc::new(ProgressHub::new());
        progress.try_begin(SourceKind::Papers).unwrap();

        let adapter = Scripted::new(SourceKind::Papers).unit(
            WorkUnit::all("k"),
            Ok(vec![paper("2501.00020", "Quantum chemistry with molecular transformers")]),
        );
        let summary = fetcher(SourceKind::Papers, adapter, progress).run(&ctx(store.clone())).await;

        assert_eq!(summary.skipped, 1);
        assert_eq!(store.count_papers(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_identity_hit_keeps_links_when_disabled() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let mut stored = Paper::new("2501.00030", "Dexterous in-hand manipulation with tactile feedback", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .with_category("Operation/Dexterous Manipulation");
        stored.code_url = Some("https://github.com/acme/hand".into());
        store.upsert_paper(&stored).await.unwrap();

        let mut incoming = Paper::new("2501.00030v2", "Dexterous in-hand manipulation with tactile feedback", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        incoming.code_url = Some("https://github.com/other/fork".into());

        let progress = Arc::new(ProgressHub::new());
        progress.try_begin(SourceKind::Papers).unwrap();
        let adapter = Scripted::new(SourceKind::Papers).unit(WorkUnit::all("k"), Ok(vec![CanonicalRecord::Paper(incoming)]));
        let summary = fetcher(SourceKind::Papers, adapter, progress).run(&ctx(store.clone())).await;

        assert_eq!(summary.updated, 1);
        let row = store.find_paper("2501.00030").await.unwrap().unwrap();
        assert_eq!(row.code_url.as_deref(), Some("https://github.com/acme/hand"));
        assert_eq!(row.pdf_url, "https://arxiv.org/pdf/2501.00030");
    }

    #[tokio::test]
    async fn test_channel_failure_is_recorded_on_channel() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        store
            .upsert_channel(&VideoChannel::new(77, "Lab", ChannelCounters::default()))
            .await
            .unwrap();

        let progress = Arc::new(ProgressHub::new());
        progress.try_begin(SourceKind::Videos).unwrap();
        let adapter = Scripted::new(SourceKind::Videos)
            .unit(WorkUnit::channel(77), Err(FetchError::rate_limited("video")));
        fetcher(SourceKind::Videos, adapter, progress).run(&ctx(store.clone())).await;

        let channel = store.find_channel(77).await.unwrap().unwrap();
        assert_eq!(channel.last_fetch_error.as_deref(), Some("rate_limited"));
    }

    #[tokio::test]
    async fn test_stale_news_is_skipped_and_pruned() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let old = NewsItem::new("Old robot news", "https://n.example/old", "feed", "rss", Utc::now() - Duration::hours(30));
        store.upsert_news(&old).await.unwrap();

        let progress = Arc::new(ProgressHub::new());
        progress.try_begin(SourceKind::News).unwrap();
        let fresh = NewsItem::new("Fresh robot news", "https://n.example/new", "feed", "rss", Utc::now());
        let stale = NewsItem::new("Stale robot news", "https://n.example/stale", "feed", "rss", Utc::now() - Duration::hours(25));
        let adapter = Scripted::new(SourceKind::News).unit(
            WorkUnit::all("feeds"),
            Ok(vec![CanonicalRecord::News(fresh), CanonicalRecord::News(stale)]),
        );
        let summary = fetcher(SourceKind::News, adapter, progress).run(&ctx(store.clone())).await;

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.pruned, 1);
        let page = store.list_news(&ListFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].title, "Fresh robot news");
    }
}
