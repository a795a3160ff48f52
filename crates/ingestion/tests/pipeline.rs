//! End-to-end fetch passes against stubbed providers and the in-memory store

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use httpmock::prelude::*;
use reqwest::Client;
use robodigest_common::config::{
    ArxivSourceConfig, FeedConfig, FetchConfig, FiltersConfig, KeywordQuery, RateLimitPolicy, RssSourceConfig,
    SupplementConfig, VideoSourceConfig,
};
use robodigest_common::records::{NewsItem, Paper};
use robodigest_common::store::{ListFilter, MemoryStore};
use robodigest_common::{
    CanonicalRecord, Classifier, ProgressHub, RunStatus, SharedStore, SourceKind, UpsertOutcome,
};
use robodigest_ingestion::sources::{
    ArxivAdapter, FetchContext, KeywordFilter, RssAdapter, SourceAdapter, VideoAdapter, WorkUnit,
};
use robodigest_ingestion::{Aggregator, Enricher, FetchError, Fetcher, Pipeline, Scheduler};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const GRASP: &str = "Operation/Grasp";

fn no_pacing(concurrency: usize) -> RateLimitPolicy {
    RateLimitPolicy::new(0, 0, 0, concurrency)
}

fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

fn atom_entry(id: &str, title: &str) -> String {
    let published = (Utc::now() - Duration::days(1)).to_rfc3339();
    format!(
        r#"<entry>
  <id>http://arxiv.org/abs/{id}v1</id>
  <updated>{published}</updated>
  <published>{published}</published>
  <title>{title}</title>
  <summary>An abstract about {title}.</summary>
  <author><name>Grace Hopper</name></author>
  <link title="pdf" href="http://arxiv.org/pdf/{id}v1" rel="related" type="application/pdf"/>
</entry>"#
    )
}

fn atom_feed(entries: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>arXiv Query</title>
  <id>http://arxiv.org/api/query</id>
  <updated>2025-01-10T00:00:00Z</updated>
  {}
</feed>"#,
        entries.join("\n")
    )
}

fn arxiv_adapter(server: &MockServer) -> ArxivAdapter {
    ArxivAdapter::new(
        Client::new(),
        ArxivSourceConfig {
            base_url: server.url("/api/query"),
            keywords: Vec::new(),
            page_size: 50,
        },
        vec![KeywordQuery {
            label: GRASP.into(),
            query: "grasp OR grasping".into(),
        }],
        no_pacing(1),
    )
}

fn fetcher(kind: SourceKind, adapter: impl SourceAdapter + 'static, progress: &Arc<ProgressHub>) -> Fetcher {
    Fetcher::new(kind, vec![Arc::new(adapter)], progress.clone(), Arc::new(Classifier::new()), 0.85)
}

fn papers_config() -> FetchConfig {
    FetchConfig {
        max_results: 3,
        days_back: 7,
        ..FetchConfig::default()
    }
}

#[tokio::test]
async fn papers_happy_path_creates_categorized_rows() {
    let server = MockServer::start_async().await;
    let feed = atom_feed(&[
        atom_entry("2501.00001", "Learning to grasp transparent objects"),
        atom_entry("2501.00002", "Grasping unknown objects from a single view"),
        atom_entry("2501.00003", "Fast grasp synthesis for cluttered bins"),
    ]);
    let query = server
        .mock_async(|when, then| {
            when.method(GET).path("/api/query").query_param("start", "0");
            then.status(200).body(feed.clone());
        })
        .await;

    let store = memory_store();
    let progress = Arc::new(ProgressHub::new());
    progress.try_begin(SourceKind::Papers).unwrap();
    let ctx = FetchContext::new(CancellationToken::new(), papers_config(), store.clone());

    let summary = fetcher(SourceKind::Papers, arxiv_adapter(&server), &progress).run(&ctx).await;

    query.assert_async().await;
    assert_eq!(summary.status, RunStatus::Ok);
    assert_eq!((summary.created, summary.updated, summary.skipped), (3, 0, 0));

    let page = store.list_papers(&ListFilter::default()).await.unwrap();
    assert_eq!(page.total, 3);
    assert!(page.items.iter().all(|p| p.category == GRASP));

    let snapshot = progress.snapshot();
    assert!(!snapshot.running);
    assert_eq!(snapshot.progress, snapshot.total);
}

#[tokio::test]
async fn rerunning_the_same_feed_updates_in_place() {
    let server = MockServer::start_async().await;
    let feed = atom_feed(&[atom_entry("2501.00001", "Learning to grasp transparent objects")]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/query");
            then.status(200).body(feed.clone());
        })
        .await;

    let store = memory_store();
    let progress = Arc::new(ProgressHub::new());
    let fetcher = fetcher(SourceKind::Papers, arxiv_adapter(&server), &progress);
    for _ in 0..2 {
        progress.try_begin(SourceKind::Papers).unwrap();
        let ctx = FetchContext::new(CancellationToken::new(), papers_config(), store.clone());
        fetcher.run(&ctx).await;
    }

    assert_eq!(store.count_papers(None).await.unwrap(), 1);
}

#[tokio::test]
async fn near_duplicate_title_is_skipped() {
    let store = memory_store();
    let date = NaiveDate::from_ymd_opt(2025, 1, 8).unwrap();
    let existing = Paper::new("2501.00011", "Robotic Grasping with Point Clouds", date).with_category(GRASP);
    assert_eq!(store.upsert_paper(&existing).await.unwrap(), UpsertOutcome::Created);

    let server = MockServer::start_async().await;
    let feed = atom_feed(&[atom_entry("2501.00012", "Robotic grasping with point-clouds.")]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/query");
            then.status(200).body(feed.clone());
        })
        .await;

    let progress = Arc::new(ProgressHub::new());
    progress.try_begin(SourceKind::Papers).unwrap();
    let ctx = FetchContext::new(CancellationToken::new(), papers_config(), store.clone());
    let summary = fetcher(SourceKind::Papers, arxiv_adapter(&server), &progress).run(&ctx).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.created, 0);
    assert_eq!(store.count_papers(None).await.unwrap(), 1);
    assert!(store.find_paper("2501.00012").await.unwrap().is_none());
}

#[test]
fn chain_of_thought_outscores_task_planning() {
    let classifier = Classifier::new();
    let category = classifier.classify("A novel chain-of-thought approach for robot task planning", Some(""));
    assert_eq!(category, "Decision/Chain of Thought");
}

#[test]
fn off_domain_text_is_uncategorized() {
    let classifier = Classifier::new();
    let category = classifier.classify(
        "Quantum chromodynamics of heavy quark bound states",
        Some("We compute lattice QCD corrections."),
    );
    assert_eq!(category, robodigest_common::taxonomy::UNCATEGORIZED);
}

fn rss_doc(items: &[(String, String)]) -> String {
    let published = (Utc::now() - Duration::hours(1)).to_rfc2822();
    let body: String = items
        .iter()
        .map(|(title, link)| {
            format!("<item><title>{title}</title><link>{link}</link><pubDate>{published}</pubDate></item>")
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Robots</title><link>https://n.example</link><description>d</description>{body}</channel></rss>"#
    )
}

#[tokio::test]
async fn news_pass_replaces_stale_rows_after_inserting_fresh_ones() {
    let store = memory_store();
    let yesterday = Utc::now() - Duration::hours(30);
    for i in 0..50 {
        let item = NewsItem::new(
            format!("Old robot story {i}"),
            format!("https://old.example/{i}"),
            "Archive",
            "rss",
            yesterday,
        );
        store.upsert_news(&item).await.unwrap();
    }

    let server = MockServer::start_async().await;
    let fresh: Vec<(String, String)> = (0..30)
        .map(|i| (format!("Humanoid robot update {i}"), format!("https://n.example/{i}")))
        .collect();
    let doc = rss_doc(&fresh);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/feed.xml");
            then.status(200).header("Content-Type", "application/rss+xml").body(doc.clone());
        })
        .await;

    let adapter = RssAdapter::new(
        Client::new(),
        RssSourceConfig {
            feeds: vec![FeedConfig {
                name: "Robots".into(),
                url: server.url("/feed.xml"),
                strict: false,
            }],
            workers: 2,
        },
        KeywordFilter::new(&FiltersConfig::default()),
        no_pacing(2),
    );
    let progress = Arc::new(ProgressHub::new());
    progress.try_begin(SourceKind::News).unwrap();
    let ctx = FetchContext::new(CancellationToken::new(), FetchConfig::default(), store.clone());

    let summary = fetcher(SourceKind::News, adapter, &progress).run(&ctx).await;

    assert_eq!(summary.status, RunStatus::Ok);
    assert_eq!(summary.created, 30);
    assert_eq!(summary.pruned, 50);

    let page = store.list_news(&ListFilter::default().limit(100)).await.unwrap();
    assert_eq!(page.total, 30);
    let cutoff = Utc::now() - Duration::hours(24);
    assert!(page.items.iter().all(|n| n.published_at > cutoff));
}

async fn stub_video_channel(server: &MockServer, uid: i64, card_fans: i64, plays: i64) {
    let mid = uid.to_string();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/x/space/acc/info").query_param("mid", mid.as_str());
            then.status(200)
                .json_body(json!({"code": 0, "message": "0", "data": {"mid": uid, "name": "RoboLab", "face": "https://i0.example/f.jpg"}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/x/relation/stat").query_param("vmid", mid.as_str());
            then.status(200)
                .json_body(json!({"code": 0, "message": "0", "data": {"mid": uid, "follower": 0}}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/x/space/arc/search").query_param("mid", mid.as_str());
            then.status(200).json_body(json!({"code": 0, "message": "0", "data": {
                "list": {"vlist": [
                    {"bvid": "BV1aa", "title": "Humanoid demo", "play": plays, "comment": 12, "created": 1735790400}
                ]},
                "page": {"pn": 1, "ps": 30, "count": 1}
            }}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/x/web-interface/card").query_param("mid", mid.as_str());
            then.status(200).json_body(json!({"code": 0, "message": "0", "data": {
                "card": {"mid": mid, "name": "RoboLab", "fans": card_fans},
                "follower": card_fans, "archive_count": 1, "like_num": 10
            }}));
        })
        .await;
}

fn video_adapter(server: &MockServer, uid: i64) -> VideoAdapter {
    VideoAdapter::new(
        Client::new(),
        VideoSourceConfig {
            base_url: server.base_url(),
            uids: vec![uid],
            videos_per_channel: 30,
        },
        None,
        no_pacing(1),
    )
}

#[tokio::test]
async fn zero_fans_fall_back_to_card_and_counters_never_drop() {
    let store = memory_store();
    let progress = Arc::new(ProgressHub::new());

    let first = MockServer::start_async().await;
    stub_video_channel(&first, 9, 35_000, 15_000).await;
    progress.try_begin(SourceKind::Videos).unwrap();
    let ctx = FetchContext::new(CancellationToken::new(), FetchConfig::default(), store.clone());
    let summary = fetcher(SourceKind::Videos, video_adapter(&first, 9), &progress).run(&ctx).await;
    assert_eq!(summary.status, RunStatus::Ok);

    let channel = store.find_channel(9).await.unwrap().unwrap();
    assert_eq!(channel.counters.fans, 35_000);
    assert_eq!(channel.counters.views_count, 15_000);

    // Lower numbers on the next pass must not shrink stored counters
    let second = MockServer::start_async().await;
    stub_video_channel(&second, 9, 30_000, 9_000).await;
    progress.try_begin(SourceKind::Videos).unwrap();
    let ctx = FetchContext::new(CancellationToken::new(), FetchConfig::default(), store.clone());
    fetcher(SourceKind::Videos, video_adapter(&second, 9), &progress).run(&ctx).await;

    let channel = store.find_channel(9).await.unwrap().unwrap();
    assert_eq!(channel.counters.fans, 35_000);
    assert_eq!(channel.counters.views_count, 15_000);
}

#[tokio::test]
async fn papers_pass_chains_enrichment() {
    let server = MockServer::start_async().await;
    let feed = atom_feed(&[
        atom_entry("2501.00001", "Learning to grasp transparent objects"),
        atom_entry("2501.00002", "Grasping unknown objects from a single view"),
    ]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/query");
            then.status(200).body(feed.clone());
        })
        .await;
    let mut lookups = Vec::new();
    for id in ["2501.00001", "2501.00002"] {
        let path = format!("/graph/v1/paper/arXiv:{id}");
        lookups.push(
            server
                .mock_async(|when, then| {
                    when.method(GET).path(path.as_str());
                    then.status(200).json_body(json!({
                        "citationCount": 12,
                        "influentialCitationCount": 2,
                        "venue": "ICRA",
                        "year": 2025,
                        "authors": [{"affiliations": ["MIT"]}, {"affiliations": ["MIT", "ETH Zurich"]}]
                    }));
                })
                .await,
        );
    }

    let store = memory_store();
    let progress = Arc::new(ProgressHub::new());
    let enricher = Enricher::new(
        Client::new(),
        SupplementConfig {
            base_url: server.base_url(),
            ..SupplementConfig::default()
        },
        None,
        store.clone(),
        no_pacing(1),
    );
    let config = FetchConfig {
        fetch_supplement: true,
        ..papers_config()
    };
    let pipeline = Pipeline::new(
        vec![fetcher(SourceKind::Papers, arxiv_adapter(&server), &progress)],
        Some(enricher),
        progress.clone(),
        config,
        store.clone(),
    );

    progress.try_begin(SourceKind::Papers).unwrap();
    pipeline.run(SourceKind::Papers, &CancellationToken::new()).await;

    for lookup in &lookups {
        lookup.assert_async().await;
    }
    let paper = store.find_paper("2501.00001").await.unwrap().unwrap();
    assert_eq!(paper.citation_count, Some(12));
    assert_eq!(paper.venue.as_deref(), Some("ICRA"));
    assert_eq!(paper.affiliations, Some(vec!["MIT".to_string(), "ETH Zurich".to_string()]));
    assert!(paper.supplement_updated_at.is_some());

    let snapshot = progress.snapshot();
    assert!(!snapshot.running);
    assert_eq!(snapshot.kind_statuses[&SourceKind::Papers].status, RunStatus::Ok);
    assert_eq!(snapshot.kind_statuses[&SourceKind::Supplement].status, RunStatus::Ok);
}

/// First unit answers at once, second one hangs until cancelled
struct Staged;

#[async_trait]
impl SourceAdapter for Staged {
    fn name(&self) -> &'static str {
        "staged"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Papers
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        vec![WorkUnit::all("quick"), WorkUnit::all("slow")]
    }

    async fn fetch(&self, _ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        if unit.key == "quick" {
            let date = Utc::now().date_naive();
            return Ok(vec![CanonicalRecord::Paper(Paper::new(
                "2501.00042",
                "Learning to grasp transparent objects",
                date,
            ))]);
        }
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

fn staged_aggregator(store: SharedStore) -> Aggregator {
    let progress = Arc::new(ProgressHub::new());
    let pipeline = Pipeline::new(
        vec![fetcher(SourceKind::Papers, Staged, &progress)],
        None,
        progress.clone(),
        FetchConfig::default(),
        store.clone(),
    );
    Aggregator::from_parts(store, Scheduler::new(pipeline, progress), 8)
}

async fn wait_for_papers(store: &SharedStore, count: u64) {
    for _ in 0..500 {
        if store.count_papers(None).await.unwrap() >= count {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("papers never reached {count}");
}

#[tokio::test]
async fn second_trigger_is_rejected_while_running() {
    let store = memory_store();
    let aggregator = staged_aggregator(store.clone());

    let first = aggregator.trigger_fetch(SourceKind::Papers).unwrap();
    assert!(first.accepted);

    let second = aggregator.trigger_fetch(SourceKind::Papers).unwrap();
    assert!(!second.accepted);
    assert_eq!(second.reason.as_deref(), Some("already-running"));
    assert!(second.progress.running);
    assert_eq!(second.progress.kind, Some(SourceKind::Papers));

    assert!(aggregator.cancel_fetch(SourceKind::Papers));
    aggregator.scheduler().join(SourceKind::Papers).await;
}

#[tokio::test]
async fn cancelled_run_keeps_committed_rows() {
    let store = memory_store();
    let aggregator = staged_aggregator(store.clone());

    assert!(aggregator.trigger_fetch(SourceKind::Papers).unwrap().accepted);
    wait_for_papers(&store, 1).await;

    assert!(aggregator.cancel_fetch(SourceKind::Papers));
    aggregator.scheduler().join(SourceKind::Papers).await;

    let snapshot = aggregator.get_progress();
    assert!(!snapshot.running);
    assert_eq!(snapshot.kind_statuses[&SourceKind::Papers].status, RunStatus::Cancelled);
    assert!(snapshot.progress <= snapshot.total);
    assert_eq!(store.count_papers(None).await.unwrap(), 1);

    // Slot is free again
    assert!(aggregator.trigger_fetch(SourceKind::Papers).unwrap().accepted);
    aggregator.cancel_fetch(SourceKind::Papers);
    aggregator.scheduler().join(SourceKind::Papers).await;
}

async fn wait_for_kind(aggregator: &Aggregator, kind: SourceKind) {
    for _ in 0..500 {
        let snapshot = aggregator.get_progress();
        if snapshot.running && snapshot.kind == Some(kind) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("{kind} pass never started");
}

#[tokio::test]
async fn chained_enrichment_is_cancelled_by_its_reported_kind() {
    let server = MockServer::start_async().await;
    let feed = atom_feed(&[atom_entry("2501.00001", "Learning to grasp transparent objects")]);
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/query");
            then.status(200).body(feed.clone());
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/graph/v1/paper/arXiv:2501.00001");
            then.status(200)
                .delay(std::time::Duration::from_secs(30))
                .json_body(json!({"citationCount": 1}));
        })
        .await;

    let store = memory_store();
    let progress = Arc::new(ProgressHub::new());
    let enricher = Enricher::new(
        Client::new(),
        SupplementConfig {
            base_url: server.base_url(),
            ..SupplementConfig::default()
        },
        None,
        store.clone(),
        no_pacing(1),
    );
    let pipeline = Pipeline::new(
        vec![fetcher(SourceKind::Papers, arxiv_adapter(&server), &progress)],
        Some(enricher),
        progress.clone(),
        FetchConfig {
            fetch_supplement: true,
            ..papers_config()
        },
        store.clone(),
    );
    let aggregator = Aggregator::from_parts(store.clone(), Scheduler::new(pipeline, progress), 8);

    assert!(aggregator.trigger_fetch(SourceKind::Papers).unwrap().accepted);
    wait_for_kind(&aggregator, SourceKind::Supplement).await;
    assert!(aggregator.scheduler().is_running(SourceKind::Supplement));

    // A pending join must not deregister the run
    let scheduler = aggregator.scheduler().clone();
    let waiter = tokio::spawn(async move { scheduler.join(SourceKind::Supplement).await });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(aggregator.scheduler().is_running(SourceKind::Papers));

    assert!(aggregator.cancel_fetch(SourceKind::Supplement));
    tokio::time::timeout(std::time::Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();

    let snapshot = aggregator.get_progress();
    assert!(!snapshot.running);
    assert_eq!(snapshot.kind_statuses[&SourceKind::Papers].status, RunStatus::Ok);
    assert_eq!(snapshot.kind_statuses[&SourceKind::Supplement].status, RunStatus::Cancelled);
    assert!(!aggregator.scheduler().is_running(SourceKind::Papers));
    assert!(!aggregator.cancel_fetch(SourceKind::Supplement));
    assert_eq!(store.count_papers(None).await.unwrap(), 1);
}
