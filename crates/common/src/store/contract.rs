//! Behavior every `Store` backend must share

use chrono::{Duration, NaiveDate, Utc};

use super::{ListFilter, SortOrder, Store, SupplementQuery, UpsertOutcome};
use crate::records::{ChannelCounters, JobPosting, NewsItem, Paper, Supplement, Video, VideoChannel};
use crate::taxonomy::UNCATEGORIZED;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn paper(id: &str, title: &str, day: u32) -> Paper {
    Paper::new(id, title, date(2025, 1, day)).with_category("Operation/Grasp")
}

pub(crate) async fn run_all(store: &dyn Store) {
    paper_identity(store).await;
    paper_category_rules(store).await;
    paper_listing(store).await;
    supplement_selection(store).await;
    news_dedup_and_prune(store).await;
    job_dedup(store).await;
    channel_counters(store).await;
    video_soft_delete(store).await;
}

async fn paper_identity(store: &dyn Store) {
    let p = paper("2501.10001", "Grasping in clutter", 3);
    assert_eq!(store.upsert_paper(&p).await.unwrap(), UpsertOutcome::Created);
    assert_eq!(store.upsert_paper(&p).await.unwrap(), UpsertOutcome::Updated);

    let found = store.find_paper("2501.10001").await.unwrap().unwrap();
    assert_eq!(found.title, "Grasping in clutter");
    assert_eq!(found.category, "Operation/Grasp");
    assert_eq!(store.count_papers(Some("Operation/Grasp")).await.unwrap(), 1);
    assert!(store.find_paper("missing").await.unwrap().is_none());
}

async fn paper_category_rules(store: &dyn Store) {
    let orphan = Paper::new("2501.10002", "Stock prices", date(2025, 1, 4));
    assert_eq!(orphan.category, UNCATEGORIZED);
    assert_eq!(store.upsert_paper(&orphan).await.unwrap(), UpsertOutcome::Skipped);
    assert!(store.find_paper("2501.10002").await.unwrap().is_none());

    // A reclassification is allowed, a downgrade is not
    let mut moved = paper("2501.10001", "Grasping in clutter", 3).with_category("Operation/Dexterous Manipulation");
    moved.code_url = Some("https://github.com/lab/clutter".into());
    store.upsert_paper(&moved).await.unwrap();
    let downgrade = Paper::new("2501.10001", "Grasping in clutter", date(2025, 1, 3));
    assert_eq!(store.upsert_paper(&downgrade).await.unwrap(), UpsertOutcome::Skipped);

    let found = store.find_paper("2501.10001").await.unwrap().unwrap();
    assert_eq!(found.category, "Operation/Dexterous Manipulation");
    assert_eq!(found.code_url.as_deref(), Some("https://github.com/lab/clutter"));
}

async fn paper_listing(store: &dyn Store) {
    for (id, day) in [("2501.20001", 5), ("2501.20002", 7), ("2501.20003", 6)] {
        store.upsert_paper(&paper(id, &format!("Paper {id}"), day)).await.unwrap();
    }

    let page = store
        .list_papers(&ListFilter::default().category("Operation/Grasp").limit(2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let ids: Vec<_> = page.items.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["2501.20002", "2501.20003"]);

    let asc = store
        .list_papers(&ListFilter {
            category: Some("Operation/Grasp".into()),
            order: SortOrder::Asc,
            offset: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(asc.items.len(), 1);
    assert_eq!(asc.items[0].id, "2501.20002");

    assert_eq!(
        store.max_updated_at(Some("Operation/Grasp")).await.unwrap(),
        Some(date(2025, 1, 7))
    );
    assert_eq!(store.max_updated_at(Some("Locomotion/Humanoid")).await.unwrap(), None);

    let titles = store.all_titles_minimal().await.unwrap();
    assert!(titles.iter().any(|t| t.id == "2501.20003" && t.title == "Paper 2501.20003"));
}

async fn supplement_selection(store: &dyn Store) {
    let now = Utc::now();
    let query = SupplementQuery {
        published_since: Some(date(2025, 1, 6)),
        stale_before: now - Duration::days(7),
        limit: None,
    };
    let due: Vec<_> = store
        .papers_needing_supplement(&query)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(due, ["2501.20002", "2501.20003"]);

    let supplement = Supplement {
        citation_count: Some(9),
        venue: Some("ICRA".into()),
        ..Default::default()
    };
    assert!(store.update_paper_supplement("2501.20002", &supplement, now).await.unwrap());
    assert!(!store.update_paper_supplement("nope", &supplement, now).await.unwrap());

    let due = store.papers_needing_supplement(&query).await.unwrap();
    assert_eq!(due.len(), 1);
    let refreshed = store.find_paper("2501.20002").await.unwrap().unwrap();
    assert_eq!(refreshed.citation_count, Some(9));
    assert!(refreshed.supplement_updated_at.is_some());
}

async fn news_dedup_and_prune(store: &dyn Store) {
    let now = Utc::now();
    let fresh = NewsItem::new("Humanoid demo", "https://news.example.com/a#top", "Example", "rss", now);
    assert_eq!(store.upsert_news(&fresh).await.unwrap(), UpsertOutcome::Created);

    let same_link = NewsItem::new("Humanoid demo (updated)", "https://NEWS.example.com/a", "Example", "rss", now);
    assert_eq!(store.upsert_news(&same_link).await.unwrap(), UpsertOutcome::Skipped);

    let old = NewsItem::new("Old", "https://news.example.com/old", "Example", "rss", now - Duration::hours(30));
    store.upsert_news(&old).await.unwrap();
    assert_eq!(store.list_news(&ListFilter::default()).await.unwrap().total, 2);

    let removed = store.prune_news_older_than(now - Duration::hours(24)).await.unwrap();
    assert_eq!(removed, 1);
    let page = store.list_news(&ListFilter::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Humanoid demo");
    assert!(page.items[0].id > 0);
}

async fn job_dedup(store: &dyn Store) {
    let mut job = JobPosting::new("Robot Learning Intern", "2025-01-15");
    job.link = Some("https://jobs.example.com/42".into());
    assert_eq!(store.upsert_job(&job).await.unwrap(), UpsertOutcome::Created);
    assert_eq!(store.upsert_job(&job).await.unwrap(), UpsertOutcome::Skipped);

    let mut reposted = job.clone();
    reposted.source_date = "2025-02-01".into();
    assert_eq!(store.upsert_job(&reposted).await.unwrap(), UpsertOutcome::Created);

    let page = store.list_jobs(&ListFilter::default()).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.items[0].source_date, "2025-02-01");
}

async fn channel_counters(store: &dyn Store) {
    let counters = ChannelCounters {
        fans: 12_000,
        videos_count: 40,
        views_count: 3_000_000,
        likes_count: 9_000,
    };
    let first = VideoChannel::new(7, "Robot Lab", counters);
    assert_eq!(store.upsert_channel(&first).await.unwrap(), UpsertOutcome::Created);

    let lower = VideoChannel::new(
        7,
        "Robot Lab",
        ChannelCounters {
            views_count: 2_500_000,
            fans: 12_500,
            ..counters
        },
    );
    assert_eq!(store.upsert_channel(&lower).await.unwrap(), UpsertOutcome::Updated);

    let stored = store.find_channel(7).await.unwrap().unwrap();
    assert_eq!(stored.counters.views_count, 3_000_000);
    assert_eq!(stored.counters.fans, 12_500);
    assert_eq!(stored.short.fans, "1.2万");

    let at = Utc::now();
    assert!(store.record_channel_error(7, "rate limited", at).await.unwrap());
    assert!(!store.record_channel_error(8, "unknown", at).await.unwrap());
    let stored = store.find_channel(7).await.unwrap().unwrap();
    assert_eq!(stored.last_fetch_error.as_deref(), Some("rate limited"));
    assert_eq!(store.list_channels(&ListFilter::default()).await.unwrap().total, 1);
}

async fn video_soft_delete(store: &dyn Store) {
    let now = Utc::now();
    let a = Video::new("BV1aa", 7, "Pick and place", now - Duration::days(2)).with_stats(1_000, 10, 5);
    let b = Video::new("BV1bb", 7, "Walking demo", now - Duration::days(1)).with_stats(500, 2, 1);
    let c = Video::new("BV1cc", 9, "Other channel", now).with_stats(50, 0, 0);
    for v in [&a, &b, &c] {
        assert_eq!(store.upsert_video(v).await.unwrap(), UpsertOutcome::Created);
    }

    assert!(store.set_video_deleted("BV1bb", true).await.unwrap());
    assert!(!store.set_video_deleted("BV1zz", true).await.unwrap());

    // A refetch does not resurrect a hidden video
    assert_eq!(store.upsert_video(&b).await.unwrap(), UpsertOutcome::Updated);

    let page = store.list_videos(&ListFilter::default().uid(7)).await.unwrap();
    let bvids: Vec<_> = page.items.iter().map(|v| v.bvid.as_str()).collect();
    assert_eq!(bvids, ["BV1aa"]);

    let agg = store.video_aggregate(7).await.unwrap();
    assert_eq!(agg.videos, 1);
    assert_eq!(agg.plays, 1_000);

    let all = store.list_videos(&ListFilter::default()).await.unwrap();
    assert_eq!(all.items[0].bvid, "BV1cc");
}
