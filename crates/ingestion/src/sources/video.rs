//! Video platform adapter (bilibili web API)
//!
//! One unit per channel UID, processed strictly in order. For each
//! channel the adapter reads profile, follower stats and the latest
//! uploads; `upstat` is only called when a session cookie is configured.
//! When the primary calls report no followers the public card endpoint
//! fills the gaps.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use robodigest_common::config::{RateLimitPolicy, VideoSourceConfig};
use robodigest_common::records::{ChannelCounters, Video, VideoChannel};
use robodigest_common::{CanonicalRecord, SourceKind};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::{unexpected_unit, FetchContext, SourceAdapter, UnitTarget, WorkUnit};
use crate::errors::FetchError;
use crate::http::{parse_json, send_text};
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "video";

/// Platform codes for "request blocked, slow down"
const THROTTLE_CODES: [i64; 2] = [-412, -352];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    #[serde(default)]
    name: String,
    #[serde(default)]
    face: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelationStat {
    #[serde(default)]
    follower: i64,
}

#[derive(Debug, Deserialize)]
struct UpStat {
    #[serde(default)]
    archive: Option<ArchiveStat>,
    #[serde(default)]
    likes: i64,
}

#[derive(Debug, Deserialize)]
struct ArchiveStat {
    #[serde(default)]
    view: i64,
}

#[derive(Debug, Deserialize)]
struct ArcSearch {
    #[serde(default)]
    list: Option<ArcList>,
    #[serde(default)]
    page: Option<ArcPage>,
}

#[derive(Debug, Deserialize)]
struct ArcList {
    #[serde(default)]
    vlist: Vec<ArcVideo>,
}

#[derive(Debug, Deserialize)]
struct ArcPage {
    #[serde(default)]
    count: i64,
}

#[derive(Debug, Deserialize)]
struct ArcVideo {
    bvid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    play: Value,
    #[serde(default)]
    comment: Value,
    #[serde(default)]
    favorites: Value,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    pic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CardData {
    card: CardProfile,
    #[serde(default)]
    follower: i64,
    #[serde(default)]
    archive_count: i64,
    #[serde(default)]
    like_num: i64,
}

#[derive(Debug, Default, Deserialize)]
struct CardProfile {
    #[serde(default)]
    name: String,
    #[serde(default)]
    face: Option<String>,
    #[serde(default)]
    fans: i64,
}

pub struct VideoAdapter {
    client: Client,
    config: VideoSourceConfig,
    sessdata: Option<String>,
    limiter: RateLimiter,
}

impl VideoAdapter {
    pub fn new(client: Client, config: VideoSourceConfig, sessdata: Option<String>, policy: RateLimitPolicy) -> Self {
        // Channels are walked one request at a time
        let policy = RateLimitPolicy {
            concurrency: 1,
            ..policy
        };
        Self {
            client,
            config,
            sessdata,
            limiter: RateLimiter::new(PROVIDER, policy),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    fn request(&self, path: &str, query: &[(&str, String)], uid: i64, with_cookie: bool) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        let mut request = self
            .client
            .get(url)
            .query(query)
            .header("Referer", format!("https://space.bilibili.com/{uid}"));
        if with_cookie {
            if let Some(sessdata) = &self.sessdata {
                request = request.header("Cookie", format!("SESSDATA={sessdata}"));
            }
        }
        request
    }

    /// One enveloped API call under the limiter; throttle codes are retried
    async fn call<T: DeserializeOwned>(
        &self,
        ctx: &FetchContext,
        path: &str,
        query: &[(&str, String)],
        uid: i64,
        with_cookie: bool,
    ) -> Result<T, FetchError> {
        self.limiter
            .run(&ctx.cancel, || {
                let request = self.request(path, query, uid, with_cookie);
                async move {
                    let body = send_text(PROVIDER, request).await?;
                    unwrap_envelope(&body)
                }
            })
            .await
    }

    /// Errors that must end the unit rather than degrade it
    fn is_fatal(err: &FetchError) -> bool {
        matches!(err, FetchError::Cancelled | FetchError::RateLimited { .. })
    }

    #[instrument(skip(self, ctx), fields(source = PROVIDER))]
    async fn fetch_channel(&self, ctx: &FetchContext, uid: i64) -> Result<Vec<CanonicalRecord>, FetchError> {
        let mid = [("mid", uid.to_string())];

        // An empty name sends the channel to the public card below
        let (mut name, mut face) = match self.call::<AccountInfo>(ctx, "/x/space/acc/info", &mid, uid, false).await {
            Ok(info) => (info.name.trim().to_string(), info.face.filter(|f| !f.is_empty())),
            Err(e) if Self::is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!(uid, error = %e, "Account info unavailable");
                (String::new(), None)
            }
        };

        let mut counters = ChannelCounters::default();
        match self
            .call::<RelationStat>(ctx, "/x/relation/stat", &[("vmid", uid.to_string())], uid, false)
            .await
        {
            Ok(stat) => counters.fans = stat.follower,
            Err(e) if Self::is_fatal(&e) => return Err(e),
            Err(e) => warn!(uid, error = %e, "Follower stat unavailable"),
        }

        let search_query = [
            ("mid", uid.to_string()),
            ("ps", self.config.videos_per_channel.to_string()),
            ("pn", "1".to_string()),
            ("order", "pubdate".to_string()),
        ];
        let videos = match self
            .call::<ArcSearch>(ctx, "/x/space/arc/search", &search_query, uid, false)
            .await
        {
            Ok(search) => {
                counters.videos_count = search.page.map(|p| p.count).unwrap_or(0);
                search
                    .list
                    .map(|l| l.vlist)
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|v| arc_to_video(uid, v))
                    .collect::<Vec<_>>()
            }
            Err(e) if Self::is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!(uid, error = %e, "Upload list unavailable");
                Vec::new()
            }
        };

        if self.sessdata.is_some() {
            match self.call::<UpStat>(ctx, "/x/space/upstat", &mid, uid, true).await {
                Ok(stat) => {
                    counters.views_count = stat.archive.map(|a| a.view).unwrap_or(0);
                    counters.likes_count = stat.likes;
                }
                Err(e) if Self::is_fatal(&e) => return Err(e),
                Err(e) => warn!(uid, error = %e, "Upload stats unavailable"),
            }
        }
        if counters.views_count == 0 {
            counters.views_count = videos.iter().map(|v| v.play).sum();
        }

        if counters.fans == 0 || name.is_empty() {
            debug!(uid, "Primary counters empty, reading public card");
            let card = match self.call::<CardData>(ctx, "/x/web-interface/card", &mid, uid, false).await {
                Ok(card) => card,
                // Without a name there is nothing worth storing
                Err(e) if Self::is_fatal(&e) || name.is_empty() => return Err(e),
                Err(e) => {
                    warn!(uid, error = %e, "Public card unavailable");
                    CardData::default()
                }
            };
            let fans = if card.follower > 0 { card.follower } else { card.card.fans };
            counters.fans = counters.fans.max(fans);
            if counters.videos_count == 0 {
                counters.videos_count = card.archive_count;
            }
            if counters.likes_count == 0 {
                counters.likes_count = card.like_num;
            }
            if name.is_empty() {
                name = card.card.name.trim().to_string();
            }
            if face.is_none() {
                face = card.card.face.filter(|f| !f.is_empty());
            }
        }

        if name.is_empty() {
            return Err(FetchError::ValidationFailed(format!("channel {uid} has no name")));
        }

        let mut channel = VideoChannel::new(uid, name, counters);
        channel.face_url = face;
        channel.last_fetch_at = Some(ctx.now);

        info!(uid, fans = counters.fans, videos = videos.len(), "Channel fetched");
        let mut records = Vec::with_capacity(videos.len() + 1);
        records.push(CanonicalRecord::Channel(channel));
        records.extend(videos.into_iter().map(CanonicalRecord::Video));
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for VideoAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Videos
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        self.config.uids.iter().copied().map(WorkUnit::channel).collect()
    }

    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        match unit.target {
            UnitTarget::Channel(uid) => self.fetch_channel(ctx, uid).await,
            _ => Err(unexpected_unit(PROVIDER, unit)),
        }
    }
}

fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, FetchError> {
    let envelope: Envelope<T> = parse_json(PROVIDER, body)?;
    if THROTTLE_CODES.contains(&envelope.code) {
        return Err(FetchError::rate_limited(PROVIDER));
    }
    if envelope.code != 0 {
        return Err(FetchError::upstream(
            PROVIDER,
            200,
            format!("code {}: {}", envelope.code, envelope.message),
        ));
    }
    envelope
        .data
        .ok_or_else(|| FetchError::malformed(PROVIDER, "missing data", body))
}

/// Counters arrive as numbers, numeric strings or `"--"`
fn as_count(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n.as_i64().unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn arc_to_video(uid: i64, arc: ArcVideo) -> Option<Video> {
    if arc.bvid.trim().is_empty() || arc.title.trim().is_empty() {
        return None;
    }
    let pubdate: DateTime<Utc> = DateTime::from_timestamp(arc.created, 0)?;
    let mut video = Video::new(arc.bvid, uid, arc.title, pubdate).with_stats(
        as_count(&arc.play),
        as_count(&arc.comment),
        as_count(&arc.favorites),
    );
    video.cover_url = arc.pic.filter(|p| !p.is_empty());
    Some(video)
}
