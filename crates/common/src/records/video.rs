//! Video channel and video records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::format::short_form;

/// Raw counters reported for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelCounters {
    pub fans: i64,
    pub videos_count: i64,
    pub views_count: i64,
    pub likes_count: i64,
}

impl ChannelCounters {
    /// Field-wise maximum; aggregate counters never move backwards
    pub fn max(self, other: ChannelCounters) -> ChannelCounters {
        ChannelCounters {
            fans: self.fans.max(other.fans),
            videos_count: self.videos_count.max(other.videos_count),
            views_count: self.views_count.max(other.views_count),
            likes_count: self.likes_count.max(other.likes_count),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fans == 0 && self.videos_count == 0 && self.views_count == 0 && self.likes_count == 0
    }
}

/// Precomputed display strings matching [`ChannelCounters`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelShortForms {
    pub fans: String,
    pub videos_count: String,
    pub views_count: String,
    pub likes_count: String,
}

impl From<&ChannelCounters> for ChannelShortForms {
    fn from(c: &ChannelCounters) -> Self {
        Self {
            fans: short_form(c.fans),
            videos_count: short_form(c.videos_count),
            views_count: short_form(c.views_count),
            likes_count: short_form(c.likes_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VideoChannel {
    #[validate(range(min = 1))]
    pub uid: i64,

    #[validate(length(min = 1))]
    pub name: String,

    pub counters: ChannelCounters,

    pub short: ChannelShortForms,

    pub face_url: Option<String>,

    pub last_fetch_at: Option<DateTime<Utc>>,

    pub last_fetch_error: Option<String>,

    pub is_active: bool,

    pub updated_at: DateTime<Utc>,
}

impl VideoChannel {
    pub fn new(uid: i64, name: impl Into<String>, counters: ChannelCounters) -> Self {
        let now = Utc::now();
        Self {
            uid,
            name: name.into(),
            short: ChannelShortForms::from(&counters),
            counters,
            face_url: None,
            last_fetch_at: Some(now),
            last_fetch_error: None,
            is_active: true,
            updated_at: now,
        }
    }

    /// Replace counters and recompute the short forms
    pub fn with_counters(mut self, counters: ChannelCounters) -> Self {
        self.short = ChannelShortForms::from(&counters);
        self.counters = counters;
        self
    }

    /// Combine a fresh fetch with the stored row.
    ///
    /// Counters keep the larger value so aggregates are non-decreasing
    /// across successful fetches; a successful fetch clears the last error.
    pub fn merged_with(&self, incoming: &VideoChannel, now: DateTime<Utc>) -> VideoChannel {
        let counters = self.counters.max(incoming.counters);
        VideoChannel {
            uid: self.uid,
            name: if incoming.name.is_empty() {
                self.name.clone()
            } else {
                incoming.name.clone()
            },
            short: ChannelShortForms::from(&counters),
            counters,
            face_url: incoming.face_url.clone().or_else(|| self.face_url.clone()),
            last_fetch_at: incoming.last_fetch_at.or(self.last_fetch_at),
            last_fetch_error: None,
            is_active: self.is_active,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    #[validate(length(min = 1, max = 32))]
    pub bvid: String,

    pub uid: i64,

    #[validate(length(min = 1))]
    pub title: String,

    pub play: i64,

    pub reviews: i64,

    pub favorites: i64,

    pub play_short: String,

    pub cover_url: Option<String>,

    pub pubdate: DateTime<Utc>,

    pub is_deleted: bool,

    pub updated_at: DateTime<Utc>,
}

impl Video {
    pub fn new(bvid: impl Into<String>, uid: i64, title: impl Into<String>, pubdate: DateTime<Utc>) -> Self {
        Self {
            bvid: bvid.into(),
            uid,
            title: title.into(),
            play: 0,
            reviews: 0,
            favorites: 0,
            play_short: short_form(0),
            cover_url: None,
            pubdate,
            is_deleted: false,
            updated_at: Utc::now(),
        }
    }

    pub fn with_stats(mut self, play: i64, reviews: i64, favorites: i64) -> Self {
        self.play = play;
        self.reviews = reviews;
        self.favorites = favorites;
        self.play_short = short_form(play);
        self
    }

    /// Refresh counters from a new fetch; the soft-delete flag is owned by the store
    pub fn merged_with(&self, incoming: &Video, now: DateTime<Utc>) -> Video {
        let mut merged = incoming.clone();
        merged.is_deleted = self.is_deleted;
        merged.cover_url = incoming.cover_url.clone().or_else(|| self.cover_url.clone());
        merged.updated_at = now;
        merged
    }
}

/// Totals over a channel's visible (non-deleted) videos
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAggregate {
    pub videos: i64,
    pub plays: i64,
    pub reviews: i64,
    pub favorites: i64,
}

impl VideoAggregate {
    pub fn from_videos<'a>(videos: impl IntoIterator<Item = &'a Video>) -> Self {
        videos
            .into_iter()
            .filter(|v| !v.is_deleted)
            .fold(VideoAggregate::default(), |mut acc, v| {
                acc.videos += 1;
                acc.plays += v.play;
                acc.reviews += v.reviews;
                acc.favorites += v.favorites;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(fans: i64, views: i64) -> ChannelCounters {
        ChannelCounters {
            fans,
            videos_count: 10,
            views_count: views,
            likes_count: 5,
        }
    }

    #[test]
    fn test_merge_never_decreases_counters() {
        let stored = VideoChannel::new(42, "Lab", counters(1_000, 2_000_000));
        let mut incoming = VideoChannel::new(42, "Lab", counters(1_200, 1_500_000));
        incoming.last_fetch_error = Some("stale".into());

        let merged = stored.merged_with(&incoming, Utc::now());
        assert_eq!(merged.counters.fans, 1_200);
        assert_eq!(merged.counters.views_count, 2_000_000);
        assert_eq!(merged.short.views_count, "200万");
        assert!(merged.last_fetch_error.is_none());
    }

    #[test]
    fn test_aggregate_skips_deleted() {
        let now = Utc::now();
        let a = Video::new("BV1", 1, "a", now).with_stats(100, 1, 2);
        let mut b = Video::new("BV2", 1, "b", now).with_stats(50, 1, 1);
        b.is_deleted = true;

        let agg = VideoAggregate::from_videos([&a, &b]);
        assert_eq!(agg.videos, 1);
        assert_eq!(agg.plays, 100);
    }

    #[test]
    fn test_video_merge_preserves_soft_delete() {
        let now = Utc::now();
        let mut stored = Video::new("BV1", 1, "a", now);
        stored.is_deleted = true;
        let incoming = Video::new("BV1", 1, "a (re-upload)", now).with_stats(10, 0, 0);
        let merged = stored.merged_with(&incoming, now);
        assert!(merged.is_deleted);
        assert_eq!(merged.play, 10);
        assert_eq!(merged.title, "a (re-upload)");
    }
}
