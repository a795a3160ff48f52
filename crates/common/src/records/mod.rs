//! Canonical records produced by source adapters
//!
//! All records are plain values; serialization for the API edge is a
//! separate step through serde.

mod format;
mod job;
mod news;
mod paper;
mod video;

pub use format::short_form;
pub use job::JobPosting;
pub use news::{normalize_link, NewsItem, NEWS_FRESHNESS_HOURS};
pub use paper::{normalize_arxiv_id, Paper, PaperTitle, Supplement};
pub use video::{ChannelCounters, ChannelShortForms, Video, VideoAggregate, VideoChannel};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Union of everything an adapter may yield
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum CanonicalRecord {
    Paper(Paper),
    News(NewsItem),
    Job(JobPosting),
    Channel(VideoChannel),
    Video(Video),
}

impl CanonicalRecord {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            CanonicalRecord::Paper(_) => "paper",
            CanonicalRecord::News(_) => "news",
            CanonicalRecord::Job(_) => "job",
            CanonicalRecord::Channel(_) => "channel",
            CanonicalRecord::Video(_) => "video",
        }
    }

    /// Run the field-level validation rules of the wrapped record
    pub fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            CanonicalRecord::Paper(p) => p.validate(),
            CanonicalRecord::News(n) => n.validate(),
            CanonicalRecord::Job(j) => j.validate(),
            CanonicalRecord::Channel(c) => c.validate(),
            CanonicalRecord::Video(v) => v.validate(),
        }
    }
}
