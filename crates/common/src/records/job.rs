//! Job posting record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use validator::Validate;

use super::news::normalize_link;
use super::paper::collapse_whitespace;

/// A job posting scraped from a curated list.
///
/// Dedup axis is `(link, source_date)` when a link is present, else
/// `(title, source_date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct JobPosting {
    pub id: i64,

    #[validate(length(min = 1, max = 500))]
    pub title: String,

    pub company: Option<String>,

    pub location: Option<String>,

    pub job_type: Option<String>,

    pub link: Option<String>,

    pub description: Option<String>,

    /// Provider-supplied date, normalized to `YYYY-MM-DD`
    #[validate(length(min = 1))]
    pub source_date: String,

    pub created_at: DateTime<Utc>,
}

impl JobPosting {
    pub fn new(title: impl Into<String>, source_date: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: collapse_whitespace(&title.into()),
            company: None,
            location: None,
            job_type: None,
            link: None,
            description: None,
            source_date: source_date.into(),
            created_at: Utc::now(),
        }
    }

    pub fn dedup_key(&self) -> String {
        let basis = match self.link.as_deref().filter(|l| !l.trim().is_empty()) {
            Some(link) => format!("link:{}|{}", normalize_link(link), self.source_date),
            None => format!("title:{}|{}", self.title.to_lowercase(), self.source_date),
        };
        hex::encode(Sha256::digest(basis.as_bytes()))
    }
}
