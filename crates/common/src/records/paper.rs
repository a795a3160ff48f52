//! Paper record

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::taxonomy::UNCATEGORIZED;

/// A preprint as stored by the aggregator.
///
/// `id` is the provider identifier with any version suffix removed
/// (`2501.00001v2` becomes `2501.00001`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    #[validate(length(min = 1, max = 64))]
    pub id: String,

    #[validate(length(min = 1, max = 1000))]
    pub title: String,

    pub authors: Vec<String>,

    /// Original submission date
    pub publish_date: NaiveDate,

    pub update_date: NaiveDate,

    pub pdf_url: String,

    pub code_url: Option<String>,

    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,

    pub category: String,

    pub citation_count: Option<i64>,

    pub influential_citation_count: Option<i64>,

    pub venue: Option<String>,

    pub publication_year: Option<i32>,

    pub affiliations: Option<Vec<String>>,

    pub supplement_updated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Citation and affiliation data attached after ingest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplement {
    pub citation_count: Option<i64>,
    pub influential_citation_count: Option<i64>,
    pub venue: Option<String>,
    pub publication_year: Option<i32>,
    pub affiliations: Option<Vec<String>>,
}

/// Minimal projection used to seed the fuzzy-title index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperTitle {
    pub id: String,
    pub title: String,
}

impl Paper {
    /// Build a freshly fetched paper. The category starts as the sentinel
    /// and must be assigned before the record is stored.
    pub fn new(id: impl Into<String>, title: impl Into<String>, publish_date: NaiveDate) -> Self {
        let id = normalize_arxiv_id(&id.into());
        let now = Utc::now();
        Self {
            pdf_url: format!("https://arxiv.org/pdf/{}", id),
            id,
            title: collapse_whitespace(&title.into()),
            authors: Vec::new(),
            publish_date,
            update_date: publish_date,
            code_url: None,
            abstract_text: None,
            category: UNCATEGORIZED.to_string(),
            citation_count: None,
            influential_citation_count: None,
            venue: None,
            publication_year: None,
            affiliations: None,
            supplement_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn is_uncategorized(&self) -> bool {
        self.category == UNCATEGORIZED
    }

    /// Merge the populated fields of `incoming` over `self`.
    ///
    /// Identity, creation time and supplement fields are kept from the
    /// stored row unless `incoming` carries a value. The caller decides
    /// whether the sentinel category is acceptable; this merge never writes it.
    pub fn merged_with(&self, incoming: &Paper, now: DateTime<Utc>) -> Paper {
        let mut merged = self.clone();
        if !incoming.title.is_empty() {
            merged.title = incoming.title.clone();
        }
        if !incoming.authors.is_empty() {
            merged.authors = incoming.authors.clone();
        }
        merged.publish_date = incoming.publish_date;
        merged.update_date = incoming.update_date;
        if !incoming.pdf_url.is_empty() {
            merged.pdf_url = incoming.pdf_url.clone();
        }
        if incoming.code_url.is_some() {
            merged.code_url = incoming.code_url.clone();
        }
        if incoming.abstract_text.is_some() {
            merged.abstract_text = incoming.abstract_text.clone();
        }
        if !incoming.is_uncategorized() {
            merged.category = incoming.category.clone();
        }
        if incoming.citation_count.is_some() {
            merged.citation_count = incoming.citation_count;
        }
        if incoming.influential_citation_count.is_some() {
            merged.influential_citation_count = incoming.influential_citation_count;
        }
        if incoming.venue.is_some() {
            merged.venue = incoming.venue.clone();
        }
        if incoming.publication_year.is_some() {
            merged.publication_year = incoming.publication_year;
        }
        if incoming.affiliations.is_some() {
            merged.affiliations = incoming.affiliations.clone();
        }
        if incoming.supplement_updated_at.is_some() {
            merged.supplement_updated_at = incoming.supplement_updated_at;
        }
        merged.updated_at = now;
        merged
    }

    /// Apply enrichment results and stamp the refresh time
    pub fn with_supplement(&self, supplement: &Supplement, now: DateTime<Utc>) -> Paper {
        let mut paper = self.clone();
        paper.citation_count = supplement.citation_count.or(paper.citation_count);
        paper.influential_citation_count = supplement
            .influential_citation_count
            .or(paper.influential_citation_count);
        paper.venue = supplement.venue.clone().or(paper.venue);
        paper.publication_year = supplement.publication_year.or(paper.publication_year);
        paper.affiliations = supplement.affiliations.clone().or(paper.affiliations);
        paper.supplement_updated_at = Some(now);
        paper.updated_at = now;
        paper
    }
}

/// Strip the abstract-page URL prefix and the `vN` version suffix
pub fn normalize_arxiv_id(raw: &str) -> String {
    let trimmed = raw.trim();
    let tail = trimmed
        .rsplit_once("/abs/")
        .map(|(_, rest)| rest)
        .unwrap_or(trimmed);
    let tail = tail.trim_start_matches("arXiv:").trim_end_matches('/');

    match tail.rfind('v') {
        Some(pos)
            if pos > 0
                && pos + 1 < tail.len()
                && tail[pos + 1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            tail[..pos].to_string()
        }
        _ => tail.to_string(),
    }
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_normalize_arxiv_id() {
        assert_eq!(normalize_arxiv_id("http://arxiv.org/abs/2501.00001v2"), "2501.00001");
        assert_eq!(normalize_arxiv_id("2501.00001"), "2501.00001");
        assert_eq!(normalize_arxiv_id("arXiv:2501.00001v11"), "2501.00001");
        assert_eq!(normalize_arxiv_id("http://arxiv.org/abs/cs/0112017v1"), "cs/0112017");
        assert_eq!(normalize_arxiv_id("cs.RO/0112017v1"), "cs.RO/0112017");
    }

    #[test]
    fn test_new_collapses_title_and_defaults_pdf() {
        let paper = Paper::new("2501.00003v1", "  Robust\n   grasping ", date(2025, 1, 2));
        assert_eq!(paper.id, "2501.00003");
        assert_eq!(paper.title, "Robust grasping");
        assert_eq!(paper.pdf_url, "https://arxiv.org/pdf/2501.00003");
        assert!(paper.is_uncategorized());
    }

    #[test]
    fn test_merge_keeps_existing_when_incoming_missing() {
        let mut stored = Paper::new("a1", "Old title", date(2025, 1, 1)).with_category("Operation/Grasp");
        stored.code_url = Some("https://github.com/x/y".into());
        stored.citation_count = Some(12);

        let incoming = Paper::new("a1", "New title", date(2025, 1, 1));
        let merged = stored.merged_with(&incoming, Utc::now());

        assert_eq!(merged.title, "New title");
        assert_eq!(merged.category, "Operation/Grasp");
        assert_eq!(merged.code_url.as_deref(), Some("https://github.com/x/y"));
        assert_eq!(merged.citation_count, Some(12));
        assert_eq!(merged.created_at, stored.created_at);
    }

    #[test]
    fn test_with_supplement_stamps_refresh() {
        let paper = Paper::new("a1", "Title", date(2025, 1, 1));
        let now = Utc::now();
        let enriched = paper.with_supplement(
            &Supplement {
                citation_count: Some(4),
                venue: Some("CoRL".into()),
                ..Default::default()
            },
            now,
        );
        assert_eq!(enriched.citation_count, Some(4));
        assert_eq!(enriched.venue.as_deref(), Some("CoRL"));
        assert_eq!(enriched.supplement_updated_at, Some(now));
    }
}
