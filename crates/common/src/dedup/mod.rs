//! Fuzzy-title duplicate detection for papers
//!
//! Identity dedup is the store's job (primary key). This module covers
//! the second tier: near-identical titles published under different ids.

use std::collections::HashMap;

use crate::records::PaperTitle;

/// Default similarity ratio at or above which two titles are the same paper
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Lowercase, drop punctuation and collapse whitespace
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized Levenshtein similarity of two raw titles, in `[0, 1]`
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&normalize_title(a), &normalize_title(b))
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    normalized: String,
    len: usize,
}

/// In-memory index of known titles for one fetch pass.
///
/// Candidates are pruned by length first: two strings whose lengths
/// differ by more than `(1 - threshold)` of the longer one cannot reach
/// the threshold. Every surviving candidate is compared in full.
#[derive(Debug, Clone)]
pub struct TitleIndex {
    threshold: f64,
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>,
}

/// A title collision with an already-known paper
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateMatch {
    pub existing_id: String,
    pub similarity: f64,
}

impl TitleIndex {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            entries: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn from_titles(threshold: f64, titles: impl IntoIterator<Item = PaperTitle>) -> Self {
        let mut index = Self::new(threshold);
        for t in titles {
            index.insert(&t.id, &t.title);
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record a title; re-inserting an id replaces its title
    pub fn insert(&mut self, id: &str, title: &str) {
        let normalized = normalize_title(title);
        let entry = Entry {
            id: id.to_string(),
            len: normalized.chars().count(),
            normalized,
        };
        match self.by_id.get(id) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.by_id.insert(id.to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Find a paper with a different id whose title is at least
    /// `threshold` similar. Returns the best match.
    pub fn find_duplicate(&self, id: &str, title: &str) -> Option<DuplicateMatch> {
        let candidate = normalize_title(title);
        let len = candidate.chars().count();
        if len == 0 {
            return None;
        }

        let mut best: Option<DuplicateMatch> = None;
        for entry in &self.entries {
            if entry.id == id {
                continue;
            }
            let longer = len.max(entry.len) as f64;
            let diff = len.abs_diff(entry.len) as f64;
            if diff / longer > 1.0 - self.threshold {
                continue;
            }
            let score = strsim::normalized_levenshtein(&candidate, &entry.normalized);
            if score >= self.threshold && best.as_ref().map_or(true, |b| score > b.similarity) {
                best = Some(DuplicateMatch {
                    existing_id: entry.id.clone(),
                    similarity: score,
                });
            }
        }
        best
    }
}
