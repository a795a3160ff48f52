//! Source kinds handled by the pipeline

use crate::errors::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One schedulable family of sources. Each kind owns one progress slot
/// and at most one in-flight run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Papers,
    News,
    Jobs,
    Videos,
    Supplement,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::Papers,
        SourceKind::News,
        SourceKind::Jobs,
        SourceKind::Videos,
        SourceKind::Supplement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Papers => "papers",
            SourceKind::News => "news",
            SourceKind::Jobs => "jobs",
            SourceKind::Videos => "videos",
            SourceKind::Supplement => "supplement",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "papers" | "paper" | "arxiv" => Ok(SourceKind::Papers),
            "news" => Ok(SourceKind::News),
            "jobs" | "job" => Ok(SourceKind::Jobs),
            "videos" | "video" | "bilibili" => Ok(SourceKind::Videos),
            "supplement" | "supplements" => Ok(SourceKind::Supplement),
            other => Err(AppError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("Papers".parse::<SourceKind>().unwrap(), SourceKind::Papers);
        assert_eq!("video".parse::<SourceKind>().unwrap(), SourceKind::Videos);
        assert!("podcasts".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for kind in SourceKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }
}
