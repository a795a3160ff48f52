//! Two-stage embodied-AI keyword filter for news items
//!
//! 1. keep when a core keyword is present
//! 2. otherwise drop when a negative keyword is present
//! 3. otherwise strict sources need a broad keyword; lenient ones pass

use robodigest_common::config::FiltersConfig;

#[derive(Debug, Clone)]
pub struct KeywordFilter {
    core: Vec<String>,
    negative: Vec<String>,
    broad: Vec<String>,
}

impl KeywordFilter {
    pub fn new(config: &FiltersConfig) -> Self {
        let fold = |list: &[String]| {
            list.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect()
        };
        Self {
            core: fold(&config.core),
            negative: fold(&config.negative),
            broad: fold(&config.broad),
        }
    }

    pub fn accepts(&self, text: &str, strict: bool) -> bool {
        let text = text.to_lowercase();
        if self.core.iter().any(|k| contains_keyword(&text, k)) {
            return true;
        }
        if self.negative.iter().any(|k| contains_keyword(&text, k)) {
            return false;
        }
        !strict || self.broad.iter().any(|k| contains_keyword(&text, k))
    }
}

/// Keyword match on lowercased text.
///
/// Short single ASCII words (`ai`) must match a whole token; longer
/// ones match a token prefix so `robot` covers `robots`. Phrases and
/// CJK keywords match as substrings.
fn contains_keyword(text: &str, keyword: &str) -> bool {
    let single_ascii_word = keyword.chars().all(|c| c.is_ascii_alphanumeric());
    if !single_ascii_word {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| {
            if keyword.len() <= 3 {
                token == keyword
            } else {
                token.starts_with(keyword)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> KeywordFilter {
        KeywordFilter::new(&FiltersConfig::default())
    }

    #[test]
    fn test_core_keyword_always_kept() {
        let f = filter();
        assert!(f.accepts("Humanoid robots enter the stock market", true));
        assert!(f.accepts("具身智能公司融资", true));
    }

    #[test]
    fn test_negative_keyword_rejects() {
        let f = filter();
        assert!(!f.accepts("Bitcoin rallies as AI stocks climb", true));
        assert!(!f.accepts("Quantum chip breakthrough", false));
    }

    #[test]
    fn test_strict_requires_broad_keyword() {
        let f = filter();
        assert!(!f.accepts("New coffee machine launched", true));
        assert!(f.accepts("New coffee machine launched", false));
        assert!(f.accepts("Startup ships AI for warehouses", true));
    }

    #[test]
    fn test_short_keyword_needs_whole_token() {
        let f = filter();
        // "said" must not count as "ai"
        assert!(!f.accepts("The mayor said hello", true));
        assert!(contains_keyword("robots are here", "robot"));
        assert!(!contains_keyword("brain", "ai"));
    }
}
