//! Keyword-scored paper classifier
//!
//! Deterministic: the result depends only on the input text and the
//! static taxonomy tables. No iteration over hashed collections feeds
//! the decision.

use crate::taxonomy::{Label, CATCH_ALL, LABELS, NEGATIVE_MARKERS, ROBOT_CONTEXT_MARKERS, UNCATEGORIZED};

const TITLE_EXACT: f64 = 5.0;
const ABSTRACT_EXACT: f64 = 3.0;
const TITLE_SUBSTRING: f64 = 2.0;
const ABSTRACT_SUBSTRING: f64 = 1.0;
const BOTH_FIELDS_BONUS: f64 = 2.0;
const PROXIMITY: f64 = 4.0;
const PROXIMITY_WINDOW: usize = 50;

const NAME_TITLE_EXACT: f64 = 3.0;
const NAME_ABSTRACT_EXACT: f64 = 2.0;
const NAME_TITLE_SUBSTRING: f64 = 1.5;
const NAME_ABSTRACT_SUBSTRING: f64 = 1.0;

const MIN_MATCHES: usize = 2;
const MIN_SCORE: f64 = 5.0;

/// Robot context required before the fallback table applies
const FALLBACK_CONTEXT: &[&str] = &["robot", "robotic", "embodied", "manipulator", "机器人", "具身"];

/// Ordered fallback rows; first row with a matching term wins
const FALLBACK_RULES: &[(&[&str], &str)] = &[
    (&["vla", "vision-language-action"], "Operation/Vision-Language-Action Models"),
    (&["vlm", "vision-language", "multimodal"], "Perception/Vision-Language Model"),
    (&["grasp"], "Operation/Grasp"),
    (&["dexterous", "in-hand", "finger"], "Operation/Dexterous Manipulation"),
    (
        &["imitation", "demonstration", "teleoperation", "diffusion policy"],
        "Operation/Imitation Learning",
    ),
    (&["humanoid"], "Locomotion/Humanoid"),
    (&["legged", "quadruped", "locomotion", "walking"], "Locomotion/Legged Locomotion"),
    (&["navigation", "navigate"], "Decision/Navigation"),
    (&["mobile"], "Operation/Mobile Manipulation"),
    (&["planning", "planner", "task"], "Decision/Task Planning"),
    (&["reasoning", "thought", "llm", "language model"], "Decision/Chain of Thought"),
    (&["reinforcement", "reward", "policy"], "Decision/Reinforcement Learning"),
    (&["world model", "prediction"], "Decision/World Model"),
    (&["point cloud", "3d", "depth"], "Perception/3D Perception"),
    (&["tactile", "touch"], "Perception/Tactile Perception"),
    (&["slam", "localization", "mapping"], "Perception/SLAM & Localization"),
    (&["simulation", "simulator", "sim2real"], "Simulation/Simulators"),
    (&["benchmark", "dataset"], "Benchmark/Datasets & Benchmarks"),
    (&["detection", "segmentation"], "Perception/2D Perception"),
    (&["manipulation", "manipulator"], "Operation/Dexterous Manipulation"),
];

/// Score breakdown for one label
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub key: &'static str,
    pub score: f64,
    pub matches: usize,
}

impl LabelScore {
    fn qualifies(&self) -> bool {
        self.matches >= MIN_MATCHES || self.score >= MIN_SCORE
    }
}

/// A lowercased text field with its word tokens and their byte offsets
struct Field {
    raw: String,
    tokens: Vec<(usize, String)>,
}

impl Field {
    fn new(text: &str) -> Self {
        let raw = text.to_lowercase();
        let tokens = tokenize(&raw);
        Self { raw, tokens }
    }

    fn is_empty(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// Keyword occurs on word boundaries.
    /// CJK keywords have no boundaries and count on a raw substring hit.
    fn exact(&self, keyword: &str, keyword_tokens: &[String]) -> bool {
        if !keyword.is_ascii() {
            return self.raw.contains(keyword);
        }
        if keyword_tokens.is_empty() || keyword_tokens.len() > self.tokens.len() {
            return false;
        }
        self.tokens
            .windows(keyword_tokens.len())
            .any(|w| w.iter().zip(keyword_tokens).all(|((_, t), k)| t == k))
    }

    fn substring(&self, keyword: &str) -> bool {
        self.raw.contains(keyword)
    }

    /// Both words of a two-word keyword appear within the window
    fn near(&self, keyword_tokens: &[String]) -> bool {
        let [first, second] = keyword_tokens else {
            return false;
        };
        let positions = |word: &String| {
            self.tokens
                .iter()
                .filter(|(_, t)| t == word)
                .map(|(pos, _)| *pos)
                .collect::<Vec<_>>()
        };
        let a = positions(first);
        let b = positions(second);
        a.iter()
            .any(|pa| b.iter().any(|pb| pa.abs_diff(*pb) <= PROXIMITY_WINDOW))
    }

    /// Term test used by the context markers and the fallback table:
    /// multi-word and CJK terms match as substrings, single ASCII words
    /// match as a token prefix (`grasp` hits `grasping`).
    fn mentions(&self, term: &str) -> bool {
        if !term.is_ascii() || term.contains(|c: char| !c.is_alphanumeric()) {
            return self.raw.contains(term);
        }
        self.tokens.iter().any(|(_, t)| t.starts_with(term))
    }
}

fn tokenize(text: &str) -> Vec<(usize, String)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        match (ch.is_alphanumeric(), start) {
            (true, None) => start = Some(idx),
            (false, Some(s)) => {
                tokens.push((s, text[s..idx].to_string()));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((s, text[s..].to_string()));
    }
    tokens
}

fn split_words(keyword: &str) -> Vec<String> {
    tokenize(keyword).into_iter().map(|(_, t)| t).collect()
}

struct CompiledLabel {
    label: &'static Label,
    keywords: Vec<(&'static str, Vec<String>)>,
    english: String,
    english_tokens: Vec<String>,
}

/// Maps a title and optional abstract to a taxonomy label
pub struct Classifier {
    labels: Vec<CompiledLabel>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        let labels = LABELS
            .iter()
            .map(|label| {
                let english = label.english.to_lowercase();
                CompiledLabel {
                    label,
                    keywords: label.keywords.iter().map(|k| (*k, split_words(k))).collect(),
                    english_tokens: split_words(&english),
                    english,
                }
            })
            .collect();
        Self { labels }
    }

    /// Classify a record. Returns [`UNCATEGORIZED`] when the text is
    /// off-domain or carries no robot context at all.
    pub fn classify(&self, title: &str, abstract_text: Option<&str>) -> &'static str {
        let title = Field::new(title);
        let abstract_field = Field::new(abstract_text.unwrap_or_default());
        let fields = [&title, &abstract_field];

        if Self::is_excluded(&fields) {
            return UNCATEGORIZED;
        }

        let best = self
            .score_fields(&title, &abstract_field)
            .into_iter()
            .filter(LabelScore::qualifies)
            .reduce(|best, candidate| {
                if candidate.score > best.score
                    || (candidate.score == best.score && candidate.key < best.key)
                {
                    candidate
                } else {
                    best
                }
            });

        if let Some(best) = best {
            return best.key;
        }

        Self::fallback(&fields)
    }

    /// Per-label scores for every label with a non-zero score, in taxonomy order
    pub fn scores(&self, title: &str, abstract_text: Option<&str>) -> Vec<LabelScore> {
        let title = Field::new(title);
        let abstract_field = Field::new(abstract_text.unwrap_or_default());
        self.score_fields(&title, &abstract_field)
    }

    fn is_excluded(fields: &[&Field]) -> bool {
        let negative = NEGATIVE_MARKERS
            .iter()
            .any(|m| fields.iter().any(|f| f.substring(m)));
        negative && !Self::has_any(fields, ROBOT_CONTEXT_MARKERS)
    }

    fn has_any(fields: &[&Field], terms: &[&str]) -> bool {
        terms.iter().any(|t| fields.iter().any(|f| f.mentions(t)))
    }

    fn fallback(fields: &[&Field]) -> &'static str {
        if !Self::has_any(fields, FALLBACK_CONTEXT) {
            return UNCATEGORIZED;
        }
        FALLBACK_RULES
            .iter()
            .find(|(terms, _)| Self::has_any(fields, terms))
            .map(|(_, key)| *key)
            .unwrap_or(CATCH_ALL)
    }

    fn score_fields(&self, title: &Field, abstract_field: &Field) -> Vec<LabelScore> {
        let has_abstract = !abstract_field.is_empty();
        let mut out = Vec::new();

        for compiled in &self.labels {
            let mut score = 0.0;
            let mut matches = 0;

            for (keyword, tokens) in &compiled.keywords {
                let in_title = Self::keyword_weight(title, keyword, tokens, TITLE_EXACT, TITLE_SUBSTRING);
                let in_abstract = if has_abstract {
                    Self::keyword_weight(abstract_field, keyword, tokens, ABSTRACT_EXACT, ABSTRACT_SUBSTRING)
                } else {
                    0.0
                };
                if in_title > 0.0 || in_abstract > 0.0 {
                    matches += 1;
                    score += in_title + in_abstract;
                    if in_title > 0.0 && in_abstract > 0.0 {
                        score += BOTH_FIELDS_BONUS;
                    }
                }
            }

            score += Self::name_weight(title, compiled, NAME_TITLE_EXACT, NAME_TITLE_SUBSTRING);
            if has_abstract {
                score += Self::name_weight(
                    abstract_field,
                    compiled,
                    NAME_ABSTRACT_EXACT,
                    NAME_ABSTRACT_SUBSTRING,
                );
            }

            if score > 0.0 {
                out.push(LabelScore {
                    key: compiled.label.key,
                    score,
                    matches,
                });
            }
        }
        out
    }

    fn keyword_weight(field: &Field, keyword: &str, tokens: &[String], exact: f64, substring: f64) -> f64 {
        if field.exact(keyword, tokens) {
            exact
        } else if field.near(tokens) {
            PROXIMITY
        } else if field.substring(keyword) {
            substring
        } else {
            0.0
        }
    }

    fn name_weight(field: &Field, compiled: &CompiledLabel, exact: f64, substring: f64) -> f64 {
        if field.exact(&compiled.english, &compiled.english_tokens) {
            exact
        } else if field.substring(&compiled.english) {
            substring
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_of_thought_beats_task_planning() {
        let c = Classifier::new();
        let title = "A novel chain-of-thought approach for robot task planning";
        assert_eq!(c.classify(title, None), "Decision/Chain of Thought");
        assert_eq!(c.classify(title, Some("")), "Decision/Chain of Thought");

        let scores = c.scores(title, None);
        let cot = scores.iter().find(|s| s.key == "Decision/Chain of Thought").unwrap();
        let tp = scores.iter().find(|s| s.key == "Decision/Task Planning").unwrap();
        assert!(cot.score > tp.score);
    }

    #[test]
    fn test_grasp_title() {
        let c = Classifier::new();
        assert_eq!(c.classify("Learning to grasp transparent objects", None), "Operation/Grasp");
        assert_eq!(
            c.classify("Robotic Grasping with Point Clouds", None),
            "Operation/Grasp"
        );
    }

    #[test]
    fn test_negative_domain_without_robot_context() {
        let c = Classifier::new();
        assert_eq!(
            c.classify("Quantum dynamics of molecular systems", Some("A world model of molecules")),
            UNCATEGORIZED
        );
        // Robot context rescues the text from exclusion
        assert_ne!(
            c.classify("Robotic chemistry lab with grasp planning", None),
            UNCATEGORIZED
        );
    }

    #[test]
    fn test_generic_ai_is_uncategorized() {
        let c = Classifier::new();
        assert_eq!(c.classify("A neural model for learning", Some("We train an AI model.")), UNCATEGORIZED);
    }

    #[test]
    fn test_fallback_table() {
        let c = Classifier::new();
        // "vla" as a word qualifies via scoring; a plural only reaches the fallback
        assert_eq!(
            c.classify("Scaling VLAs for robot control", None),
            "Operation/Vision-Language-Action Models"
        );
        assert_eq!(c.classify("A robot that walks on ice", None), CATCH_ALL);
        assert_eq!(
            c.classify("Robot fingers with compliant pads", None),
            "Operation/Dexterous Manipulation"
        );
    }

    #[test]
    fn test_cjk_keywords() {
        let c = Classifier::new();
        assert_eq!(c.classify("基于视觉的机器人抓取方法", None), "Operation/Grasp");
    }

    #[test]
    fn test_proximity_match() {
        let c = Classifier::new();
        let scores = c.scores("An embodied agent benchmark", None);
        let bench = scores
            .iter()
            .find(|s| s.key == "Benchmark/Datasets & Benchmarks")
            .unwrap();
        // "benchmark" exact (5) plus "embodied benchmark" by proximity (4)
        assert_eq!(bench.score, 9.0);
        assert_eq!(bench.matches, 2);
    }

    #[test]
    fn test_deterministic() {
        let c = Classifier::new();
        let title = "Humanoid whole-body control with diffusion policy";
        let abs = Some("We study imitation learning for humanoid robots.");
        let first = c.classify(title, abs);
        for _ in 0..10 {
            assert_eq!(Classifier::new().classify(title, abs), first);
        }
    }

    #[test]
    fn test_tokenize_offsets() {
        let tokens = tokenize("chain-of-thought, robot");
        let words: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(words, ["chain", "of", "thought", "robot"]);
        assert_eq!(tokens[3].0, 18);
    }
}
