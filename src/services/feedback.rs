//! Feedback shape and normalization
//!
//! Feedback responses come from a language model and are loosely shaped.
//! `Feedback::normalize` is total: any JSON value yields the full canonical
//! shape, with empty defaults for whatever is missing or malformed.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

pub const FEEDBACK_VERSION: &str = "1.2";
const MAX_SUGGESTIONS: usize = 10;

/// A 0..=10 skill score, or the "not scored" sentinel (serialized as "-")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Score {
    Scored(u8),
    #[default]
    Unscored,
}

impl Score {
    /// Numbers and numeric strings are rounded and clamped, anything else is unscored
    pub fn from_value(value: Option<&Value>) -> Self {
        let number = match value {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(x) if x.is_finite() => Score::Scored(x.round().clamp(0.0, 10.0) as u8),
            _ => Score::Unscored,
        }
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Score::Scored(n) => write!(f, "{}", n),
            Score::Unscored => write!(f, "-"),
        }
    }
}

impl Serialize for Score {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Score::Scored(n) => serializer.serialize_u8(*n),
            Score::Unscored => serializer.serialize_str("-"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    #[default]
    Moderate,
    Major,
}

impl Severity {
    fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("minor") => Severity::Minor,
            Some("major") => Severity::Major,
            _ => Severity::Moderate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Correction {
    pub mistake: String,
    pub better: String,
    pub rule: String,
    pub explanation: String,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub span: String,
    pub severity: Severity,
}

impl Correction {
    fn from_value(value: &Value) -> Option<Self> {
        let empty = Map::new();
        let obj = value.as_object().unwrap_or(&empty);
        let correction = Self {
            mistake: first_text(obj, &["mistake", "from", "original"]),
            better: first_text(obj, &["better", "to", "fix"]),
            rule: first_text(obj, &["rule", "label"]),
            explanation: first_text(obj, &["explanation", "why"]),
            start: obj.get("start").and_then(Value::as_i64),
            end: obj.get("end").and_then(Value::as_i64),
            span: first_text(obj, &["span"]),
            severity: Severity::from_value(obj.get("severity")),
        };

        let has_content = !(correction.mistake.is_empty()
            && correction.better.is_empty()
            && correction.rule.is_empty()
            && correction.explanation.is_empty());
        has_content.then_some(correction)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SkillScore {
    pub score: Score,
    pub tip: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Pronunciation {
    pub score: Score,
    pub tip: String,
    pub sounds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Grammar {
    pub score: Score,
    pub tip: String,
    pub corrections: Vec<Correction>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Vocab {
    pub score: Score,
    pub tip: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackMeta {
    pub version: String,
    pub char_count: usize,
}

impl Default for FeedbackMeta {
    fn default() -> Self {
        Self {
            version: FEEDBACK_VERSION.to_string(),
            char_count: 0,
        }
    }
}

/// Canonical feedback for one utterance
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Feedback {
    pub pronunciation: Pronunciation,
    pub grammar: Grammar,
    pub fluency: SkillScore,
    pub vocab: Vocab,
    pub comprehension: SkillScore,
    pub confidence: SkillScore,
    pub evidence: Vec<String>,
    pub overall_tip: String,
    pub meta: FeedbackMeta,
}

impl Feedback {
    /// Build the canonical shape from any JSON value. Never fails.
    pub fn normalize(raw: &Value) -> Self {
        let empty = Map::new();
        let root = raw.as_object().unwrap_or(&empty);
        let section = |key: &str| root.get(key).and_then(Value::as_object).unwrap_or(&empty);

        let pronunciation = section("pronunciation");
        let grammar = section("grammar");
        let vocab = section("vocab");

        let corrections = grammar
            .get("corrections")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Correction::from_value).collect())
            .unwrap_or_default();

        let suggestions = vocab
            .get("suggestions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(suggestion_to_string)
                    .filter(|s| !s.is_empty())
                    .take(MAX_SUGGESTIONS)
                    .collect()
            })
            .unwrap_or_default();

        let char_count = section("meta")
            .get("char_count")
            .and_then(|v| match v {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .filter(|n| n.is_finite() && *n > 0.0)
            .map(|n| n as usize)
            .unwrap_or(0);

        Self {
            pronunciation: Pronunciation {
                score: Score::from_value(pronunciation.get("score")),
                tip: first_text(pronunciation, &["tip"]),
                sounds: string_list(pronunciation.get("sounds")),
            },
            grammar: Grammar {
                score: Score::from_value(grammar.get("score")),
                tip: first_text(grammar, &["tip"]),
                corrections,
            },
            fluency: skill(section("fluency")),
            vocab: Vocab {
                score: Score::from_value(vocab.get("score")),
                tip: first_text(vocab, &["tip"]),
                suggestions,
            },
            comprehension: skill(section("comprehension")),
            confidence: skill(section("confidence")),
            evidence: string_list(root.get("evidence")),
            overall_tip: first_text(root, &["overall_tip", "overall", "tip"]),
            meta: FeedbackMeta {
                version: FEEDBACK_VERSION.to_string(),
                char_count,
            },
        }
    }

    /// Stand-in when the feedback body was not JSON at all
    pub fn unparseable(transcript: &str) -> Self {
        let mut feedback = Self::default();
        feedback.grammar.tip = "Couldn't parse feedback. Try rephrasing.".to_string();
        feedback.overall_tip = "Say it again in one or two clear sentences.".to_string();
        let quote: String = transcript.trim().chars().take(80).collect();
        if !quote.is_empty() {
            feedback.evidence.push(quote);
        }
        feedback.meta.char_count = transcript.chars().count();
        feedback
    }

    /// Scored skills in display order
    pub fn scores(&self) -> [(&'static str, Score); 6] {
        [
            ("pronunciation", self.pronunciation.score),
            ("grammar", self.grammar.score),
            ("fluency", self.fluency.score),
            ("vocab", self.vocab.score),
            ("comprehension", self.comprehension.score),
            ("confidence", self.confidence.score),
        ]
    }
}

fn skill(section: &Map<String, Value>) -> SkillScore {
    SkillScore {
        score: Score::from_value(section.get("score")),
        tip: first_text(section, &["tip"]),
    }
}

/// Scalar to trimmed text; objects, arrays and null are treated as absent
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// The first of `keys` holding non-empty text
fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .map(scalar_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Accepts an array of values or a newline-separated string
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .lines()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a vocabulary suggestion of any shape as one line
fn suggestion_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(obj) => {
            let word = first_text(obj, &["word", "term", "phrase", "text", "vocab", "entry"]);
            let definition = first_text(
                obj,
                &["definition", "gloss", "meaning", "note", "tip", "expl"],
            );
            let example = first_text(obj, &["example", "eg", "usage", "sentence"]);

            let mut line = word;
            if !definition.is_empty() {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str("— ");
                line.push_str(&definition);
            }
            if !example.is_empty() {
                line.push_str(&format!(" (e.g., {})", example));
            }

            let line = line.trim().to_string();
            if line.is_empty() {
                value.to_string()
            } else {
                line
            }
        }
        _ => String::new(),
    }
}
