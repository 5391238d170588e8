//! Echo Filter
//!
//! Keeps the coach's own synthesized voice, picked up by the microphone,
//! from being transcribed as learner speech.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid regex");
}

/// Default minimum candidate length (normalized chars) before echo checks apply
pub const DEFAULT_MIN_CHARS: usize = 6;

/// Default word-overlap ratio at which a candidate counts as echo
pub const DEFAULT_OVERLAP_RATIO: f64 = 0.7;

/// Lower-case, turn punctuation/symbol runs into spaces, collapse whitespace
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    NON_WORD
        .replace_all(&lower, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone)]
pub struct EchoFilter {
    min_chars: usize,
    overlap_ratio: f64,
}

impl Default for EchoFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHARS, DEFAULT_OVERLAP_RATIO)
    }
}

impl EchoFilter {
    pub fn new(min_chars: usize, overlap_ratio: f64) -> Self {
        Self {
            min_chars,
            overlap_ratio,
        }
    }

    /// True when `candidate` looks like a replay of `reference`
    pub fn is_echo(&self, candidate: &str, reference: &str) -> bool {
        let candidate = normalize(candidate);
        let reference = normalize(reference);

        if candidate.is_empty() || reference.is_empty() {
            return false;
        }
        // Short replies like "yes" are never treated as echo
        if candidate.chars().count() < self.min_chars {
            return false;
        }
        if reference.contains(&candidate) || candidate.contains(&reference) {
            return true;
        }

        self.overlap(&candidate, &reference) >= self.overlap_ratio
    }

    fn overlap(&self, candidate: &str, reference: &str) -> f64 {
        let candidate_words: HashSet<&str> = candidate.split_whitespace().collect();
        let reference_words: Vec<&str> = reference.split_whitespace().collect();

        let denominator = candidate_words.len().max(reference_words.len());
        if denominator == 0 {
            return 0.0;
        }

        let shared = reference_words
            .iter()
            .filter(|w| candidate_words.contains(*w))
            .count();
        shared as f64 / denominator as f64
    }
}
