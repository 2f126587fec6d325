//! Local fallback analyzer
//!
//! Deterministic regex rules for wordy phrasing. Used when no remote analyzer
//! is configured, when the remote one fails, and for the immediate coarse pass
//! on every keystroke.
//!
//! Rules:
//! - Politeness padding ("please", "kindly") and sign-offs ("thanks in advance")
//! - Filler adverbs ("basically", "actually", "really", ...)
//! - Wordy connectives ("in order to" → "to", "due to the fact that" → "because")
//! - Repeated spaces

use crate::analyzer::Analyzer;
use crate::convergence::{apply_issues, byte_to_utf16, ReplacementStrategy};
use crate::error::LensError;
use lazy_static::lazy_static;
use regex::Regex;
use shared_types::{AnalysisResult, Issue, Severity, Shortened};

lazy_static! {
    /// (pattern, replacement, message), in priority order
    static ref RULES: Vec<(Regex, &'static str, &'static str)> = vec![
        (
            Regex::new(r"(?i)\b(please|kindly)\b\s*").unwrap(),
            "",
            "politeness padding",
        ),
        (
            Regex::new(r"(?i)\s*\b(thanks|thank\s+you)(\s+(so|very)\s+much)?(\s+in\s+advance)?\s*[.!]?").unwrap(),
            "",
            "sign-off",
        ),
        (
            Regex::new(r"(?i)\bI\s+think\s+(that\s+)?").unwrap(),
            "",
            "hedging",
        ),
        (
            Regex::new(r"(?i)\b(basically|actually|really|very|just|simply)\s+").unwrap(),
            "",
            "filler word",
        ),
        (
            Regex::new(r"(?i)\bin\s+order\s+to\b").unwrap(),
            "to",
            "wordy connective",
        ),
        (
            Regex::new(r"(?i)\bdue\s+to\s+the\s+fact\s+that\b").unwrap(),
            "because",
            "wordy connective",
        ),
        (
            Regex::new(r"(?i)\bat\s+this\s+point\s+in\s+time\b").unwrap(),
            "now",
            "wordy phrase",
        ),
        (
            Regex::new(r"(?i)\bfor\s+the\s+purpose\s+of\b").unwrap(),
            "for",
            "wordy connective",
        ),
        (
            Regex::new(r"(?i)\bin\s+the\s+event\s+that\b").unwrap(),
            "if",
            "wordy connective",
        ),
        (
            Regex::new(r"(?i)\ba\s+large\s+number\s+of\b").unwrap(),
            "many",
            "wordy phrase",
        ),
        (
            Regex::new(r"(?i)\bhas\s+the\s+ability\s+to\b").unwrap(),
            "can",
            "wordy phrase",
        ),
        (
            Regex::new(r"(?i)\bmake\s+sure\s+that\b").unwrap(),
            "ensure",
            "wordy phrase",
        ),
        (Regex::new(r" {2,}").unwrap(), " ", "repeated spaces"),
    ];

    static ref WORD: Regex = Regex::new(r"\w+").unwrap();
}

/// Rough token estimate: four characters per token
pub fn estimate_tokens(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars.div_ceil(4)
}

pub fn word_count(text: &str) -> usize {
    WORD.find_iter(text).count()
}

/// Severity from the share of text the rules would remove
pub fn severity_for_savings(savings_percent: f64) -> Severity {
    if savings_percent < 5.0 {
        Severity::Low
    } else if savings_percent < 20.0 {
        Severity::Medium
    } else {
        Severity::High
    }
}

fn match_case(matched: &str, replacement: &str) -> String {
    let starts_upper = matched.chars().next().is_some_and(char::is_uppercase);
    let mut chars = replacement.chars();
    match chars.next() {
        Some(first) if starts_upper => first.to_uppercase().chain(chars).collect(),
        _ => replacement.to_string(),
    }
}

fn savings(original: u32, corrected: u32) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let saved = original.saturating_sub(corrected) as f64;
    (saved / original as f64 * 1000.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAnalyzer {
    min_words: usize,
}

impl Default for LocalAnalyzer {
    fn default() -> Self {
        Self::new(3)
    }
}

impl LocalAnalyzer {
    pub fn new(min_words: usize) -> Self {
        Self { min_words }
    }

    /// Find every rule match as a UTF-16 addressed issue, non-overlapping,
    /// sorted by offset
    pub fn find_issues(&self, text: &str) -> Vec<Issue> {
        let mut spans: Vec<(usize, usize, String, &'static str)> = Vec::new();
        for (pattern, replacement, message) in RULES.iter() {
            for m in pattern.find_iter(text) {
                if m.as_str().is_empty() {
                    continue;
                }
                spans.push((m.start(), m.end(), match_case(m.as_str(), replacement), *message));
            }
        }
        // Earliest first, longest first on ties; later overlapping spans lose
        spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut issues = Vec::new();
        let mut covered = 0;
        for (start, end, replacement, message) in spans {
            if start < covered {
                continue;
            }
            covered = end;
            let offset = byte_to_utf16(text, start);
            let length = byte_to_utf16(text, end) - offset;
            issues.push(Issue::new(offset, length, &[replacement.as_str()]).with_message(message));
        }
        issues
    }

    /// Synchronous analysis
    pub fn analyze_now(&self, text: &str) -> AnalysisResult {
        if word_count(text) < self.min_words {
            return AnalysisResult::neutral(text);
        }

        let issues = self.find_issues(text);
        let corrected = apply_issues(text, &issues, ReplacementStrategy::FirstChoice).text;
        let original_tokens = estimate_tokens(text);
        let corrected_tokens = estimate_tokens(&corrected);
        let savings_percent = savings(
            text.chars().count() as u32,
            corrected.chars().count() as u32,
        );

        AnalysisResult {
            severity: severity_for_savings(savings_percent),
            original_text: text.to_string(),
            corrected_text: corrected,
            savings_percent,
            original_tokens,
            corrected_tokens,
            issues,
        }
    }

    /// Synchronous shortening: every rule applied, then trimmed
    pub fn shorten_now(&self, text: &str) -> Shortened {
        let issues = self.find_issues(text);
        let shortened_text = apply_issues(text, &issues, ReplacementStrategy::FirstChoice)
            .text
            .trim()
            .to_string();
        let savings_percent = savings(
            text.chars().count() as u32,
            shortened_text.chars().count() as u32,
        );
        Shortened {
            shortened_text,
            savings_percent,
        }
    }
}

impl Analyzer for LocalAnalyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, LensError> {
        Ok(self.analyze_now(text))
    }

    async fn shorten(&self, text: &str) -> Result<Shortened, LensError> {
        Ok(self.shorten_now(text))
    }
}
