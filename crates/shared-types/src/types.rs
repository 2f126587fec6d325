use serde::{Deserialize, Serialize};

/// Coarse verbosity classification of a text snapshot.
///
/// Ordered so that `Neutral < Low < Medium < High`; `Neutral` means there was
/// not enough text to judge.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Neutral,
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Neutral => "neutral",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Severity::Neutral)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub value: String,
}

impl Replacement {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// One span-addressed problem in a text snapshot.
///
/// `offset` and `length` are UTF-16 code units into the text that produced
/// the enclosing [`AnalysisResult`]. They are never re-derived after the text
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub offset: usize,
    pub length: usize,
    /// Most-preferred first
    #[serde(default)]
    pub candidate_replacements: Vec<Replacement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Issue {
    pub fn new(offset: usize, length: usize, replacements: &[&str]) -> Self {
        Self {
            offset,
            length,
            candidate_replacements: replacements.iter().map(|r| Replacement::new(*r)).collect(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Exclusive end of the span
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Top-ranked replacement, if any
    pub fn first_choice(&self) -> Option<&str> {
        self.candidate_replacements.first().map(|r| r.value.as_str())
    }

    /// First replacement with a non-empty value, falling back to the top choice
    pub fn first_non_empty(&self) -> Option<&str> {
        self.candidate_replacements
            .iter()
            .map(|r| r.value.as_str())
            .find(|v| !v.is_empty())
            .or_else(|| self.first_choice())
    }
}

/// Immutable analysis of one text snapshot.
///
/// The outstanding issue count is always `issues.len()`; it is not stored
/// separately so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub severity: Severity,
    pub original_text: String,
    pub corrected_text: String,
    #[serde(default)]
    pub savings_percent: f64,
    #[serde(default)]
    pub original_tokens: u32,
    #[serde(default)]
    pub corrected_tokens: u32,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

impl AnalysisResult {
    /// Result for text too short to judge
    pub fn neutral(text: &str) -> Self {
        Self {
            severity: Severity::Neutral,
            original_text: text.to_string(),
            corrected_text: text.to_string(),
            savings_percent: 0.0,
            original_tokens: 0,
            corrected_tokens: 0,
            issues: Vec::new(),
        }
    }

    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }

    pub fn has_changes(&self) -> bool {
        self.corrected_text != self.original_text
    }
}

/// Output of the shortening operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortened {
    pub shortened_text: String,
    pub savings_percent: f64,
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: first_non_empty skips blanks and only falls back to the top choice
        #[test]
        fn first_non_empty_prefers_text(values in prop::collection::vec("[a-z]{0,3}", 0..6)) {
            let refs: Vec<&str> = values.iter().map(String::as_str).collect();
            let issue = Issue::new(0, 1, &refs);
            match values.iter().find(|v| !v.is_empty()) {
                Some(v) => prop_assert_eq!(issue.first_non_empty(), Some(v.as_str())),
                None => prop_assert_eq!(issue.first_non_empty(), issue.first_choice()),
            }
        }
    }
}
