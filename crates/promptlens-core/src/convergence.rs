//! Iterative text-correction convergence loop
//!
//! Applies a batch of offset-addressed corrections, asks the analyzer to
//! re-score the result, and repeats until no issues remain or the iteration
//! budget runs out.
//!
//! Issues are always applied right to left. Every issue's offset refers to
//! the text that was analyzed; substituting from the highest offset down
//! means each edit only touches text to the right of every issue not yet
//! applied, so their offsets stay valid without re-derivation.

use crate::analyzer::Analyzer;
use shared_types::Issue;
use std::ops::Range;
use tracing::{debug, warn};

/// How to pick a replacement among an issue's candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementStrategy {
    /// Always the top-ranked candidate
    FirstChoice,
    /// The first candidate that is not an empty string
    FirstNonEmpty,
}

/// Length of `text` in UTF-16 code units
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// UTF-16 offset of a byte index. `byte` must lie on a char boundary.
pub fn byte_to_utf16(text: &str, byte: usize) -> usize {
    utf16_len(&text[..byte])
}

/// Map a UTF-16 span onto a byte range of `text`.
///
/// `None` when the span runs past the end or splits a surrogate pair.
pub fn utf16_span_to_bytes(text: &str, offset: usize, length: usize) -> Option<Range<usize>> {
    let end = offset.checked_add(length)?;
    let mut units = 0;
    let mut start_byte = None;
    let mut end_byte = None;

    for (byte, ch) in text.char_indices() {
        if units == offset {
            start_byte = Some(byte);
        }
        if units == end {
            end_byte = Some(byte);
            break;
        }
        units += ch.len_utf16();
    }
    if units == offset && start_byte.is_none() {
        start_byte = Some(text.len());
    }
    if units == end && end_byte.is_none() {
        end_byte = Some(text.len());
    }

    match (start_byte, end_byte) {
        (Some(s), Some(e)) if s <= e => Some(s..e),
        _ => None,
    }
}

/// Outcome of one application pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub text: String,
    pub applied: usize,
    pub skipped: usize,
}

/// Apply every issue to `text`, highest offset first.
///
/// Issues that run out of range, split a character, overlap an issue already
/// applied, or have no usable replacement are skipped rather than failing the
/// whole batch.
pub fn apply_issues(text: &str, issues: &[Issue], strategy: ReplacementStrategy) -> Applied {
    let mut ordered: Vec<&Issue> = issues.iter().collect();
    ordered.sort_by(|a, b| b.offset.cmp(&a.offset).then(b.length.cmp(&a.length)));

    let mut out = text.to_string();
    let mut floor = usize::MAX;
    let mut applied = 0;
    let mut skipped = 0;

    for issue in ordered {
        if issue.end() > floor {
            skipped += 1;
            continue;
        }
        let replacement = match strategy {
            ReplacementStrategy::FirstChoice => issue.first_choice(),
            ReplacementStrategy::FirstNonEmpty => issue.first_non_empty(),
        };
        let Some(replacement) = replacement else {
            skipped += 1;
            continue;
        };
        // Ranges come from the untouched original: everything edited so far lies to the right
        let Some(range) = utf16_span_to_bytes(text, issue.offset, issue.length) else {
            debug!(offset = issue.offset, length = issue.length, "Skipping out-of-range issue");
            skipped += 1;
            continue;
        };
        out.replace_range(range, replacement);
        floor = issue.offset;
        applied += 1;
    }

    Applied {
        text: out,
        applied,
        skipped,
    }
}

/// Final state of a convergence run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convergence {
    /// Best text obtained: the one with the fewest remaining issues, latest on ties
    pub text: String,
    /// Analyzer round-trips made
    pub iterations: u32,
    pub remaining_issues: usize,
    pub converged: bool,
}

/// Drive corrections to a fixed point or until `budget` re-analyses have run.
///
/// Strictly sequential: the next analysis is never requested before the
/// previous one resolved. An analyzer failure ends the run with the best text
/// so far.
pub async fn converge<A: Analyzer>(
    analyzer: &A,
    text: &str,
    issues: Vec<Issue>,
    budget: u32,
) -> Convergence {
    let mut current = text.to_string();
    let mut issues = issues;
    let mut strategy = ReplacementStrategy::FirstChoice;
    let mut best_text = current.clone();
    let mut best_count = issues.len();
    let mut iterations = 0;

    while iterations < budget && !issues.is_empty() {
        let pass = apply_issues(&current, &issues, strategy);
        if pass.applied == 0 {
            debug!(remaining = issues.len(), "No applicable corrections left");
            break;
        }
        current = pass.text;
        iterations += 1;

        let fresh = match analyzer.analyze(&current).await {
            Ok(result) => result.issues,
            Err(e) => {
                warn!(error = %e, iteration = iterations, "Re-analysis failed, keeping best text");
                let estimate = issues.len().saturating_sub(pass.applied);
                if estimate <= best_count {
                    best_text = current;
                    best_count = estimate;
                }
                break;
            }
        };

        let count = fresh.len();
        if count <= best_count {
            best_text = current.clone();
            best_count = count;
        }
        if count == 0 {
            break;
        }

        strategy = if count < issues.len() {
            ReplacementStrategy::FirstChoice
        } else {
            debug!(count, "No progress, switching to first non-empty replacements");
            ReplacementStrategy::FirstNonEmpty
        };
        issues = fresh;
    }

    Convergence {
        text: best_text,
        iterations,
        remaining_issues: best_count,
        converged: best_count == 0,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_text_and_issues() -> impl Strategy<Value = (String, Vec<Issue>)> {
        "[a-z😀é ]{0,40}".prop_flat_map(|text| {
            let n = utf16_len(&text);
            let issue = (0..=n, 0..=n, "[a-z]{0,3}")
                .prop_map(move |(a, b, rep)| {
                    let (start, end) = if a <= b { (a, b) } else { (b, a) };
                    Issue::new(start, end - start, &[rep.as_str()])
                });
            (Just(text), prop::collection::vec(issue, 0..8))
        })
    }

    proptest! {
        /// Property: in-range issues never cause an out-of-range substring operation
        #[test]
        fn apply_never_panics((text, issues) in arb_text_and_issues()) {
            let out = apply_issues(&text, &issues, ReplacementStrategy::FirstChoice);
            prop_assert_eq!(out.applied + out.skipped, issues.len());
        }

        /// Property: non-overlapping issues on ASCII text are all applied
        #[test]
        fn disjoint_ascii_issues_all_apply(
            text in "[a-z ]{10,40}",
            cuts in prop::collection::btree_set(0usize..10, 0..5),
        ) {
            let issues: Vec<Issue> = cuts.iter().map(|&c| Issue::new(c, 1, &["X"])).collect();
            let out = apply_issues(&text, &issues, ReplacementStrategy::FirstChoice);
            prop_assert_eq!(out.applied, issues.len());
            prop_assert_eq!(out.text.len(), text.len());
        }
    }
}
