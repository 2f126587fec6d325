//! Analyzer boundary
//!
//! The engine consumes analysis through [`Analyzer`]. Remote implementations
//! live in the browser bundle; [`FallbackAnalyzer`] wraps one and degrades to
//! the deterministic [`LocalAnalyzer`] on any recoverable failure so the user
//! never sees a transport error.

use crate::convergence::utf16_len;
use crate::error::LensError;
use crate::local_rules::LocalAnalyzer;
use shared_types::{AnalysisResult, Shortened};
use tracing::{debug, warn};

/// Scores text and proposes a shorter variant.
///
/// Single-threaded: futures need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait Analyzer {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, LensError>;

    async fn shorten(&self, text: &str) -> Result<Shortened, LensError>;
}

impl<A: Analyzer> Analyzer for &A {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, LensError> {
        (**self).analyze(text).await
    }

    async fn shorten(&self, text: &str) -> Result<Shortened, LensError> {
        (**self).shorten(text).await
    }
}

/// Check that a remote answer actually describes `text`
pub fn validate_result(text: &str, result: &AnalysisResult) -> Result<(), LensError> {
    if result.original_text != text {
        return Err(LensError::InvalidResponse(
            "analysis is for a different text".to_string(),
        ));
    }
    let len = utf16_len(text);
    if let Some(bad) = result.issues.iter().find(|i| i.end() > len) {
        return Err(LensError::InvalidResponse(format!(
            "issue at {}+{} exceeds text length {}",
            bad.offset, bad.length, len
        )));
    }
    Ok(())
}

/// Remote analyzer with a local safety net
pub struct FallbackAnalyzer<R> {
    remote: Option<R>,
    local: LocalAnalyzer,
}

impl<R: Analyzer> FallbackAnalyzer<R> {
    pub fn new(remote: Option<R>, local: LocalAnalyzer) -> Self {
        Self { remote, local }
    }

    pub fn local_only(local: LocalAnalyzer) -> Self {
        Self {
            remote: None,
            local,
        }
    }

    pub fn local(&self) -> &LocalAnalyzer {
        &self.local
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }
}

impl<R: Analyzer> Analyzer for FallbackAnalyzer<R> {
    async fn analyze(&self, text: &str) -> Result<AnalysisResult, LensError> {
        let Some(remote) = &self.remote else {
            return Ok(self.local.analyze_now(text));
        };

        let outcome = match remote.analyze(text).await {
            Ok(result) => validate_result(text, &result).map(|_| result),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(result) => {
                debug!(issues = result.issue_count(), severity = ?result.severity, "Remote analysis");
                Ok(result)
            }
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Remote analysis failed, using local rules");
                Ok(self.local.analyze_now(text))
            }
            Err(e) => Err(e),
        }
    }

    async fn shorten(&self, text: &str) -> Result<Shortened, LensError> {
        let Some(remote) = &self.remote else {
            return Ok(self.local.shorten_now(text));
        };

        match remote.shorten(text).await {
            Ok(shortened) => Ok(shortened),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Remote shortening failed, using local rules");
                Ok(self.local.shorten_now(text))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use shared_types::{Issue, Severity};

    enum Remote {
        Down,
        Echo,
        WrongText,
        BadOffsets,
    }

    impl Analyzer for Remote {
        async fn analyze(&self, text: &str) -> Result<AnalysisResult, LensError> {
            let mut result = AnalysisResult {
                severity: Severity::High,
                original_text: text.to_string(),
                corrected_text: String::new(),
                savings_percent: 90.0,
                original_tokens: 10,
                corrected_tokens: 1,
                issues: Vec::new(),
            };
            match self {
                Remote::Down => return Err(LensError::Transport("offline".into())),
                Remote::Echo => {}
                Remote::WrongText => result.original_text = "something else".into(),
                Remote::BadOffsets => result.issues.push(Issue::new(0, 999, &[""])),
            }
            Ok(result)
        }

        async fn shorten(&self, text: &str) -> Result<Shortened, LensError> {
            match self {
                Remote::Down => Err(LensError::Timeout(100)),
                _ => Ok(Shortened {
                    shortened_text: text.to_uppercase(),
                    savings_percent: 1.0,
                }),
            }
        }
    }

    const TEXT: &str = "Could you please kindly summarize this article in order to save time";

    #[test]
    fn test_remote_result_used_when_healthy() {
        let analyzer = FallbackAnalyzer::new(Some(Remote::Echo), LocalAnalyzer::default());
        let result = block_on(analyzer.analyze(TEXT)).unwrap();
        assert_eq!(result.severity, Severity::High);
        assert_eq!(result.savings_percent, 90.0);
    }

    #[test]
    fn test_transport_failure_degrades_to_local() {
        let analyzer = FallbackAnalyzer::new(Some(Remote::Down), LocalAnalyzer::default());
        let result = block_on(analyzer.analyze(TEXT)).unwrap();
        assert_eq!(result, LocalAnalyzer::default().analyze_now(TEXT));

        let shortened = block_on(analyzer.shorten(TEXT)).unwrap();
        assert_eq!(shortened, LocalAnalyzer::default().shorten_now(TEXT));
    }

    #[test]
    fn test_invalid_responses_degrade_to_local() {
        for remote in [Remote::WrongText, Remote::BadOffsets] {
            let analyzer = FallbackAnalyzer::new(Some(remote), LocalAnalyzer::default());
            let result = block_on(analyzer.analyze(TEXT)).unwrap();
            assert_eq!(result.original_text, TEXT);
            assert_ne!(result.savings_percent, 90.0);
        }
    }

    #[test]
    fn test_local_only() {
        let analyzer: FallbackAnalyzer<Remote> = FallbackAnalyzer::local_only(LocalAnalyzer::default());
        assert!(!analyzer.has_remote());
        let shortened = block_on(analyzer.shorten(TEXT)).unwrap();
        assert!(shortened.shortened_text.len() < TEXT.len());
    }
}
