pub mod types;

pub use types::{AnalysisResult, Issue, Replacement, Severity, Shortened};
