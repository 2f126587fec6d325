//! Input discovery and overlay placement engine
//!
//! Finds the free-text inputs on a page that look like chat or prompt
//! composers, attaches one indicator overlay to each (up to a cap), keeps the
//! overlay clear of the input's own controls, and drives analysis of what the
//! user types.
//!
//! The engine is sans-IO: the page is reached through [`page::PageModel`],
//! time through [`scheduler::Clock`], and everything the host must do comes
//! back as [`session::Effect`]s.

pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod convergence;
pub mod cooldown;
pub mod error;
pub mod geometry;
pub mod lifecycle;
pub mod local_rules;
pub mod page;
pub mod positioning;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use analyzer::{Analyzer, FallbackAnalyzer};
pub use classifier::{classify, Verdict};
pub use config::{AnalyzerMode, EngineConfig, Settings, SettingsUpdate};
pub use convergence::{apply_issues, converge, Convergence, ReplacementStrategy};
pub use cooldown::{Cooldown, CooldownResult, Millis};
pub use error::LensError;
pub use geometry::{IconTheme, Rect, StyleSnapshot, Viewport};
pub use lifecycle::{
    AnalysisTicket, CandidateInput, DisplayState, IndicatorManager, ListenerKind, ModalView,
    Overlay, OverlayId,
};
pub use local_rules::LocalAnalyzer;
pub use page::{ChangeRecord, ElementId, ElementSnapshot, InputKind, Obstacle, PageModel};
pub use positioning::{compute_position, Placement, PositionParams, Strategy};
pub use scanner::{is_relevant, Scanner, ATTRIBUTE_ALLOWLIST, CANDIDATE_SELECTORS};
pub use scheduler::{Clock, ManualClock, Scheduler};
pub use session::{Effect, Session};
pub use storage::{overlay_key, MemoryPositionStore, PinnedPosition, PositionStore};

pub use shared_types::{AnalysisResult, Issue, Replacement, Severity, Shortened};
