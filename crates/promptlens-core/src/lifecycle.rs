//! Indicator lifecycle
//!
//! [`IndicatorManager`] owns every attached overlay. It enforces one overlay
//! per input, the concurrent-overlay cap, and the pinned rule: once the user
//! drags an overlay it is never repositioned automatically again.
//!
//! Asynchronous analysis is guarded per overlay by a generation counter.
//! Every text change bumps it; a completion carrying an older
//! [`AnalysisTicket`] is stale and must be dropped.

use crate::config::Settings;
use crate::geometry::{IconTheme, Rect};
use crate::page::{ElementId, InputKind};
use crate::positioning::{Placement, Strategy};
use crate::storage::PinnedPosition;
use serde::{Deserialize, Serialize};
use shared_types::{AnalysisResult, Issue, Severity};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    Unattached,
    Attached(OverlayId),
}

/// An input accepted by the classifier
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateInput {
    pub element: ElementId,
    pub kind: InputKind,
    pub visible_bounds: Rect,
    pub owner_container: Option<ElementId>,
    pub attachment: AttachmentState,
}

impl CandidateInput {
    pub fn new(
        element: ElementId,
        kind: InputKind,
        visible_bounds: Rect,
        owner_container: Option<ElementId>,
    ) -> Self {
        Self {
            element,
            kind,
            visible_bounds,
            owner_container,
            attachment: AttachmentState::Unattached,
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.attachment, AttachmentState::Attached(_))
    }
}

/// Listener categories wired when an overlay attaches. Scroll is deliberately absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListenerKind {
    TextChange,
    Focus,
    ContainerResize,
    ViewportResize,
    Click,
    Drag,
}

pub const ATTACH_LISTENERS: &[ListenerKind] = &[
    ListenerKind::TextChange,
    ListenerKind::Focus,
    ListenerKind::ContainerResize,
    ListenerKind::ViewportResize,
    ListenerKind::Click,
    ListenerKind::Drag,
];

/// Proof of which request an async analysis answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnalysisTicket {
    pub overlay: OverlayId,
    pub generation: u64,
}

/// How an overlay should currently be drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "severity", rename_all = "camelCase")]
pub enum DisplayState {
    Hidden,
    /// Shown but inert
    Neutral,
    Severity(Severity),
}

impl DisplayState {
    pub fn for_severity(severity: Severity, settings: &Settings) -> Self {
        if !settings.overlay_visible {
            DisplayState::Hidden
        } else if severity.is_neutral() || severity < settings.min_severity_to_show {
            DisplayState::Neutral
        } else {
            DisplayState::Severity(severity)
        }
    }

    pub fn is_clickable(&self) -> bool {
        matches!(self, DisplayState::Severity(_))
    }
}

/// Content of the comparison modal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModalView {
    pub severity: Severity,
    pub original_text: String,
    pub corrected_text: String,
    pub savings_percent: f64,
    pub original_tokens: u32,
    pub corrected_tokens: u32,
    pub issue_count: usize,
}

impl From<&AnalysisResult> for ModalView {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            severity: result.severity,
            original_text: result.original_text.clone(),
            corrected_text: result.corrected_text.clone(),
            savings_percent: result.savings_percent,
            original_tokens: result.original_tokens,
            corrected_tokens: result.corrected_tokens,
            issue_count: result.issue_count(),
        }
    }
}

/// What accepting the current analysis asks for
#[derive(Debug, Clone, PartialEq)]
pub enum Correction {
    /// Drive the issues to convergence, starting from `text`
    Converge { text: String, issues: Vec<Issue> },
    /// The analyzer supplied finished text without spans
    Replace { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragState {
    start_x: f64,
    start_y: f64,
    origin: Placement,
    moved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub id: OverlayId,
    /// Persistence key for the pinned position
    pub key: String,
    pub element: ElementId,
    pub container: Option<ElementId>,
    pub severity: Severity,
    /// `None` until the first positioning pass
    pub position: Option<Placement>,
    pub pinned: bool,
    pub last_analysis: Option<AnalysisResult>,
    pub theme: IconTheme,
    generation: u64,
    drag: Option<DragState>,
}

impl Overlay {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }
}

/// Registry of attached overlays, in attach order
#[derive(Debug)]
pub struct IndicatorManager {
    cap: usize,
    next_id: u64,
    overlays: Vec<Overlay>,
    by_element: HashMap<ElementId, OverlayId>,
}

impl IndicatorManager {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            next_id: 0,
            overlays: Vec::new(),
            by_element: HashMap::new(),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.cap.saturating_sub(self.overlays.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.iter()
    }

    pub fn get(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    fn get_mut(&mut self, id: OverlayId) -> Option<&mut Overlay> {
        self.overlays.iter_mut().find(|o| o.id == id)
    }

    pub fn for_element(&self, element: ElementId) -> Option<OverlayId> {
        self.by_element.get(&element).copied()
    }

    /// Attach an overlay to `candidate`.
    ///
    /// Returns `None` when the input already has one or the cap is reached.
    /// A stored pin restores the overlay pinned at that position.
    pub fn attach(
        &mut self,
        candidate: &mut CandidateInput,
        key: String,
        theme: IconTheme,
        pin: Option<PinnedPosition>,
    ) -> Option<OverlayId> {
        if self.by_element.contains_key(&candidate.element) {
            debug!(element = candidate.element.0, "Overlay already attached");
            return None;
        }
        if self.overlays.len() >= self.cap {
            debug!(cap = self.cap, "Overlay cap reached");
            return None;
        }

        let id = OverlayId(self.next_id);
        self.next_id += 1;
        let position = pin.map(|p| Placement {
            top: p.top,
            left: p.left,
            strategy: Strategy::Pinned,
        });

        self.overlays.push(Overlay {
            id,
            key,
            element: candidate.element,
            container: candidate.owner_container,
            severity: Severity::Neutral,
            position,
            pinned: pin.is_some(),
            last_analysis: None,
            theme,
            generation: 0,
            drag: None,
        });
        self.by_element.insert(candidate.element, id);
        candidate.attachment = AttachmentState::Attached(id);
        Some(id)
    }

    pub fn detach(&mut self, element: ElementId) -> Option<Overlay> {
        let id = self.by_element.remove(&element)?;
        let index = self.overlays.iter().position(|o| o.id == id)?;
        Some(self.overlays.remove(index))
    }

    pub fn detach_all(&mut self) -> Vec<Overlay> {
        self.by_element.clear();
        std::mem::take(&mut self.overlays)
    }

    /// Record a new analysis. Returns true when the severity changed.
    pub fn update_severity(&mut self, id: OverlayId, result: AnalysisResult) -> bool {
        let Some(overlay) = self.get_mut(id) else {
            return false;
        };
        let changed = overlay.severity != result.severity;
        overlay.severity = result.severity;
        overlay.last_analysis = Some(result);
        changed
    }

    /// Invalidate every in-flight analysis for `id`
    pub fn invalidate(&mut self, id: OverlayId) {
        if let Some(overlay) = self.get_mut(id) {
            overlay.generation += 1;
        }
    }

    /// Start an async analysis, superseding any in flight
    pub fn begin_analysis(&mut self, id: OverlayId) -> Option<AnalysisTicket> {
        let overlay = self.get_mut(id)?;
        overlay.generation += 1;
        Some(AnalysisTicket {
            overlay: id,
            generation: overlay.generation,
        })
    }

    pub fn is_current(&self, ticket: AnalysisTicket) -> bool {
        self.get(ticket.overlay)
            .is_some_and(|o| o.generation == ticket.generation)
    }

    /// Apply an automatic placement. Pinned overlays refuse it.
    pub fn set_position(&mut self, id: OverlayId, placement: Placement) -> bool {
        match self.get_mut(id) {
            Some(overlay) if !overlay.pinned => {
                if overlay.position == Some(placement) {
                    return false;
                }
                overlay.position = Some(placement);
                true
            }
            _ => false,
        }
    }

    /// Modal content, or `None` while there is nothing worth comparing
    pub fn on_click(&self, id: OverlayId, settings: &Settings) -> Option<ModalView> {
        let overlay = self.get(id)?;
        if !DisplayState::for_severity(overlay.severity, settings).is_clickable() {
            debug!(overlay = id.0, "Click suppressed");
            return None;
        }
        overlay.last_analysis.as_ref().map(ModalView::from)
    }

    /// What accepting the current analysis requires, if anything
    pub fn on_user_accept_correction(&mut self, id: OverlayId) -> Option<Correction> {
        let analysis = self.get(id)?.last_analysis.as_ref()?;
        if !analysis.issues.is_empty() {
            Some(Correction::Converge {
                text: analysis.original_text.clone(),
                issues: analysis.issues.clone(),
            })
        } else if analysis.has_changes() {
            Some(Correction::Replace {
                text: analysis.corrected_text.clone(),
            })
        } else {
            None
        }
    }

    pub fn drag_start(&mut self, id: OverlayId, x: f64, y: f64) -> bool {
        let Some(overlay) = self.get_mut(id) else {
            return false;
        };
        let Some(origin) = overlay.position else {
            return false;
        };
        overlay.drag = Some(DragState {
            start_x: x,
            start_y: y,
            origin,
            moved: false,
        });
        true
    }

    /// Follow the pointer once it has travelled past `threshold`
    pub fn drag_move(&mut self, id: OverlayId, x: f64, y: f64, threshold: f64) -> Option<Placement> {
        let overlay = self.get_mut(id)?;
        let drag = overlay.drag.as_mut()?;
        let (dx, dy) = (x - drag.start_x, y - drag.start_y);
        if !drag.moved && dx.hypot(dy) < threshold {
            return None;
        }
        drag.moved = true;
        let placement = Placement {
            top: drag.origin.top + dy,
            left: drag.origin.left + dx,
            strategy: Strategy::Pinned,
        };
        overlay.position = Some(placement);
        Some(placement)
    }

    /// Release. Past the threshold the overlay is pinned and the
    /// position to persist is returned; otherwise it snaps back.
    pub fn drag_end(&mut self, id: OverlayId, x: f64, y: f64, threshold: f64) -> Option<PinnedPosition> {
        let overlay = self.get_mut(id)?;
        let drag = overlay.drag.take()?;
        let (dx, dy) = (x - drag.start_x, y - drag.start_y);
        if !drag.moved && dx.hypot(dy) < threshold {
            overlay.position = Some(drag.origin);
            return None;
        }

        let top = drag.origin.top + dy;
        let left = drag.origin.left + dx;
        overlay.position = Some(Placement {
            top,
            left,
            strategy: Strategy::Pinned,
        });
        overlay.pinned = true;
        Some(PinnedPosition { top, left })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn candidate(n: u64) -> CandidateInput {
        CandidateInput::new(
            ElementId(n),
            InputKind::NativeField,
            Rect::new(0.0, 0.0, 400.0, 60.0),
            None,
        )
    }

    fn attach(manager: &mut IndicatorManager, n: u64) -> Option<OverlayId> {
        manager.attach(&mut candidate(n), format!("key-{}", n), IconTheme::Dark, None)
    }

    fn placed(manager: &mut IndicatorManager, id: OverlayId) {
        manager.set_position(
            id,
            Placement {
                top: 100.0,
                left: 200.0,
                strategy: Strategy::Default,
            },
        );
    }

    #[test]
    fn test_attach_is_idempotent_per_element() {
        let mut manager = IndicatorManager::new(3);
        let mut c = candidate(1);
        let id = manager.attach(&mut c, "k".into(), IconTheme::Dark, None);
        assert!(id.is_some());
        assert!(c.is_attached());
        assert_eq!(manager.attach(&mut c, "k".into(), IconTheme::Dark, None), None);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_attach_respects_cap() {
        let mut manager = IndicatorManager::new(2);
        assert!(attach(&mut manager, 1).is_some());
        assert!(attach(&mut manager, 2).is_some());
        assert_eq!(attach(&mut manager, 3), None);
        assert_eq!(manager.remaining(), 0);

        manager.detach(ElementId(1));
        assert!(attach(&mut manager, 3).is_some());
    }

    #[test]
    fn test_stored_pin_restores_pinned() {
        let mut manager = IndicatorManager::new(3);
        let pin = PinnedPosition {
            top: 10.0,
            left: 20.0,
        };
        let id = manager
            .attach(&mut candidate(1), "k".into(), IconTheme::Light, Some(pin))
            .unwrap();
        let overlay = manager.get(id).unwrap();
        assert!(overlay.pinned);
        assert_eq!(overlay.position.unwrap().strategy, Strategy::Pinned);
    }

    #[test]
    fn test_generation_guard() {
        let mut manager = IndicatorManager::new(3);
        let id = attach(&mut manager, 1).unwrap();
        let first = manager.begin_analysis(id).unwrap();
        assert!(manager.is_current(first));

        let second = manager.begin_analysis(id).unwrap();
        assert!(!manager.is_current(first));
        assert!(manager.is_current(second));

        manager.invalidate(id);
        assert!(!manager.is_current(second));
    }

    #[test]
    fn test_ticket_for_detached_overlay_is_stale() {
        let mut manager = IndicatorManager::new(3);
        let id = attach(&mut manager, 1).unwrap();
        let ticket = manager.begin_analysis(id).unwrap();
        manager.detach_all();
        assert!(!manager.is_current(ticket));
    }

    #[test]
    fn test_click_suppressed_while_neutral() {
        let settings = Settings::default();
        let mut manager = IndicatorManager::new(3);
        let id = attach(&mut manager, 1).unwrap();
        assert_eq!(manager.on_click(id, &settings), None);

        manager.update_severity(id, AnalysisResult::neutral("hi"));
        assert_eq!(manager.on_click(id, &settings), None);

        let mut result = AnalysisResult::neutral("please do this now");
        result.severity = Severity::Medium;
        result.corrected_text = "do this now".into();
        assert!(manager.update_severity(id, result));
        let view = manager.on_click(id, &settings).unwrap();
        assert_eq!(view.corrected_text, "do this now");
        assert_eq!(view.severity, Severity::Medium);
    }

    #[test]
    fn test_display_gating() {
        let mut settings = Settings {
            min_severity_to_show: Severity::Medium,
            ..Settings::default()
        };
        assert_eq!(
            DisplayState::for_severity(Severity::Low, &settings),
            DisplayState::Neutral
        );
        assert_eq!(
            DisplayState::for_severity(Severity::High, &settings),
            DisplayState::Severity(Severity::High)
        );
        settings.overlay_visible = false;
        assert_eq!(
            DisplayState::for_severity(Severity::High, &settings),
            DisplayState::Hidden
        );
    }

    #[test]
    fn test_drag_past_threshold_pins() {
        let mut manager = IndicatorManager::new(3);
        let id = attach(&mut manager, 1).unwrap();
        placed(&mut manager, id);

        assert!(manager.drag_start(id, 50.0, 50.0));
        assert_eq!(manager.drag_move(id, 51.0, 51.0, 4.0), None);
        let moving = manager.drag_move(id, 60.0, 40.0, 4.0).unwrap();
        assert_eq!((moving.top, moving.left), (90.0, 210.0));

        let pin = manager.drag_end(id, 70.0, 30.0, 4.0).unwrap();
        assert_eq!(pin, PinnedPosition { top: 80.0, left: 220.0 });
        assert!(manager.get(id).unwrap().pinned);

        // Automatic placement no longer applies
        let auto = Placement {
            top: 0.0,
            left: 0.0,
            strategy: Strategy::Default,
        };
        assert!(!manager.set_position(id, auto));
        assert_eq!(manager.get(id).unwrap().position.unwrap().top, 80.0);
    }

    #[test]
    fn test_small_drag_snaps_back() {
        let mut manager = IndicatorManager::new(3);
        let id = attach(&mut manager, 1).unwrap();
        placed(&mut manager, id);

        manager.drag_start(id, 50.0, 50.0);
        assert_eq!(manager.drag_end(id, 52.0, 51.0, 4.0), None);
        let overlay = manager.get(id).unwrap();
        assert!(!overlay.pinned);
        assert!(!overlay.is_dragging());
        assert_eq!(overlay.position.unwrap().left, 200.0);
    }

    #[test]
    fn test_accept_correction() {
        let mut manager = IndicatorManager::new(3);
        let id = attach(&mut manager, 1).unwrap();
        assert_eq!(manager.on_user_accept_correction(id), None);

        let mut result = AnalysisResult::neutral("Please go");
        result.issues.push(Issue::new(0, 7, &[""]));
        manager.update_severity(id, result);
        assert_eq!(
            manager.on_user_accept_correction(id),
            Some(Correction::Converge {
                text: "Please go".into(),
                issues: vec![Issue::new(0, 7, &[""])],
            })
        );

        let mut rewritten = AnalysisResult::neutral("a b c");
        rewritten.corrected_text = "abc".into();
        manager.update_severity(id, rewritten);
        assert_eq!(
            manager.on_user_accept_correction(id),
            Some(Correction::Replace { text: "abc".into() })
        );
    }
}
