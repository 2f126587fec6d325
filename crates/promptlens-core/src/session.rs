//! Session orchestrator
//!
//! One [`Session`] per page. It owns the page model, the scanner, the
//! overlay registry and the timer queue, and turns host events into
//! [`Effect`]s for the host to carry out (draw, move, remove, run an async
//! analysis). Nothing here blocks or awaits.

use crate::config::{EngineConfig, Settings, SettingsUpdate};
use crate::convergence::Convergence;
use crate::cooldown::{CooldownResult, Millis};
use crate::error::LensError;
use crate::geometry::IconTheme;
use crate::lifecycle::{
    AnalysisTicket, Correction, DisplayState, IndicatorManager, ListenerKind, ModalView,
    OverlayId, ATTACH_LISTENERS,
};
use crate::local_rules::{word_count, LocalAnalyzer};
use crate::page::{ChangeRecord, ElementId, PageModel};
use crate::positioning::{compute_position, Placement, PositionParams};
use crate::scanner::{is_relevant, Scanner};
use crate::scheduler::{Clock, Scheduler};
use crate::storage::{overlay_key, PositionStore};
use shared_types::{AnalysisResult, Issue};
use tracing::{debug, info, warn};

/// Instruction for the host
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Create the overlay element and wire its listeners
    Attached {
        overlay: OverlayId,
        element: ElementId,
        theme: IconTheme,
        listeners: &'static [ListenerKind],
    },
    /// Remove the overlay element and drop its listeners
    Removed { overlay: OverlayId, element: ElementId },
    Moved { overlay: OverlayId, placement: Placement },
    Display { overlay: OverlayId, display: DisplayState },
    /// Run the analyzer on `text` and report back with the ticket
    AnalysisRequested { ticket: AnalysisTicket, text: String },
    /// Run the convergence loop and report back with the ticket
    CorrectionRequested {
        ticket: AnalysisTicket,
        text: String,
        issues: Vec<Issue>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Task {
    Rescan,
    SettledAnalysis(OverlayId),
    Reposition(OverlayId),
}

impl Task {
    fn overlay(&self) -> Option<OverlayId> {
        match self {
            Task::Rescan => None,
            Task::SettledAnalysis(id) | Task::Reposition(id) => Some(*id),
        }
    }
}

pub struct Session<P, C, S> {
    page: P,
    clock: C,
    store: S,
    config: EngineConfig,
    params: PositionParams,
    settings: Option<Settings>,
    scanner: Scanner,
    manager: IndicatorManager,
    scheduler: Scheduler<Task>,
    local: LocalAnalyzer,
    effects: Vec<Effect>,
}

impl<P: PageModel, C: Clock, S: PositionStore> Session<P, C, S> {
    pub fn new(page: P, clock: C, store: S, config: EngineConfig) -> Self {
        Self {
            params: PositionParams::from(&config),
            scanner: Scanner::new(config.scan_cooldown_ms),
            manager: IndicatorManager::new(config.max_overlays),
            local: LocalAnalyzer::new(config.min_words),
            page,
            clock,
            store,
            config,
            settings: None,
            scheduler: Scheduler::new(),
            effects: Vec::new(),
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn settings(&self) -> Option<&Settings> {
        self.settings.as_ref()
    }

    pub fn overlays(&self) -> &IndicatorManager {
        &self.manager
    }

    pub fn is_monitoring(&self) -> bool {
        self.scanner.is_monitoring()
    }

    pub fn local_analyzer(&self) -> &LocalAnalyzer {
        &self.local
    }

    /// Take every effect produced since the last call
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// When the host should next call [`Session::tick`]
    pub fn next_deadline(&self) -> Option<Millis> {
        self.scheduler.next_deadline()
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Install a full settings bag. The first call is what allows monitoring to start.
    pub fn apply_settings(&mut self, settings: Settings) -> Result<(), LensError> {
        settings.validate()?;
        let display_changed = self.settings.as_ref().map_or(true, |old| {
            old.overlay_visible != settings.overlay_visible
                || old.min_severity_to_show != settings.min_severity_to_show
        });
        debug!(?settings, "Settings applied");
        self.settings = Some(settings);

        let enabled = self.settings.as_ref().is_some_and(|s| s.enabled);
        if enabled && !self.scanner.is_monitoring() {
            if self.scanner.start(&mut self.page, self.settings.as_ref())? {
                self.request_scan();
            }
        } else if !enabled && self.scanner.is_monitoring() {
            self.stop();
        } else if display_changed {
            self.refresh_display();
        }
        Ok(())
    }

    /// Merge a partial update pushed by the settings store
    pub fn apply_update(&mut self, update: &SettingsUpdate) -> Result<(), LensError> {
        let base = self.settings.clone().unwrap_or_default();
        let merged = base.merged(update)?;
        self.apply_settings(merged)
    }

    fn display_for(&self, overlay: OverlayId) -> Option<DisplayState> {
        let settings = self.settings.as_ref()?;
        let severity = self.manager.get(overlay)?.severity;
        Some(DisplayState::for_severity(severity, settings))
    }

    fn refresh_display(&mut self) {
        let ids: Vec<OverlayId> = self.manager.iter().map(|o| o.id).collect();
        for id in ids {
            if let Some(display) = self.display_for(id) {
                self.effects.push(Effect::Display { overlay: id, display });
            }
        }
    }

    // ------------------------------------------------------------------
    // Scanning
    // ------------------------------------------------------------------

    /// Feed a batch of change records from the page observer
    pub fn on_mutations(&mut self, records: &[ChangeRecord]) {
        if !self.scanner.is_monitoring() {
            return;
        }
        if records.iter().any(is_relevant) {
            self.request_scan();
        }
    }

    /// Request a scan through the cooldown gate
    pub fn request_scan(&mut self) {
        let now = self.clock.now();
        match self.scanner.request(now) {
            Some(CooldownResult::Fire) => self.rescan(),
            Some(CooldownResult::Deferred { at }) => {
                self.scheduler
                    .schedule_after(now, at.saturating_sub(now), Task::Rescan);
            }
            Some(CooldownResult::Coalesced { .. }) | None => {}
        }
    }

    fn rescan(&mut self) {
        for element in self.scanner.prune(&mut self.page) {
            self.remove_overlay(element);
        }

        let manager = &self.manager;
        let outcome = self.scanner.rescan(
            &mut self.page,
            &self.config,
            manager.remaining(),
            |element| manager.for_element(element).is_some(),
        );

        if outcome.over_cap > 0 {
            debug!(over_cap = outcome.over_cap, "Candidates beyond the overlay cap");
        }

        let origin = self.page.origin();
        for accepted in outcome.accepted {
            let (mut candidate, snapshot) = (accepted.candidate, accepted.snapshot);
            let key = overlay_key(&origin, &snapshot.signature(), accepted.occurrence);
            let pin = match self.store.load(&key) {
                Ok(pin) => pin,
                Err(e) => {
                    warn!(error = %e, "Could not load pinned position");
                    None
                }
            };
            let theme = IconTheme::for_background(snapshot.style.background_color.as_deref());
            let Some(id) = self.manager.attach(&mut candidate, key, theme, pin) else {
                continue;
            };
            self.scanner.mark_attached(candidate.element, id);
            info!(overlay = id.0, element = candidate.element.0, kind = ?candidate.kind, "Overlay attached");

            self.effects.push(Effect::Attached {
                overlay: id,
                element: candidate.element,
                theme,
                listeners: ATTACH_LISTENERS,
            });
            if let Some(placement) = self.manager.get(id).and_then(|o| o.position) {
                self.effects.push(Effect::Moved { overlay: id, placement });
            }

            let now = self.clock.now();
            for delay in self.config.reposition_passes_ms.clone() {
                if delay == 0 {
                    self.reposition(id);
                } else {
                    self.scheduler.schedule_after(now, delay, Task::Reposition(id));
                }
            }
            self.coarse_pass(id);
        }
    }

    fn remove_overlay(&mut self, element: ElementId) {
        if let Some(overlay) = self.manager.detach(element) {
            let id = overlay.id;
            self.scheduler.cancel_where(|t| t.overlay() == Some(id));
            self.effects.push(Effect::Removed {
                overlay: id,
                element,
            });
            debug!(overlay = id.0, "Overlay removed");
        }
    }

    /// Run due timers
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for task in self.scheduler.take_due(now) {
            match task {
                Task::Rescan => {
                    if self.scanner.fire_pending(now) {
                        self.rescan();
                    }
                }
                Task::SettledAnalysis(id) => self.request_analysis(id),
                Task::Reposition(id) => self.reposition(id),
            }
        }
    }

    // ------------------------------------------------------------------
    // Positioning
    // ------------------------------------------------------------------

    fn reposition(&mut self, id: OverlayId) {
        let Some(overlay) = self.manager.get(id) else {
            return;
        };
        if overlay.pinned {
            return;
        }
        let (element, container) = (overlay.element, overlay.container);

        let Some(input) = self.page.bounds(element) else {
            return;
        };
        let container_rect = container
            .and_then(|c| self.page.bounds(c))
            .unwrap_or(input);
        let obstacles = self.page.obstacles(element, container);
        let viewport = self.page.viewport();
        let placement = compute_position(&input, &container_rect, &obstacles, &viewport, &self.params);

        if self.manager.set_position(id, placement) {
            debug!(overlay = id.0, strategy = ?placement.strategy, "Overlay moved");
            self.effects.push(Effect::Moved { overlay: id, placement });
        }
    }

    /// The input or its container changed size
    pub fn on_geometry_change(&mut self, element: ElementId) {
        if let Some(id) = self.manager.for_element(element) {
            self.reposition(id);
        }
    }

    pub fn on_viewport_resize(&mut self) {
        let ids: Vec<OverlayId> = self.manager.iter().map(|o| o.id).collect();
        for id in ids {
            self.reposition(id);
        }
    }

    // ------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------

    fn set_analysis(&mut self, id: OverlayId, result: AnalysisResult) {
        if self.manager.update_severity(id, result) {
            if let Some(display) = self.display_for(id) {
                self.effects.push(Effect::Display { overlay: id, display });
            }
        }
    }

    /// Immediate local pass on the current text
    fn coarse_pass(&mut self, id: OverlayId) {
        let Some(element) = self.manager.get(id).map(|o| o.element) else {
            return;
        };
        let text = self.page.read_text(element).unwrap_or_default();
        let result = self.local.analyze_now(&text);
        self.set_analysis(id, result);
    }

    fn request_analysis(&mut self, id: OverlayId) {
        let Some(element) = self.manager.get(id).map(|o| o.element) else {
            return;
        };
        let text = self.page.read_text(element).unwrap_or_default();
        if word_count(&text) < self.config.min_words {
            self.manager.invalidate(id);
            self.set_analysis(id, AnalysisResult::neutral(&text));
            return;
        }
        if let Some(ticket) = self.manager.begin_analysis(id) {
            self.effects.push(Effect::AnalysisRequested { ticket, text });
        }
    }

    /// The user typed into `element`
    pub fn on_text_change(&mut self, element: ElementId) {
        let Some(id) = self.manager.for_element(element) else {
            return;
        };
        self.manager.invalidate(id);
        self.coarse_pass(id);

        self.scheduler
            .cancel_where(|t| *t == Task::SettledAnalysis(id));
        let now = self.clock.now();
        self.scheduler
            .schedule_after(now, self.config.settle_delay_ms, Task::SettledAnalysis(id));
    }

    /// `element` gained focus: re-check even if the text is unchanged
    pub fn on_focus(&mut self, element: ElementId) {
        let Some(id) = self.manager.for_element(element) else {
            return;
        };
        self.scheduler
            .cancel_where(|t| *t == Task::SettledAnalysis(id));
        self.coarse_pass(id);
        self.request_analysis(id);
        self.reposition(id);
    }

    /// Result of an [`Effect::AnalysisRequested`]. Returns false if the ticket was stale.
    pub fn complete_analysis(
        &mut self,
        ticket: AnalysisTicket,
        result: Result<AnalysisResult, LensError>,
    ) -> bool {
        if !self.manager.is_current(ticket) {
            debug!(overlay = ticket.overlay.0, "Dropping stale analysis");
            return false;
        }
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Analysis failed, using local rules");
                let Some(element) = self.manager.get(ticket.overlay).map(|o| o.element) else {
                    return false;
                };
                let text = self.page.read_text(element).unwrap_or_default();
                self.local.analyze_now(&text)
            }
        };
        self.set_analysis(ticket.overlay, result);
        true
    }

    // ------------------------------------------------------------------
    // User interaction
    // ------------------------------------------------------------------

    /// Modal content for a click, `None` when suppressed
    pub fn click(&self, id: OverlayId) -> Option<ModalView> {
        let settings = self.settings.as_ref()?;
        self.manager.on_click(id, settings)
    }

    pub fn drag_start(&mut self, id: OverlayId, x: f64, y: f64) -> bool {
        self.manager.drag_start(id, x, y)
    }

    pub fn drag_move(&mut self, id: OverlayId, x: f64, y: f64) {
        if let Some(placement) = self.manager.drag_move(id, x, y, self.config.drag_threshold) {
            self.effects.push(Effect::Moved { overlay: id, placement });
        }
    }

    /// Release a drag. Returns true when the overlay was pinned.
    pub fn drag_end(&mut self, id: OverlayId, x: f64, y: f64) -> bool {
        let pin = self.manager.drag_end(id, x, y, self.config.drag_threshold);
        let Some(overlay) = self.manager.get(id) else {
            return false;
        };
        if let Some(placement) = overlay.position {
            self.effects.push(Effect::Moved { overlay: id, placement });
        }
        let Some(pin) = pin else {
            return false;
        };
        let key = overlay.key.clone();
        self.scheduler
            .cancel_where(|t| *t == Task::Reposition(id));
        if let Err(e) = self.store.save(&key, pin) {
            warn!(error = %e, "Could not persist pinned position");
        }
        info!(overlay = id.0, top = pin.top, left = pin.left, "Overlay pinned");
        true
    }

    /// The user accepted the suggested correction
    pub fn accept_correction(&mut self, id: OverlayId) -> Result<(), LensError> {
        let Some(correction) = self.manager.on_user_accept_correction(id) else {
            return Ok(());
        };
        match correction {
            Correction::Converge { text, issues } => {
                if let Some(ticket) = self.manager.begin_analysis(id) {
                    self.effects.push(Effect::CorrectionRequested {
                        ticket,
                        text,
                        issues,
                    });
                }
                Ok(())
            }
            Correction::Replace { text } => self.write_back(id, &text),
        }
    }

    /// Result of an [`Effect::CorrectionRequested`]. Returns false if the ticket was stale.
    pub fn complete_correction(
        &mut self,
        ticket: AnalysisTicket,
        convergence: Convergence,
    ) -> Result<bool, LensError> {
        if !self.manager.is_current(ticket) {
            debug!(overlay = ticket.overlay.0, "Dropping stale correction");
            return Ok(false);
        }
        debug!(
            iterations = convergence.iterations,
            remaining = convergence.remaining_issues,
            converged = convergence.converged,
            "Correction finished"
        );
        self.write_back(ticket.overlay, &convergence.text)?;
        Ok(true)
    }

    fn write_back(&mut self, id: OverlayId, text: &str) -> Result<(), LensError> {
        let Some(element) = self.manager.get(id).map(|o| o.element) else {
            return Ok(());
        };
        self.page.write_text(element, text)?;
        self.on_text_change(element);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    fn detach_everything(&mut self) {
        for overlay in self.manager.detach_all() {
            self.effects.push(Effect::Removed {
                overlay: overlay.id,
                element: overlay.element,
            });
        }
        self.scheduler.clear();
    }

    /// Drop every overlay and scan again, e.g. after in-page navigation
    pub fn reset(&mut self) {
        self.detach_everything();
        if self.scanner.is_monitoring() {
            let settings = self.settings.clone();
            self.scanner.stop(&mut self.page);
            match self.scanner.start(&mut self.page, settings.as_ref()) {
                Ok(true) => self.request_scan(),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Could not restart monitoring"),
            }
        }
    }

    /// Stop monitoring and remove every overlay
    pub fn stop(&mut self) {
        self.detach_everything();
        self.scanner.stop(&mut self.page);
    }
}
