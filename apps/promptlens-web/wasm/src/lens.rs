//! Browser runtime around the engine session
//!
//! `PromptLens` owns one engine [`Session`] over the live DOM. Host events
//! call into the session, then the effect pump carries out what the session
//! asked for: draw, move or remove icons, wire or drop listeners, and run
//! analyses on the microtask queue.
//!
//! Every DOM callback defers its work with `spawn_local`, so no closure is
//! ever dropped while it is still running.

use crate::dom_page::DomPage;
use crate::listeners::{Listener, OverlayHandles, ResizeWatch};
use crate::remote::RemoteAnalyzer;
use crate::render::{self, Modal};
use crate::storage::LocalPositionStore;
use crate::timers::{PerformanceClock, Timeout};
use promptlens_core::{
    converge, Analyzer, AnalyzerMode, ChangeRecord, Clock, Effect, ElementId, EngineConfig,
    FallbackAnalyzer, IconTheme, LensError, ListenerKind, LocalAnalyzer, OverlayId, Session,
    Settings, SettingsUpdate,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, MouseEvent};

type BrowserSession = Session<DomPage, PerformanceClock, LocalPositionStore>;
type BrowserAnalyzer = FallbackAnalyzer<RemoteAnalyzer>;

pub(crate) fn log(message: &str) {
    web_sys::console::log_1(&message.into());
}

pub(crate) fn debug(message: &str) {
    web_sys::console::debug_1(&message.into());
}

pub(crate) fn warn(message: &str) {
    web_sys::console::warn_1(&message.into());
}

fn to_js(e: LensError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn pointer(event: &Event) -> Option<(f64, f64)> {
    event
        .dyn_ref::<MouseEvent>()
        .map(|m| (m.client_x() as f64, m.client_y() as f64))
}

/// Run `f` on a later microtask, if the runtime is still alive
fn defer(weak: &Weak<Inner>, f: impl FnOnce(&Rc<Inner>) + 'static) {
    let weak = weak.clone();
    wasm_bindgen_futures::spawn_local(async move {
        if let Some(inner) = weak.upgrade() {
            f(&inner);
        }
    });
}

/// Analyzer for the current settings
fn build_analyzer(settings: Option<&Settings>, config: &EngineConfig) -> BrowserAnalyzer {
    let local = LocalAnalyzer::new(config.min_words);
    match settings {
        Some(Settings {
            mode: AnalyzerMode::Remote,
            endpoint: Some(endpoint),
            credentials,
            ..
        }) => FallbackAnalyzer::new(
            Some(RemoteAnalyzer::new(
                endpoint,
                credentials.clone(),
                config.analyzer_timeout_ms,
            )),
            local,
        ),
        _ => FallbackAnalyzer::local_only(local),
    }
}

struct OverlayView {
    icon: Element,
    /// Dropped with the view, which unsubscribes everything
    _handles: OverlayHandles,
}

struct OpenModal {
    overlay: OverlayId,
    modal: Modal,
    _buttons: Vec<Listener>,
}

struct Inner {
    session: RefCell<BrowserSession>,
    analyzer: RefCell<Rc<BrowserAnalyzer>>,
    views: RefCell<HashMap<OverlayId, OverlayView>>,
    modal: RefCell<Option<OpenModal>>,
    timer: RefCell<Option<Timeout>>,
    /// Overlay whose next click is the tail of a drag
    swallow_click: Cell<Option<OverlayId>>,
}

impl Inner {
    /// Call into the session, then pump its effects.
    /// `None` if the session is already borrowed further up the stack.
    fn with_session<T>(self: &Rc<Self>, f: impl FnOnce(&mut BrowserSession) -> T) -> Option<T> {
        let out = {
            let Ok(mut session) = self.session.try_borrow_mut() else {
                debug("PromptLens dropped an event: session busy");
                return None;
            };
            f(&mut session)
        };
        self.pump();
        Some(out)
    }

    fn pump(self: &Rc<Self>) {
        loop {
            let effects = match self.session.try_borrow_mut() {
                Ok(mut session) => session.drain_effects(),
                Err(_) => return,
            };
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                if let Err(e) = self.apply(effect) {
                    warn(&format!("PromptLens effect failed: {:?}", e));
                }
            }
        }
        self.arm_timer();
    }

    fn apply(self: &Rc<Self>, effect: Effect) -> Result<(), JsValue> {
        match effect {
            Effect::Attached {
                overlay,
                element,
                theme,
                listeners,
            } => self.attach_view(overlay, element, theme, listeners),
            Effect::Removed { overlay, .. } => {
                if let Some(view) = self.views.borrow_mut().remove(&overlay) {
                    view.icon.remove();
                }
                self.close_modal_for(Some(overlay));
                Ok(())
            }
            Effect::Moved { overlay, placement } => match self.views.borrow().get(&overlay) {
                Some(view) => render::place_icon(&view.icon, &placement),
                None => Ok(()),
            },
            Effect::Display { overlay, display } => match self.views.borrow().get(&overlay) {
                Some(view) => render::show_state(&view.icon, &display),
                None => Ok(()),
            },
            Effect::AnalysisRequested { ticket, text } => {
                let analyzer = self.analyzer.borrow().clone();
                let weak = Rc::downgrade(self);
                wasm_bindgen_futures::spawn_local(async move {
                    let result = analyzer.analyze(&text).await;
                    if let Some(inner) = weak.upgrade() {
                        inner.with_session(|s| s.complete_analysis(ticket, result));
                    }
                });
                Ok(())
            }
            Effect::CorrectionRequested {
                ticket,
                text,
                issues,
            } => {
                let analyzer = self.analyzer.borrow().clone();
                let budget = self.session.borrow().config().convergence_budget;
                let weak = Rc::downgrade(self);
                wasm_bindgen_futures::spawn_local(async move {
                    let outcome = converge(&*analyzer, &text, issues, budget).await;
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    let written = inner.with_session(|s| s.complete_correction(ticket, outcome));
                    if let Some(Err(e)) = written {
                        warn(&format!("PromptLens could not write the correction: {}", e));
                    }
                });
                Ok(())
            }
        }
    }

    fn attach_view(
        self: &Rc<Self>,
        overlay: OverlayId,
        element_id: ElementId,
        theme: IconTheme,
        listeners: &[ListenerKind],
    ) -> Result<(), JsValue> {
        let (element, container, document, icon_size) = {
            let session = self.session.borrow();
            let page = session.page();
            let element = page
                .element(element_id)
                .cloned()
                .ok_or_else(|| JsValue::from_str("Attached element is unknown"))?;
            let container = session
                .overlays()
                .get(overlay)
                .and_then(|o| o.container)
                .and_then(|c| page.element(c).cloned());
            (element, container, page.document().clone(), session.config().icon_size)
        };
        let window = web_sys::window().ok_or("No window")?;
        let icon = render::create_icon(&document, theme, icon_size)?;
        let mut handles = OverlayHandles::default();
        let weak = Rc::downgrade(self);

        for kind in listeners {
            let w = weak.clone();
            match kind {
                ListenerKind::TextChange => handles.listen(&element, "input", move |_| {
                    defer(&w, move |i| {
                        i.with_session(|s| s.on_text_change(element_id));
                    })
                })?,
                ListenerKind::Focus => handles.listen(&element, "focus", move |_| {
                    defer(&w, move |i| {
                        i.with_session(|s| s.on_focus(element_id));
                    })
                })?,
                ListenerKind::ContainerResize => {
                    let mut targets = vec![&element];
                    if let Some(c) = &container {
                        targets.push(c);
                    }
                    handles.resize = Some(ResizeWatch::new(&targets, move || {
                        defer(&w, move |i| {
                            i.with_session(|s| s.on_geometry_change(element_id));
                        })
                    })?);
                }
                ListenerKind::ViewportResize => handles.listen(&window, "resize", move |_| {
                    defer(&w, |i| {
                        i.with_session(|s| s.on_viewport_resize());
                    })
                })?,
                ListenerKind::Click => handles.listen(&icon, "click", move |_| {
                    defer(&w, move |i| i.on_icon_click(overlay))
                })?,
                ListenerKind::Drag => self.wire_drag(&mut handles, &icon, &window, overlay)?,
            }
        }

        self.views.borrow_mut().insert(
            overlay,
            OverlayView {
                icon,
                _handles: handles,
            },
        );
        Ok(())
    }

    fn wire_drag(
        self: &Rc<Self>,
        handles: &mut OverlayHandles,
        icon: &Element,
        window: &web_sys::Window,
        overlay: OverlayId,
    ) -> Result<(), JsValue> {
        let weak = Rc::downgrade(self);
        let pressed = Rc::new(Cell::new(false));

        let (w, p) = (weak.clone(), pressed.clone());
        handles.listen(icon, "pointerdown", move |e| {
            let Some((x, y)) = pointer(&e) else {
                return;
            };
            e.prevent_default();
            p.set(true);
            defer(&w, move |i| {
                i.with_session(|s| s.drag_start(overlay, x, y));
            });
        })?;

        let (w, p) = (weak.clone(), pressed.clone());
        handles.listen(window, "pointermove", move |e| {
            if !p.get() {
                return;
            }
            if let Some((x, y)) = pointer(&e) {
                defer(&w, move |i| {
                    i.with_session(|s| s.drag_move(overlay, x, y));
                });
            }
        })?;

        let (w, p) = (weak, pressed);
        handles.listen(window, "pointerup", move |e| {
            if !p.replace(false) {
                return;
            }
            let Some((x, y)) = pointer(&e) else {
                return;
            };
            defer(&w, move |i| {
                if i.with_session(|s| s.drag_end(overlay, x, y)) == Some(true) {
                    i.swallow_click.set(Some(overlay));
                }
            });
        })?;
        Ok(())
    }

    fn on_icon_click(self: &Rc<Self>, overlay: OverlayId) {
        if self.swallow_click.get() == Some(overlay) {
            self.swallow_click.set(None);
            return;
        }
        let Some(view) = self.session.try_borrow().ok().and_then(|s| s.click(overlay)) else {
            return;
        };
        self.close_modal_for(None);

        let document = self.session.borrow().page().document().clone();
        let modal = match render::open_modal(&document, &view) {
            Ok(modal) => modal,
            Err(e) => {
                warn(&format!("PromptLens could not open the modal: {:?}", e));
                return;
            }
        };

        let weak = Rc::downgrade(self);
        let w = weak.clone();
        let accept = Listener::new(&modal.accept, "click", move |_| {
            defer(&w, move |i| {
                i.close_modal_for(Some(overlay));
                if let Some(Err(e)) = i.with_session(|s| s.accept_correction(overlay)) {
                    warn(&format!("PromptLens could not apply the correction: {}", e));
                }
            })
        });
        let reject = Listener::new(&modal.reject, "click", move |_| {
            defer(&weak, move |i| i.close_modal_for(Some(overlay)))
        });

        match (accept, reject) {
            (Ok(accept), Ok(reject)) => {
                *self.modal.borrow_mut() = Some(OpenModal {
                    overlay,
                    modal,
                    _buttons: vec![accept, reject],
                });
            }
            _ => modal.close(),
        }
    }

    /// Close the open modal, or only the one belonging to `overlay`
    fn close_modal_for(&self, overlay: Option<OverlayId>) {
        let mut slot = self.modal.borrow_mut();
        if slot
            .as_ref()
            .is_some_and(|m| overlay.map_or(true, |o| o == m.overlay))
        {
            if let Some(open) = slot.take() {
                open.modal.close();
            }
        }
    }

    fn arm_timer(self: &Rc<Self>) {
        let deadline = match self.session.try_borrow() {
            Ok(session) => session.next_deadline(),
            Err(_) => return,
        };
        let mut timer = self.timer.borrow_mut();
        *timer = None;
        let Some(deadline) = deadline else {
            return;
        };

        let delay = deadline.saturating_sub(PerformanceClock.now());
        let weak = Rc::downgrade(self);
        match Timeout::new(delay, move || {
            defer(&weak, |i| {
                i.with_session(|s| s.tick());
            })
        }) {
            Ok(t) => *timer = Some(t),
            Err(e) => warn(&format!("PromptLens could not arm its timer: {:?}", e)),
        }
    }

    fn refresh_analyzer(&self) {
        let analyzer = {
            let session = self.session.borrow();
            build_analyzer(session.settings(), session.config())
        };
        *self.analyzer.borrow_mut() = Rc::new(analyzer);
    }

    fn shutdown(self: &Rc<Self>) {
        if let Ok(mut session) = self.session.try_borrow_mut() {
            session.stop();
            session.drain_effects();
        }
        self.close_modal_for(None);
        for (_, view) in self.views.borrow_mut().drain() {
            view.icon.remove();
        }
        *self.timer.borrow_mut() = None;
    }
}

/// Prompt overlay runtime for one page
#[wasm_bindgen]
pub struct PromptLens {
    inner: Rc<Inner>,
}

#[wasm_bindgen]
impl PromptLens {
    /// Create the runtime. `config_json` overrides the engine tunables.
    /// Nothing is scanned until settings arrive.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<PromptLens, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(to_js)?,
            None => EngineConfig::default(),
        };

        // The page reports mutations back into the runtime that owns it
        let slot: Rc<RefCell<Weak<Inner>>> = Rc::new(RefCell::new(Weak::new()));
        let handler_slot = slot.clone();
        let page = DomPage::new(Rc::new(move |batch: Vec<ChangeRecord>| {
            let weak = handler_slot.borrow().clone();
            defer(&weak, move |i| {
                i.with_session(|s| s.on_mutations(&batch));
            });
        }))?;

        let analyzer = build_analyzer(None, &config);
        let session = Session::new(page, PerformanceClock, LocalPositionStore::new(), config);
        let inner = Rc::new(Inner {
            session: RefCell::new(session),
            analyzer: RefCell::new(Rc::new(analyzer)),
            views: RefCell::new(HashMap::new()),
            modal: RefCell::new(None),
            timer: RefCell::new(None),
            swallow_click: Cell::new(None),
        });
        *slot.borrow_mut() = Rc::downgrade(&inner);

        log(&format!("PromptLens {} initialized", env!("CARGO_PKG_VERSION")));
        Ok(PromptLens { inner })
    }

    /// Replace the settings bag. The first enabled bag starts monitoring.
    #[wasm_bindgen(js_name = applySettings)]
    pub fn apply_settings(&self, json: &str) -> Result<(), JsValue> {
        let settings = Settings::from_json(json).map_err(to_js)?;
        self.inner
            .with_session(|s| s.apply_settings(settings))
            .ok_or("PromptLens is busy")?
            .map_err(to_js)?;
        self.inner.refresh_analyzer();
        Ok(())
    }

    /// Apply a partial settings update pushed by the storage layer
    #[wasm_bindgen(js_name = updateSettings)]
    pub fn update_settings(&self, json: &str) -> Result<(), JsValue> {
        let update = SettingsUpdate::from_json(json).map_err(to_js)?;
        self.inner
            .with_session(|s| s.apply_update(&update))
            .ok_or("PromptLens is busy")?
            .map_err(to_js)?;
        self.inner.refresh_analyzer();
        Ok(())
    }

    /// Drop every overlay and scan again, e.g. after in-page navigation
    pub fn reset(&self) {
        self.inner.close_modal_for(None);
        self.inner.with_session(|s| s.reset());
    }

    pub fn stop(&self) {
        self.inner.shutdown();
    }

    #[wasm_bindgen(js_name = overlayCount)]
    pub fn overlay_count(&self) -> usize {
        self.inner
            .session
            .try_borrow()
            .map(|s| s.overlays().len())
            .unwrap_or(0)
    }

    #[wasm_bindgen(js_name = isMonitoring)]
    pub fn is_monitoring(&self) -> bool {
        self.inner
            .session
            .try_borrow()
            .is_ok_and(|s| s.is_monitoring())
    }

    /// Shorten `text` with the configured analyzer. Resolves to `{shortenedText, savingsPercent}`.
    pub fn shorten(&self, text: String) -> js_sys::Promise {
        let analyzer = self.inner.analyzer.borrow().clone();
        wasm_bindgen_futures::future_to_promise(async move {
            let shortened = analyzer.shorten(&text).await.map_err(to_js)?;
            serde_wasm_bindgen::to_value(&shortened)
                .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
        })
    }
}

impl Drop for PromptLens {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_mode_has_no_remote() {
        let config = EngineConfig::default();
        assert!(!build_analyzer(None, &config).has_remote());
        assert!(!build_analyzer(Some(&Settings::default()), &config).has_remote());
    }

    #[test]
    fn test_remote_mode_needs_endpoint() {
        let config = EngineConfig::default();
        let mut settings = Settings {
            mode: AnalyzerMode::Remote,
            ..Settings::default()
        };
        assert!(!build_analyzer(Some(&settings), &config).has_remote());
        settings.endpoint = Some("https://api.example.com".into());
        assert!(build_analyzer(Some(&settings), &config).has_remote());
    }
}
