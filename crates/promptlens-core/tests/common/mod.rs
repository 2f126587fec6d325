//! In-memory page for driving a session without a browser

#![allow(dead_code)]

use promptlens_core::{
    ElementId, ElementSnapshot, EngineConfig, LensError, ManualClock, MemoryPositionStore,
    Obstacle, PageModel, Rect, Session, Settings, Viewport,
};
use std::cell::Cell;
use std::collections::HashMap;

pub const ORIGIN: &str = "https://chat.example.com";

pub struct FakeElement {
    pub snapshot: ElementSnapshot,
    pub selectors: Vec<&'static str>,
    pub text: String,
    pub container: Option<ElementId>,
    pub obstacles: Vec<Obstacle>,
}

pub struct FakePage {
    next_id: u64,
    elements: Vec<FakeElement>,
    containers: HashMap<ElementId, Rect>,
    pub viewport: Viewport,
    pub observing: bool,
    pub observed_attributes: Vec<String>,
    pub forgotten: Vec<ElementId>,
    /// `query_all` calls for the first candidate selector, i.e. scans run
    pub scans: Cell<usize>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            elements: Vec::new(),
            containers: HashMap::new(),
            viewport: Viewport::new(1280.0, 800.0),
            observing: false,
            observed_attributes: Vec::new(),
            forgotten: Vec::new(),
            scans: Cell::new(0),
        }
    }

    fn allocate(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    /// A visible chat composer textarea
    pub fn add_composer(&mut self, bounds: Rect) -> ElementId {
        let id = self.allocate();
        let mut snapshot = ElementSnapshot::textarea(id, bounds);
        snapshot.placeholder = Some("Message the assistant".into());
        self.push(snapshot, vec!["textarea"])
    }

    pub fn add_element(&mut self, mut snapshot: ElementSnapshot, selectors: Vec<&'static str>) -> ElementId {
        snapshot.id = self.allocate();
        self.push(snapshot, selectors)
    }

    fn push(&mut self, snapshot: ElementSnapshot, selectors: Vec<&'static str>) -> ElementId {
        let id = snapshot.id;
        self.elements.push(FakeElement {
            snapshot,
            selectors,
            text: String::new(),
            container: None,
            obstacles: Vec::new(),
        });
        id
    }

    /// A wrapper box that is not itself a candidate
    pub fn add_container(&mut self, bounds: Rect) -> ElementId {
        let id = self.allocate();
        self.containers.insert(id, bounds);
        id
    }

    pub fn element(&self, id: ElementId) -> Option<&FakeElement> {
        self.elements.iter().find(|e| e.snapshot.id == id)
    }

    pub fn element_mut(&mut self, id: ElementId) -> &mut FakeElement {
        self.elements
            .iter_mut()
            .find(|e| e.snapshot.id == id)
            .expect("unknown element")
    }

    pub fn set_container(&mut self, id: ElementId, container: ElementId) {
        self.element_mut(id).container = Some(container);
    }

    pub fn add_obstacle(&mut self, id: ElementId, obstacle: Obstacle) {
        self.element_mut(id).obstacles.push(obstacle);
    }

    pub fn set_text(&mut self, id: ElementId, text: &str) {
        self.element_mut(id).text = text.to_string();
    }

    pub fn text(&self, id: ElementId) -> String {
        self.element(id).map(|e| e.text.clone()).unwrap_or_default()
    }

    pub fn set_bounds(&mut self, id: ElementId, bounds: Rect) {
        self.element_mut(id).snapshot.bounds = bounds;
    }

    /// Take the element out of the document
    pub fn remove(&mut self, id: ElementId) {
        self.element_mut(id).snapshot.connected = false;
    }
}

impl PageModel for FakePage {
    fn query_all(&mut self, selector: &str) -> Vec<ElementId> {
        if selector == promptlens_core::CANDIDATE_SELECTORS[0] {
            self.scans.set(self.scans.get() + 1);
        }
        self.elements
            .iter()
            .filter(|e| e.snapshot.connected && e.selectors.contains(&selector))
            .map(|e| e.snapshot.id)
            .collect()
    }

    fn snapshot(&self, element: ElementId) -> Option<ElementSnapshot> {
        self.element(element).map(|e| e.snapshot.clone())
    }

    fn bounds(&self, element: ElementId) -> Option<Rect> {
        if let Some(rect) = self.containers.get(&element) {
            return Some(*rect);
        }
        self.element(element)
            .filter(|e| e.snapshot.connected)
            .map(|e| e.snapshot.bounds)
    }

    fn is_connected(&self, element: ElementId) -> bool {
        self.element(element).is_some_and(|e| e.snapshot.connected)
    }

    fn owner_container(&mut self, element: ElementId) -> Option<ElementId> {
        self.element(element).and_then(|e| e.container)
    }

    fn obstacles(&self, element: ElementId, _container: Option<ElementId>) -> Vec<Obstacle> {
        self.element(element)
            .map(|e| e.obstacles.clone())
            .unwrap_or_default()
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn origin(&self) -> String {
        ORIGIN.to_string()
    }

    fn read_text(&self, element: ElementId) -> Option<String> {
        self.element(element).map(|e| e.text.clone())
    }

    fn write_text(&mut self, element: ElementId, text: &str) -> Result<(), LensError> {
        match self.elements.iter_mut().find(|e| e.snapshot.id == element) {
            Some(e) if e.snapshot.connected => {
                e.text = text.to_string();
                Ok(())
            }
            _ => Err(LensError::Page(format!("element {} is gone", element.0))),
        }
    }

    fn observe(&mut self, attribute_filter: &[&str]) -> Result<(), LensError> {
        self.observing = true;
        self.observed_attributes = attribute_filter.iter().map(|a| a.to_string()).collect();
        Ok(())
    }

    fn disconnect(&mut self) {
        self.observing = false;
    }

    fn forget(&mut self, element: ElementId) {
        self.forgotten.push(element);
    }
}

pub type TestSession = Session<FakePage, ManualClock, MemoryPositionStore>;

/// Route engine logs to the test writer; filter with `RUST_LOG`
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn session(page: FakePage, config: EngineConfig) -> (TestSession, ManualClock) {
    init_tracing();
    let clock = ManualClock::new(0);
    let session = Session::new(page, clock.clone(), MemoryPositionStore::new(), config);
    (session, clock)
}

/// Session with default settings already applied
pub fn started(page: FakePage, config: EngineConfig) -> (TestSession, ManualClock) {
    let (mut session, clock) = session(page, config);
    session
        .apply_settings(Settings::default())
        .expect("default settings are valid");
    (session, clock)
}

pub fn composer_rect() -> Rect {
    Rect::new(200.0, 600.0, 600.0, 80.0)
}
