//! Change feed and debounced scanning
//!
//! The page reports structural changes as [`ChangeRecord`]s. Relevant ones
//! request a re-scan through the cooldown gate. A scan prunes inputs that
//! left the page, queries every candidate selector, classifies what it finds,
//! and ranks by rendered area when there are more candidates than free slots.

use crate::classifier::{classify, Verdict};
use crate::config::{EngineConfig, Settings};
use crate::cooldown::{Cooldown, CooldownResult, Millis};
use crate::error::LensError;
use crate::lifecycle::{AttachmentState, CandidateInput, OverlayId};
use crate::page::{ChangeRecord, ElementId, ElementSnapshot, PageModel};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Selectors that can match a text surface, queried in this order
pub const CANDIDATE_SELECTORS: &[&str] = &[
    "textarea",
    "input[type=\"text\"]",
    "input[type=\"search\"]",
    "input:not([type])",
    "[contenteditable=\"true\"]",
    "[contenteditable=\"\"]",
    "[role=\"textbox\"]",
];

/// Attributes whose changes can turn an element into a candidate
pub const ATTRIBUTE_ALLOWLIST: &[&str] = &["id", "class", "placeholder"];

const CONTAINER_TAGS: &[&str] = &[
    "div", "form", "section", "main", "article", "textarea", "input",
];

fn is_container_tag(tag: &str) -> bool {
    CONTAINER_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

/// Whether a change can add or remove candidates.
///
/// Any element removal counts, since a composer can sit inside any wrapper.
/// Additions only count for container tags.
pub fn is_relevant(record: &ChangeRecord) -> bool {
    match record {
        ChangeRecord::ChildList { added, removed } => {
            !removed.is_empty() || added.iter().any(|tag| is_container_tag(tag))
        }
        ChangeRecord::Attribute { name, .. } => ATTRIBUTE_ALLOWLIST
            .iter()
            .any(|a| a.eq_ignore_ascii_case(name)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Monitoring,
}

/// One newly accepted input
#[derive(Debug, Clone)]
pub struct Accepted {
    pub candidate: CandidateInput,
    /// Snapshot the classifier accepted
    pub snapshot: ElementSnapshot,
    /// Index among inputs with the same signature, in scan order
    pub occurrence: usize,
}

/// Result of one scan
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Newly accepted inputs to attach, best first
    pub accepted: Vec<Accepted>,
    /// Accepted inputs that lost the ranking to the cap
    pub over_cap: usize,
}

#[derive(Debug)]
pub struct Scanner {
    state: MonitorState,
    cooldown: Cooldown,
    candidates: Vec<CandidateInput>,
}

impl Scanner {
    pub fn new(cooldown_ms: Millis) -> Self {
        Self {
            state: MonitorState::Idle,
            cooldown: Cooldown::new(cooldown_ms),
            candidates: Vec::new(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn is_monitoring(&self) -> bool {
        self.state == MonitorState::Monitoring
    }

    pub fn candidates(&self) -> &[CandidateInput] {
        &self.candidates
    }

    /// Begin observing. Refuses until settings have been read and enable it.
    pub fn start<P: PageModel>(
        &mut self,
        page: &mut P,
        settings: Option<&Settings>,
    ) -> Result<bool, LensError> {
        if self.is_monitoring() {
            return Ok(false);
        }
        match settings {
            Some(s) if s.enabled => {}
            _ => return Ok(false),
        }
        page.observe(ATTRIBUTE_ALLOWLIST)?;
        self.state = MonitorState::Monitoring;
        info!("Monitoring started");
        Ok(true)
    }

    /// Stop observing and forget every candidate
    pub fn stop<P: PageModel>(&mut self, page: &mut P) {
        if self.is_monitoring() {
            page.disconnect();
            info!("Monitoring stopped");
        }
        for candidate in self.candidates.drain(..) {
            page.forget(candidate.element);
        }
        self.cooldown.reset();
        self.state = MonitorState::Idle;
    }

    /// Ask for a scan. `None` while idle.
    pub fn request(&mut self, now: Millis) -> Option<CooldownResult> {
        if !self.is_monitoring() {
            return None;
        }
        Some(self.cooldown.request(now))
    }

    /// A deferred scan's timer fired
    pub fn fire_pending(&mut self, now: Millis) -> bool {
        self.is_monitoring() && self.cooldown.fire_pending(now)
    }

    pub fn mark_attached(&mut self, element: ElementId, overlay: OverlayId) {
        if let Some(c) = self.candidates.iter_mut().find(|c| c.element == element) {
            c.attachment = AttachmentState::Attached(overlay);
        }
    }

    /// Elements the candidate list still refers to, containers included
    fn referenced(&self) -> HashSet<ElementId> {
        self.candidates
            .iter()
            .flat_map(|c| std::iter::once(c.element).chain(c.owner_container))
            .collect()
    }

    /// Drop candidates that left the page, returning their elements
    pub fn prune<P: PageModel>(&mut self, page: &mut P) -> Vec<ElementId> {
        let mut pruned = Vec::new();
        let mut containers = Vec::new();
        self.candidates.retain(|c| {
            let keep = page.is_connected(c.element);
            if !keep {
                pruned.push(c.element);
                containers.extend(c.owner_container);
            }
            keep
        });
        let referenced = self.referenced();
        for element in pruned.iter().chain(containers.iter()) {
            if !referenced.contains(element) {
                page.forget(*element);
            }
        }
        if !pruned.is_empty() {
            debug!(pruned = pruned.len(), "Pruned disconnected inputs");
        }
        pruned
    }

    /// Query and classify. Call [`Scanner::prune`] first so freed slots count.
    ///
    /// `remaining` is the number of free overlay slots; `is_attached`
    /// reports inputs that already carry an overlay. Elements the scan saw
    /// but did not keep as candidates are released from the page model.
    pub fn rescan<P: PageModel>(
        &mut self,
        page: &mut P,
        config: &EngineConfig,
        remaining: usize,
        is_attached: impl Fn(ElementId) -> bool,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        if !self.is_monitoring() {
            return outcome;
        }

        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for selector in CANDIDATE_SELECTORS {
            for element in page.query_all(selector) {
                if seen.insert(element) {
                    found.push(element);
                }
            }
        }

        let mut occurrences: HashMap<String, usize> = HashMap::new();
        let mut accepted: Vec<Accepted> = Vec::new();
        for &element in &found {
            let Some(snapshot) = page.snapshot(element) else {
                continue;
            };
            let slot = occurrences.entry(snapshot.signature()).or_insert(0);
            let occurrence = *slot;
            *slot += 1;
            if is_attached(element) {
                continue;
            }
            match classify(&snapshot, config) {
                Verdict::Accept(kind) => {
                    let container = page.owner_container(element);
                    let candidate = CandidateInput::new(element, kind, snapshot.bounds, container);
                    accepted.push(Accepted {
                        candidate,
                        snapshot,
                        occurrence,
                    });
                }
                Verdict::Reject(reason) => {
                    debug!(element = element.0, reason, "Rejected");
                }
            }
        }

        if accepted.len() > remaining {
            // Stable: equal areas keep scan order
            accepted.sort_by(|a, b| {
                b.candidate
                    .visible_bounds
                    .area()
                    .total_cmp(&a.candidate.visible_bounds.area())
            });
            outcome.over_cap = accepted.len() - remaining;
        }

        for Accepted { candidate, .. } in &accepted {
            match self.candidates.iter_mut().find(|c| c.element == candidate.element) {
                Some(existing) => {
                    existing.visible_bounds = candidate.visible_bounds;
                    existing.owner_container = candidate.owner_container;
                }
                None => self.candidates.push(candidate.clone()),
            }
        }
        accepted.truncate(remaining);

        let referenced = self.referenced();
        let released: Vec<ElementId> = found
            .into_iter()
            .filter(|e| !referenced.contains(e) && !is_attached(*e))
            .collect();
        for element in &released {
            page.forget(*element);
        }
        if !released.is_empty() {
            debug!(released = released.len(), "Released non-candidate elements");
        }
        outcome.accepted = accepted;
        outcome
    }
}
