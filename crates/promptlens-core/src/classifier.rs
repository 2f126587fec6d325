//! Candidate classifier
//!
//! Decides whether a page element is a text surface worth instrumenting. The
//! rubric is an ordered list of named predicates evaluated with short-circuit;
//! the first failing predicate names the rejection. Absence of positive
//! evidence rejects.

use crate::config::EngineConfig;
use crate::geometry::{has_rendered_area, is_hidden};
use crate::page::{ElementSnapshot, InputKind};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Tokens that mark a conversational composer
    static ref CONTEXT_VOCABULARY: Regex = Regex::new(
        r"(?i)(message|chat|compos(e|er|ing)|prompt|reply|comment|conversation|question|\bask|prosemirror)"
    )
    .unwrap();
}

/// Ancestors whose descendants are never instrumented
pub const EXCLUDED_ANCESTORS: &[&str] = &["nav", "header", "footer", "table"];

/// ARIA roles that mark non-interactive or non-text elements
pub const NON_INTERACTIVE_ROLES: &[&str] = &[
    "heading",
    "presentation",
    "none",
    "img",
    "button",
    "link",
    "navigation",
    "banner",
    "contentinfo",
    "menu",
    "menubar",
    "tab",
    "tablist",
    "toolbar",
    "tooltip",
];

/// Outcome of classifying one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept(InputKind),
    /// Name of the first rubric predicate that failed
    Reject(&'static str),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept(_))
    }
}

pub type Predicate = fn(&ElementSnapshot, &EngineConfig) -> bool;

/// One named rubric entry
pub struct Rule {
    pub name: &'static str,
    pub check: Predicate,
}

/// Acceptance rubric, cheapest checks first
pub const RUBRIC: &[Rule] = &[
    Rule {
        name: "connected",
        check: connected,
    },
    Rule {
        name: "text_surface",
        check: text_surface,
    },
    Rule {
        name: "not_hidden",
        check: not_hidden,
    },
    Rule {
        name: "has_area",
        check: has_area,
    },
    Rule {
        name: "min_size",
        check: min_size,
    },
    Rule {
        name: "no_excluded_ancestor",
        check: no_excluded_ancestor,
    },
    Rule {
        name: "interactive_role",
        check: interactive_role,
    },
    Rule {
        name: "conversational_context",
        check: conversational_context,
    },
];

/// Run the rubric against a single snapshot
pub fn classify(snapshot: &ElementSnapshot, config: &EngineConfig) -> Verdict {
    for rule in RUBRIC {
        if !(rule.check)(snapshot, config) {
            return Verdict::Reject(rule.name);
        }
    }
    match snapshot.kind() {
        Some(kind) => Verdict::Accept(kind),
        None => Verdict::Reject("text_surface"),
    }
}

pub fn connected(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    snapshot.connected
}

pub fn text_surface(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    snapshot.kind().is_some()
}

pub fn not_hidden(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    !is_hidden(&snapshot.style)
}

pub fn has_area(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    has_rendered_area(&snapshot.bounds)
}

pub fn min_size(snapshot: &ElementSnapshot, config: &EngineConfig) -> bool {
    snapshot.bounds.width >= config.min_width && snapshot.bounds.height >= config.min_height
}

pub fn no_excluded_ancestor(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    match snapshot.excluded_ancestor.as_deref() {
        Some(tag) => !EXCLUDED_ANCESTORS.contains(&tag.to_lowercase().as_str()),
        None => true,
    }
}

pub fn interactive_role(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    match snapshot.role.as_deref() {
        Some(role) => !NON_INTERACTIVE_ROLES.contains(&role.trim().to_lowercase().as_str()),
        None => true,
    }
}

pub fn conversational_context(snapshot: &ElementSnapshot, _config: &EngineConfig) -> bool {
    let matches = |value: &Option<String>| value.as_deref().is_some_and(has_context_vocabulary);

    match snapshot.kind() {
        Some(InputKind::NativeField) => {
            matches(&snapshot.placeholder)
                || matches(&snapshot.dom_id)
                || matches(&snapshot.class_name)
                || matches(&snapshot.name)
                || matches(&snapshot.aria_label)
        }
        Some(InputKind::RichTextRegion) if snapshot.content_editable => {
            matches(&snapshot.class_name)
                || (snapshot.has_textbox_role()
                    && (matches(&snapshot.dom_id) || matches(&snapshot.aria_label)))
        }
        Some(InputKind::RichTextRegion) => {
            matches(&snapshot.class_name)
                || matches(&snapshot.dom_id)
                || matches(&snapshot.aria_label)
                || matches(&snapshot.placeholder)
        }
        None => false,
    }
}

/// Whether a string contains conversational vocabulary
pub fn has_context_vocabulary(value: &str) -> bool {
    CONTEXT_VOCABULARY.is_match(value)
}
