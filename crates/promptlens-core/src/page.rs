//! Boundary to the host page
//!
//! The engine never touches a DOM directly. The browser bundle implements
//! [`PageModel`] over `web-sys`; tests implement it over plain structs.

use crate::error::LensError;
use crate::geometry::{Rect, StyleSnapshot, Viewport};
use serde::{Deserialize, Serialize};

/// Identity of a page element.
///
/// Assigned by the page model on first sight and stable for the element's
/// lifetime, regardless of attribute churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InputKind {
    /// `<textarea>` or a text-like `<input>`
    NativeField,
    /// `contenteditable` region or explicit `role="textbox"`
    RichTextRegion,
}

/// `<input type>` values that accept free text
pub const TEXT_INPUT_TYPES: &[&str] = &["text", "search", ""];

/// Read-only view of one element, taken in a single pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub id: ElementId,
    /// Lowercase tag name
    pub tag: String,
    pub input_type: Option<String>,
    pub dom_id: Option<String>,
    pub class_name: Option<String>,
    pub name: Option<String>,
    pub placeholder: Option<String>,
    pub aria_label: Option<String>,
    pub role: Option<String>,
    pub content_editable: bool,
    pub connected: bool,
    pub style: StyleSnapshot,
    pub bounds: Rect,
    /// Tag of the nearest nav/header/footer/table ancestor, if any
    pub excluded_ancestor: Option<String>,
}

impl ElementSnapshot {
    /// Minimal visible `<textarea>`, handy for building fixtures
    pub fn textarea(id: ElementId, bounds: Rect) -> Self {
        Self {
            id,
            tag: "textarea".to_string(),
            input_type: None,
            dom_id: None,
            class_name: None,
            name: None,
            placeholder: None,
            aria_label: None,
            role: None,
            content_editable: false,
            connected: true,
            style: StyleSnapshot::default(),
            bounds,
            excluded_ancestor: None,
        }
    }

    pub fn is_native_text_field(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => {
                let ty = self.input_type.as_deref().unwrap_or("").to_lowercase();
                TEXT_INPUT_TYPES.contains(&ty.as_str())
            }
            _ => false,
        }
    }

    pub fn has_textbox_role(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("textbox"))
    }

    /// Kind of text surface, or `None` if the element cannot hold typed text
    pub fn kind(&self) -> Option<InputKind> {
        if self.is_native_text_field() {
            Some(InputKind::NativeField)
        } else if self.content_editable || self.has_textbox_role() {
            Some(InputKind::RichTextRegion)
        } else {
            None
        }
    }

    /// Attributes that survive re-renders, joined for persistence keys
    pub fn signature(&self) -> String {
        [
            self.tag.as_str(),
            self.dom_id.as_deref().unwrap_or(""),
            self.name.as_deref().unwrap_or(""),
            self.placeholder.as_deref().unwrap_or(""),
            self.aria_label.as_deref().unwrap_or(""),
        ]
        .join("|")
    }
}

/// Geometry of a sibling control the overlay must keep clear of
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obstacle {
    pub bounds: Rect,
    /// Right-aligned by computed style (float, text-align, flex end)
    #[serde(default)]
    pub style_right_aligned: bool,
}

impl Obstacle {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            style_right_aligned: false,
        }
    }

    pub fn right_aligned(bounds: Rect) -> Self {
        Self {
            bounds,
            style_right_aligned: true,
        }
    }
}

/// One structural or attribute change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeRecord {
    /// Element nodes added or removed under some parent. Text nodes are not reported.
    ChildList {
        added: Vec<String>,
        removed: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Attribute { name: String, target_tag: String },
}

/// Everything the engine needs from the page it runs on
pub trait PageModel {
    /// Elements matching a CSS selector, in document order
    fn query_all(&mut self, selector: &str) -> Vec<ElementId>;

    fn snapshot(&self, element: ElementId) -> Option<ElementSnapshot>;

    /// Current bounds, `None` once the element has left the page
    fn bounds(&self, element: ElementId) -> Option<Rect>;

    fn is_connected(&self, element: ElementId) -> bool;

    /// Nearest ancestor acting as the input's logical group
    fn owner_container(&mut self, element: ElementId) -> Option<ElementId>;

    /// Interactive siblings inside `container`, excluding `element` and anything it contains
    fn obstacles(&self, element: ElementId, container: Option<ElementId>) -> Vec<Obstacle>;

    fn viewport(&self) -> Viewport;

    /// Scheme + host of the page, used to scope persisted positions
    fn origin(&self) -> String;

    fn read_text(&self, element: ElementId) -> Option<String>;

    fn write_text(&mut self, element: ElementId, text: &str) -> Result<(), LensError>;

    /// Start the page-wide change subscription
    fn observe(&mut self, attribute_filter: &[&str]) -> Result<(), LensError>;

    /// Tear down the change subscription
    fn disconnect(&mut self);

    /// Drop any handle kept for `element`
    fn forget(&mut self, element: ElementId);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(tag: &str) -> ElementSnapshot {
        ElementSnapshot {
            tag: tag.to_string(),
            ..ElementSnapshot::textarea(ElementId(1), Rect::new(0.0, 0.0, 300.0, 40.0))
        }
    }

    #[test]
    fn test_kind_of_native_fields() {
        assert_eq!(snapshot("textarea").kind(), Some(InputKind::NativeField));

        let mut input = snapshot("input");
        assert_eq!(input.kind(), Some(InputKind::NativeField));
        input.input_type = Some("Search".into());
        assert_eq!(input.kind(), Some(InputKind::NativeField));
        input.input_type = Some("checkbox".into());
        assert_eq!(input.kind(), None);
    }

    #[test]
    fn test_kind_of_rich_text() {
        let mut div = snapshot("div");
        assert_eq!(div.kind(), None);
        div.content_editable = true;
        assert_eq!(div.kind(), Some(InputKind::RichTextRegion));

        let mut role = snapshot("div");
        role.role = Some("TextBox".into());
        assert_eq!(role.kind(), Some(InputKind::RichTextRegion));
    }

    #[test]
    fn test_signature_ignores_class_churn() {
        let mut a = snapshot("textarea");
        a.dom_id = Some("prompt".into());
        a.class_name = Some("focus-ring".into());
        let mut b = a.clone();
        b.class_name = Some("focus-ring is-typing".into());
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature(), "textarea|prompt|||");
    }

    #[test]
    fn test_change_record_wire_format() {
        let json = r#"{"type":"attribute","name":"class","targetTag":"div"}"#;
        let record: ChangeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(
            record,
            ChangeRecord::Attribute {
                name: "class".into(),
                target_tag: "div".into()
            }
        );
    }
}
