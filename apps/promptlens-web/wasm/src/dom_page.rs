//! `PageModel` over the live DOM
//!
//! Elements get an [`ElementId`] on first sight. The id is kept in a
//! `WeakMap` keyed by the element itself, so a re-query hands back the same
//! id and a garbage-collected element does not pin its entry. Strong handles
//! live only until the engine forgets the element.

use crate::observer::ChangeFeed;
use js_sys::{Object, WeakMap};
use promptlens_core::classifier::EXCLUDED_ANCESTORS;
use promptlens_core::{
    ChangeRecord, ElementId, ElementSnapshot, LensError, Obstacle, PageModel, Rect, StyleSnapshot,
    Viewport,
};
use std::collections::HashMap;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{
    Document, Element, Event, EventInit, HtmlElement, HtmlInputElement, HtmlTextAreaElement,
    Window,
};

/// Interactive controls the overlay must not cover
pub const OBSTACLE_SELECTOR: &str = "button, [role=\"button\"], input[type=\"submit\"], \
     input[type=\"button\"], input[type=\"file\"], label[for]";

/// How far up the tree to look for an input's logical group
const CONTAINER_SEARCH_DEPTH: usize = 4;

pub type ChangeHandler = Rc<dyn Fn(Vec<ChangeRecord>)>;

fn page_error(e: JsValue) -> LensError {
    LensError::Page(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

fn rect_of(element: &Element) -> Rect {
    let r = element.get_bounding_client_rect();
    Rect::new(r.x(), r.y(), r.width(), r.height())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn is_transparent(color: &str) -> bool {
    let c = color.trim();
    c.is_empty() || c == "transparent" || c == "rgba(0, 0, 0, 0)"
}

pub struct DomPage {
    window: Window,
    document: Document,
    elements: HashMap<ElementId, Element>,
    ids: WeakMap,
    next_id: u64,
    on_change: ChangeHandler,
    feed: Option<ChangeFeed>,
}

impl DomPage {
    pub fn new(on_change: ChangeHandler) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or("No window")?;
        let document = window.document().ok_or("No document")?;
        Ok(Self {
            window,
            document,
            elements: HashMap::new(),
            ids: WeakMap::new(),
            next_id: 1,
            on_change,
            feed: None,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Stable id for `element`, assigning one if it is new
    pub fn id_for(&mut self, element: &Element) -> ElementId {
        let key: &Object = element.as_ref();
        if let Some(id) = self.ids.get(key).as_f64() {
            let id = ElementId(id as u64);
            self.elements.entry(id).or_insert_with(|| element.clone());
            return id;
        }
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.ids.set(key, &JsValue::from_f64(id.0 as f64));
        self.elements.insert(id, element.clone());
        id
    }

    fn style_value(&self, element: &Element, property: &str) -> String {
        self.window
            .get_computed_style(element)
            .ok()
            .flatten()
            .and_then(|s| s.get_property_value(property).ok())
            .unwrap_or_default()
    }

    fn style(&self, element: &Element) -> StyleSnapshot {
        let Ok(Some(style)) = self.window.get_computed_style(element) else {
            return StyleSnapshot::default();
        };
        let get = |p: &str| style.get_property_value(p).unwrap_or_default();
        StyleSnapshot {
            display: get("display"),
            visibility: get("visibility"),
            opacity: get("opacity").parse().unwrap_or(1.0),
            background_color: self.effective_background(element),
        }
    }

    /// First non-transparent background at or above `element`
    fn effective_background(&self, element: &Element) -> Option<String> {
        let mut current = Some(element.clone());
        while let Some(el) = current {
            let color = self.style_value(&el, "background-color");
            if !is_transparent(&color) {
                return Some(color);
            }
            current = el.parent_element();
        }
        None
    }

    fn is_right_aligned(&self, element: &Element) -> bool {
        self.style_value(element, "float") == "right"
            || self.style_value(element, "margin-left") == "auto"
            || element
                .parent_element()
                .is_some_and(|p| matches!(self.style_value(&p, "text-align").as_str(), "right" | "end"))
    }

    fn text_field(element: &Element) -> Option<TextField<'_>> {
        if let Some(area) = element.dyn_ref::<HtmlTextAreaElement>() {
            Some(TextField::Area(area))
        } else {
            element.dyn_ref::<HtmlInputElement>().map(TextField::Input)
        }
    }
}

enum TextField<'a> {
    Area(&'a HtmlTextAreaElement),
    Input(&'a HtmlInputElement),
}

impl PageModel for DomPage {
    fn query_all(&mut self, selector: &str) -> Vec<ElementId> {
        let Ok(nodes) = self.document.query_selector_all(selector) else {
            return Vec::new();
        };
        (0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter_map(|n| n.dyn_into::<Element>().ok())
            .map(|e| self.id_for(&e))
            .collect()
    }

    fn snapshot(&self, id: ElementId) -> Option<ElementSnapshot> {
        let el = self.elements.get(&id)?;
        let content_editable = el
            .dyn_ref::<HtmlElement>()
            .is_some_and(|h| h.is_content_editable());
        let excluded_ancestor = el
            .closest(&EXCLUDED_ANCESTORS.join(", "))
            .ok()
            .flatten()
            .map(|a| a.tag_name().to_lowercase());

        Some(ElementSnapshot {
            id,
            tag: el.tag_name().to_lowercase(),
            input_type: el.get_attribute("type"),
            dom_id: non_empty(Some(el.id())),
            class_name: non_empty(Some(el.class_name())),
            name: non_empty(el.get_attribute("name")),
            placeholder: non_empty(el.get_attribute("placeholder")),
            aria_label: non_empty(el.get_attribute("aria-label")),
            role: el.get_attribute("role"),
            content_editable,
            connected: el.is_connected(),
            style: self.style(el),
            bounds: rect_of(el),
            excluded_ancestor,
        })
    }

    fn bounds(&self, id: ElementId) -> Option<Rect> {
        let el = self.elements.get(&id)?;
        el.is_connected().then(|| rect_of(el))
    }

    fn is_connected(&self, id: ElementId) -> bool {
        self.elements.get(&id).is_some_and(|e| e.is_connected())
    }

    fn owner_container(&mut self, id: ElementId) -> Option<ElementId> {
        let el = self.elements.get(&id)?.clone();
        let parent = el.parent_element()?;

        let mut current = Some(parent.clone());
        for _ in 0..CONTAINER_SEARCH_DEPTH {
            let Some(ancestor) = current else {
                break;
            };
            if ancestor.tag_name().eq_ignore_ascii_case("body") {
                break;
            }
            if let Ok(Some(_)) = ancestor.query_selector(OBSTACLE_SELECTOR) {
                return Some(self.id_for(&ancestor));
            }
            current = ancestor.parent_element();
        }
        Some(self.id_for(&parent))
    }

    fn obstacles(&self, id: ElementId, container: Option<ElementId>) -> Vec<Obstacle> {
        let Some(el) = self.elements.get(&id) else {
            return Vec::new();
        };
        let Some(scope) = container.and_then(|c| self.elements.get(&c)) else {
            return Vec::new();
        };
        let Ok(nodes) = scope.query_selector_all(OBSTACLE_SELECTOR) else {
            return Vec::new();
        };

        (0..nodes.length())
            .filter_map(|i| nodes.item(i))
            .filter(|n| !el.contains(Some(n)))
            .filter_map(|n| n.dyn_into::<Element>().ok())
            .filter_map(|ob| {
                let bounds = rect_of(&ob);
                if bounds.is_empty() {
                    return None;
                }
                Some(Obstacle {
                    bounds,
                    style_right_aligned: self.is_right_aligned(&ob),
                })
            })
            .collect()
    }

    fn viewport(&self) -> Viewport {
        let dim = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
        Viewport::new(dim(self.window.inner_width()), dim(self.window.inner_height()))
    }

    fn origin(&self) -> String {
        self.window.location().origin().unwrap_or_default()
    }

    fn read_text(&self, id: ElementId) -> Option<String> {
        let el = self.elements.get(&id)?;
        match Self::text_field(el) {
            Some(TextField::Area(a)) => Some(a.value()),
            Some(TextField::Input(i)) => Some(i.value()),
            None => el.text_content(),
        }
    }

    fn write_text(&mut self, id: ElementId, text: &str) -> Result<(), LensError> {
        let el = self
            .elements
            .get(&id)
            .ok_or_else(|| LensError::Page(format!("unknown element {}", id.0)))?;
        match Self::text_field(el) {
            Some(TextField::Area(a)) => a.set_value(text),
            Some(TextField::Input(i)) => i.set_value(text),
            None => el.set_text_content(Some(text)),
        }

        // Frameworks listen for `input` to pick up programmatic edits
        let init = EventInit::new();
        init.set_bubbles(true);
        let event = Event::new_with_event_init_dict("input", &init).map_err(page_error)?;
        el.dispatch_event(&event).map_err(page_error)?;
        Ok(())
    }

    fn observe(&mut self, attribute_filter: &[&str]) -> Result<(), LensError> {
        let handler = self.on_change.clone();
        let feed = ChangeFeed::observe(attribute_filter, move |batch| handler(batch))
            .map_err(page_error)?;
        self.feed = Some(feed);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.feed = None;
    }

    /// Drop the strong handle. The weak id stays, so a later query of the
    /// same element gets the same id back.
    fn forget(&mut self, id: ElementId) {
        self.elements.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_backgrounds() {
        assert!(is_transparent("rgba(0, 0, 0, 0)"));
        assert!(is_transparent("transparent"));
        assert!(is_transparent(""));
        assert!(!is_transparent("rgb(255, 255, 255)"));
    }

    #[test]
    fn test_non_empty_drops_blank_attributes() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("prompt".into())), Some("prompt".to_string()));
    }
}
