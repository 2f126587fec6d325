//! Overlay icon and comparison modal DOM

use promptlens_core::{DisplayState, IconTheme, ModalView, Placement};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Document, Element, HtmlElement};

pub const ICON_CLASS: &str = "promptlens-icon";
pub const MODAL_CLASS: &str = "promptlens-modal";

fn style_of(element: &Element) -> Result<web_sys::CssStyleDeclaration, JsValue> {
    element
        .dyn_ref::<HtmlElement>()
        .map(|h| h.style())
        .ok_or_else(|| JsValue::from_str("Overlay element is not an HtmlElement"))
}

/// Create the indicator icon and append it to `document.body`.
///
/// The icon is fixed-positioned and starts hidden until the first
/// [`place_icon`] and [`show_state`] calls.
///
/// # Errors
/// Returns JsValue error if the element cannot be created or styled
pub fn create_icon(document: &Document, theme: IconTheme, size: f64) -> Result<Element, JsValue> {
    let icon = document.create_element("div")?;
    let theme = match theme {
        IconTheme::Light => "light",
        IconTheme::Dark => "dark",
    };
    icon.set_class_name(&format!("{} {}--{}", ICON_CLASS, ICON_CLASS, theme));
    icon.set_attribute("role", "button")?;
    icon.set_attribute("aria-label", "Prompt suggestions")?;
    icon.set_attribute("data-state", "neutral")?;

    let style = style_of(&icon)?;
    style.set_property("position", "fixed")?;
    style.set_property("width", &format!("{}px", size))?;
    style.set_property("height", &format!("{}px", size))?;
    style.set_property("z-index", "2147483646")?;
    style.set_property("cursor", "grab")?;
    style.set_property("display", "none")?;

    document.body().ok_or("No body")?.append_child(&icon)?;
    Ok(icon)
}

pub fn place_icon(icon: &Element, placement: &Placement) -> Result<(), JsValue> {
    let style = style_of(icon)?;
    style.set_property("top", &format!("{}px", placement.top))?;
    style.set_property("left", &format!("{}px", placement.left))?;
    Ok(())
}

/// Reflect a display state on the icon
pub fn show_state(icon: &Element, display: &DisplayState) -> Result<(), JsValue> {
    let style = style_of(icon)?;
    match display {
        DisplayState::Hidden => {
            style.set_property("display", "none")?;
        }
        DisplayState::Neutral => {
            style.set_property("display", "block")?;
            icon.set_attribute("data-state", "neutral")?;
        }
        DisplayState::Severity(severity) => {
            style.set_property("display", "block")?;
            icon.set_attribute("data-state", severity.as_str())?;
        }
    }
    icon.set_attribute("aria-disabled", if display.is_clickable() { "false" } else { "true" })?;
    Ok(())
}

/// An open comparison modal and its two buttons
pub struct Modal {
    pub root: Element,
    pub accept: Element,
    pub reject: Element,
}

impl Modal {
    pub fn close(&self) {
        self.root.remove();
    }
}

fn text_block(document: &Document, label: &str, text: &str) -> Result<Element, JsValue> {
    let block = document.create_element("section")?;
    let heading = document.create_element("h4")?;
    heading.set_text_content(Some(label));
    let body = document.create_element("pre")?;
    body.set_text_content(Some(text));
    block.append_child(&heading)?;
    block.append_child(&body)?;
    Ok(block)
}

/// Build the original/corrected comparison and append it to `document.body`.
///
/// Text goes in through `textContent` only, never as markup.
///
/// # Errors
/// Returns JsValue error if any element cannot be created
pub fn open_modal(document: &Document, view: &ModalView) -> Result<Modal, JsValue> {
    let root = document.create_element("div")?;
    root.set_class_name(MODAL_CLASS);
    root.set_attribute("role", "dialog")?;
    root.set_attribute("data-severity", view.severity.as_str())?;

    let summary = document.create_element("p")?;
    summary.set_text_content(Some(&format!(
        "{} issue(s), {} → {} tokens ({:.1}% shorter)",
        view.issue_count, view.original_tokens, view.corrected_tokens, view.savings_percent
    )));
    root.append_child(&summary)?;
    let original_block = text_block(document, "Original", &view.original_text)?;
    root.append_child(&original_block)?;
    let suggested_block = text_block(document, "Suggested", &view.corrected_text)?;
    root.append_child(&suggested_block)?;

    let accept = document.create_element("button")?;
    accept.set_text_content(Some("Use suggestion"));
    accept.set_attribute("data-action", "accept")?;
    let reject = document.create_element("button")?;
    reject.set_text_content(Some("Dismiss"));
    reject.set_attribute("data-action", "reject")?;
    root.append_child(&accept)?;
    root.append_child(&reject)?;

    let style = style_of(&root)?;
    style.set_property("position", "fixed")?;
    style.set_property("z-index", "2147483647")?;

    document.body().ok_or("No body")?.append_child(&root)?;
    Ok(Modal { root, accept, reject })
}
