//! WASM bindings for the PromptLens overlay
//!
//! Finds chat-style text inputs on the host page, pins a small indicator
//! next to each one, and offers a shorter rewrite of what the user typed.
//!
//! ## Architecture
//!
//! - Discovery, classification, placement and analysis state live in
//!   `promptlens-core`, which never touches the DOM
//! - [`dom_page::DomPage`] gives the engine its view of the page
//! - [`lens::PromptLens`] runs the engine's effects against the real DOM
//! - JavaScript only forwards settings from extension storage
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { PromptLens } from './pkg/promptlens_wasm.js';
//!
//! await init();
//!
//! const lens = new PromptLens();
//! lens.applySettings(JSON.stringify(await chrome.storage.sync.get()));
//! chrome.storage.onChanged.addListener((changes) => {
//!     const update = Object.fromEntries(
//!         Object.entries(changes).map(([k, v]) => [k, v.newValue]));
//!     lens.updateSettings(JSON.stringify(update));
//! });
//! window.addEventListener('popstate', () => lens.reset());
//! ```

pub mod dom_page;
pub mod lens;
pub mod listeners;
pub mod observer;
pub mod remote;
pub mod render;
pub mod storage;
pub mod timers;

use wasm_bindgen::prelude::*;

pub use lens::PromptLens;

/// Initialize the WASM module
/// Called automatically by wasm-bindgen
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Get the library version
#[wasm_bindgen]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Shorten `text` with the built-in rules, no page or session needed
#[wasm_bindgen]
pub fn shorten_locally(text: &str) -> Result<JsValue, JsValue> {
    let shortened = promptlens_core::LocalAnalyzer::default().shorten_now(text);
    serde_wasm_bindgen::to_value(&shortened)
        .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_matches_manifest() {
        assert_eq!(get_version(), env!("CARGO_PKG_VERSION"));
    }
}
