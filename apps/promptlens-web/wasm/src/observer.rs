//! MutationObserver change feed

use js_sys::Array;
use promptlens_core::ChangeRecord;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, MutationObserver, MutationObserverInit, MutationRecord, NodeList};

/// Lowercase tag names of the element nodes in `nodes`
fn element_tags(nodes: &NodeList) -> Vec<String> {
    (0..nodes.length())
        .filter_map(|i| nodes.item(i))
        .filter_map(|n| n.dyn_into::<Element>().ok())
        .map(|e| e.tag_name().to_lowercase())
        .collect()
}

/// Convert a browser record. Character-data records and text-only
/// child-list changes yield `None`.
pub fn to_change_record(record: &MutationRecord) -> Option<ChangeRecord> {
    match record.type_().as_str() {
        "childList" => {
            let added = element_tags(&record.added_nodes());
            let removed = element_tags(&record.removed_nodes());
            if added.is_empty() && removed.is_empty() {
                None
            } else {
                Some(ChangeRecord::ChildList { added, removed })
            }
        }
        "attributes" => {
            let name = record.attribute_name()?;
            let target_tag = record
                .target()
                .and_then(|n| n.dyn_into::<Element>().ok())
                .map(|e| e.tag_name().to_lowercase())
                .unwrap_or_default();
            Some(ChangeRecord::Attribute { name, target_tag })
        }
        _ => None,
    }
}

/// Live subscription to structural changes under `document.body`.
/// Dropping it disconnects the observer.
pub struct ChangeFeed {
    observer: MutationObserver,
    _callback: Closure<dyn FnMut(Array, MutationObserver)>,
}

impl ChangeFeed {
    pub fn observe(
        attribute_filter: &[&str],
        mut on_change: impl FnMut(Vec<ChangeRecord>) + 'static,
    ) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or("No window")?;
        let document = window.document().ok_or("No document")?;
        let body = document.body().ok_or("No body")?;

        let callback = Closure::wrap(Box::new(move |records: Array, _obs: MutationObserver| {
            let batch: Vec<ChangeRecord> = records
                .iter()
                .filter_map(|r| r.dyn_into::<MutationRecord>().ok())
                .filter_map(|r| to_change_record(&r))
                .collect();
            if !batch.is_empty() {
                on_change(batch);
            }
        }) as Box<dyn FnMut(Array, MutationObserver)>);

        let observer = MutationObserver::new(callback.as_ref().unchecked_ref())?;
        let filter: Array = attribute_filter.iter().map(|a| JsValue::from_str(a)).collect();
        let init = MutationObserverInit::new();
        init.set_child_list(true);
        init.set_subtree(true);
        init.set_attributes(true);
        init.set_attribute_filter(&filter);
        observer.observe_with_options(&body, &init)?;

        Ok(Self {
            observer,
            _callback: callback,
        })
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}
