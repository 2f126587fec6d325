//! Event subscriptions that unsubscribe on drop
//!
//! Each attached overlay holds one [`OverlayHandles`]. Dropping it removes
//! every listener it wired, so detaching an overlay cannot leak closures.

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Element, Event, EventTarget, ResizeObserver};

/// One `addEventListener` registration
pub struct Listener {
    target: EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut(Event)>,
}

impl Listener {
    pub fn new(
        target: &EventTarget,
        event: &'static str,
        callback: impl FnMut(Event) + 'static,
    ) -> Result<Self, JsValue> {
        let callback = Closure::wrap(Box::new(callback) as Box<dyn FnMut(Event)>);
        target.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())?;
        Ok(Self {
            target: target.clone(),
            event,
            callback,
        })
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}

/// A `ResizeObserver` watching one or more elements
pub struct ResizeWatch {
    observer: ResizeObserver,
    _callback: Closure<dyn FnMut(js_sys::Array, ResizeObserver)>,
}

impl ResizeWatch {
    pub fn new(targets: &[&Element], mut callback: impl FnMut() + 'static) -> Result<Self, JsValue> {
        let closure = Closure::wrap(Box::new(move |_entries: js_sys::Array, _obs: ResizeObserver| {
            callback();
        }) as Box<dyn FnMut(js_sys::Array, ResizeObserver)>);
        let observer = ResizeObserver::new(closure.as_ref().unchecked_ref())?;
        for target in targets {
            observer.observe(target);
        }
        Ok(Self {
            observer,
            _callback: closure,
        })
    }
}

impl Drop for ResizeWatch {
    fn drop(&mut self) {
        self.observer.disconnect();
    }
}

/// Everything wired for one overlay
#[derive(Default)]
pub struct OverlayHandles {
    pub listeners: Vec<Listener>,
    pub resize: Option<ResizeWatch>,
}

impl OverlayHandles {
    pub fn listen(
        &mut self,
        target: &EventTarget,
        event: &'static str,
        callback: impl FnMut(Event) + 'static,
    ) -> Result<(), JsValue> {
        self.listeners.push(Listener::new(target, event, callback)?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.listeners.len() + usize::from(self.resize.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
