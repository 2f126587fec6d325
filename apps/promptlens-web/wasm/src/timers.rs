//! Browser clock and one-shot timers

use promptlens_core::{Clock, Millis};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Monotonic clock backed by `performance.now()`
#[derive(Debug, Clone, Default)]
pub struct PerformanceClock;

impl Clock for PerformanceClock {
    fn now(&self) -> Millis {
        web_sys::window()
            .and_then(|w| w.performance())
            .map(|p| p.now().max(0.0) as Millis)
            .unwrap_or(0)
    }
}

/// A pending `setTimeout`. Dropping it clears the timer.
pub struct Timeout {
    handle: i32,
    _callback: Closure<dyn FnMut()>,
}

impl Timeout {
    pub fn new(delay: Millis, callback: impl FnMut() + 'static) -> Result<Self, JsValue> {
        let window = web_sys::window().ok_or("No window")?;
        let callback = Closure::wrap(Box::new(callback) as Box<dyn FnMut()>);
        let delay = delay.min(i32::MAX as Millis) as i32;
        let handle = window.set_timeout_with_callback_and_timeout_and_arguments_0(
            callback.as_ref().unchecked_ref(),
            delay,
        )?;
        Ok(Self {
            handle,
            _callback: callback,
        })
    }
}

impl Drop for Timeout {
    fn drop(&mut self) {
        if let Some(window) = web_sys::window() {
            window.clear_timeout_with_handle(self.handle);
        }
    }
}

/// Promise that resolves after `delay` milliseconds
pub fn sleep(delay: Millis) -> js_sys::Promise {
    let delay = delay.min(i32::MAX as Millis) as i32;
    js_sys::Promise::new(&mut |resolve, reject| {
        let Some(window) = web_sys::window() else {
            let _ = reject.call1(&JsValue::NULL, &JsValue::from_str("No window"));
            return;
        };
        if let Err(e) =
            window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, delay)
        {
            let _ = reject.call1(&JsValue::NULL, &e);
        }
    })
}
