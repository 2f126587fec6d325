//! localStorage persistence for pinned overlay positions

use promptlens_core::{LensError, PinnedPosition, PositionStore};
use wasm_bindgen::JsValue;

pub const KEY_PREFIX: &str = "promptlens:pin:";

fn storage_error(e: JsValue) -> LensError {
    LensError::Storage(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

/// Full localStorage key for an overlay key
pub fn storage_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Pinned positions in `window.localStorage`, scoped to the page origin
#[derive(Debug, Default, Clone)]
pub struct LocalPositionStore;

impl LocalPositionStore {
    pub fn new() -> Self {
        Self
    }

    fn storage(&self) -> Result<web_sys::Storage, LensError> {
        let window = web_sys::window().ok_or_else(|| LensError::Storage("No window".into()))?;
        window
            .local_storage()
            .map_err(storage_error)?
            .ok_or_else(|| LensError::Storage("No localStorage".into()))
    }
}

impl PositionStore for LocalPositionStore {
    fn load(&self, key: &str) -> Result<Option<PinnedPosition>, LensError> {
        let Some(json) = self
            .storage()?
            .get_item(&storage_key(key))
            .map_err(storage_error)?
        else {
            return Ok(None);
        };
        // A corrupt entry behaves like no pin at all
        Ok(serde_json::from_str(&json).ok())
    }

    fn save(&mut self, key: &str, position: PinnedPosition) -> Result<(), LensError> {
        let json =
            serde_json::to_string(&position).map_err(|e| LensError::Storage(e.to_string()))?;
        self.storage()?
            .set_item(&storage_key(key), &json)
            .map_err(storage_error)
    }
}
