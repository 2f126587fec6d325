//! Pinned overlay positions
//!
//! A drag release past the movement threshold pins an overlay. The chosen
//! coordinates are saved under a key derived from the page origin, the
//! input's stable attributes and its position among inputs sharing those
//! attributes, so the same input gets the same key after the page re-renders
//! it and look-alike inputs get distinct keys.

use crate::error::LensError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Viewport coordinates of a pinned overlay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinnedPosition {
    pub top: f64,
    pub left: f64,
}

/// Persistence key: hex SHA-256 of `origin`, the element signature and
/// `occurrence`, the element's index among same-signature inputs in scan order
pub fn overlay_key(origin: &str, signature: &str, occurrence: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(origin.as_bytes());
    hasher.update([0u8]);
    hasher.update(signature.as_bytes());
    hasher.update([0u8]);
    hasher.update((occurrence as u64).to_le_bytes());
    hex::encode(hasher.finalize())
}

pub trait PositionStore {
    fn load(&self, key: &str) -> Result<Option<PinnedPosition>, LensError>;

    fn save(&mut self, key: &str, position: PinnedPosition) -> Result<(), LensError>;
}

/// In-process store; positions last as long as the store
#[derive(Debug, Default, Clone)]
pub struct MemoryPositionStore {
    positions: HashMap<String, PinnedPosition>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl PositionStore for MemoryPositionStore {
    fn load(&self, key: &str) -> Result<Option<PinnedPosition>, LensError> {
        Ok(self.positions.get(key).copied())
    }

    fn save(&mut self, key: &str, position: PinnedPosition) -> Result<(), LensError> {
        if !position.top.is_finite() || !position.left.is_finite() {
            return Err(LensError::Storage(format!(
                "refusing to store non-finite position for {}",
                key
            )));
        }
        self.positions.insert(key.to_string(), position);
        Ok(())
    }
}
