//! Settings bag and engine tunables
//!
//! [`Settings`] is the user-facing key-value bag pushed by the extension's
//! storage layer. [`EngineConfig`] carries the numeric knobs of the scanner,
//! positioning engine and convergence loop.

use crate::error::LensError;
use serde::{Deserialize, Serialize};
use shared_types::Severity;
use std::fmt;

/// Where analysis runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerMode {
    #[default]
    Local,
    Remote,
}

/// User settings, read at session start and on every pushed update
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub overlay_visible: bool,
    #[serde(default = "default_min_severity")]
    pub min_severity_to_show: Severity,
    #[serde(default)]
    pub mode: AnalyzerMode,
    /// Opaque credential forwarded to the remote analyzer
    #[serde(default)]
    pub credentials: Option<String>,
    /// Base URL of the remote analyzer
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_min_severity() -> Severity {
    Severity::Low
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            overlay_visible: true,
            min_severity_to_show: default_min_severity(),
            mode: AnalyzerMode::Local,
            credentials: None,
            endpoint: None,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("enabled", &self.enabled)
            .field("overlay_visible", &self.overlay_visible)
            .field("min_severity_to_show", &self.min_severity_to_show)
            .field("mode", &self.mode)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Settings {
    /// Parse the bag from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, LensError> {
        let settings: Settings =
            serde_json::from_str(json).map_err(|e| LensError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), LensError> {
        if self.min_severity_to_show.is_neutral() {
            return Err(LensError::Config(
                "minSeverityToShow must be low, medium or high".to_string(),
            ));
        }
        if self.mode == AnalyzerMode::Remote && self.endpoint.as_deref().unwrap_or("").is_empty()
        {
            return Err(LensError::Config(
                "remote mode requires an endpoint".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a partial update, returning the merged bag
    pub fn merged(&self, update: &SettingsUpdate) -> Result<Self, LensError> {
        let mut next = self.clone();
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        if let Some(visible) = update.overlay_visible {
            next.overlay_visible = visible;
        }
        if let Some(min) = update.min_severity_to_show {
            next.min_severity_to_show = min;
        }
        if let Some(mode) = update.mode {
            next.mode = mode;
        }
        if let Some(ref credentials) = update.credentials {
            next.credentials = Some(credentials.clone());
        }
        if let Some(ref endpoint) = update.endpoint {
            next.endpoint = Some(endpoint.clone());
        }
        next.validate()?;
        Ok(next)
    }
}

/// Partial settings pushed by the storage layer's change events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub overlay_visible: Option<bool>,
    pub min_severity_to_show: Option<Severity>,
    pub mode: Option<AnalyzerMode>,
    pub credentials: Option<String>,
    pub endpoint: Option<String>,
}

impl SettingsUpdate {
    pub fn from_json(json: &str) -> Result<Self, LensError> {
        serde_json::from_str(json).map_err(|e| LensError::Config(e.to_string()))
    }
}

/// Numeric tunables for the whole engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest rendered width accepted by the classifier (px)
    pub min_width: f64,
    /// Smallest rendered height accepted by the classifier (px)
    pub min_height: f64,
    /// Hard cap on concurrently attached overlays
    pub max_overlays: usize,
    /// Minimum spacing between two re-scans (ms)
    pub scan_cooldown_ms: u64,
    /// Quiet period before the settled analysis pass (ms)
    pub settle_delay_ms: u64,
    /// Delays of the positioning passes run after attach (ms)
    pub reposition_passes_ms: Vec<u64>,
    /// Overlay icon edge length (px)
    pub icon_size: f64,
    /// Inset from the input's edges (px)
    pub edge_padding: f64,
    /// Mandatory gap between the icon and any colliding control (px)
    pub clearance_margin: f64,
    /// Obstacles whose right edge is this close to the container's count as right-aligned (px)
    pub right_edge_threshold: f64,
    /// Alignment score above which an obstacle counts as right-aligned
    pub alignment_threshold: f64,
    /// Pointer travel before a press becomes a drag (px)
    pub drag_threshold: f64,
    /// Iteration budget of the convergence loop
    pub convergence_budget: u32,
    /// Bounded wait on the remote analyzer (ms)
    pub analyzer_timeout_ms: u32,
    /// Fewer words than this analyze as neutral
    pub min_words: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_width: 120.0,
            min_height: 24.0,
            max_overlays: 3,
            scan_cooldown_ms: 1_000,
            settle_delay_ms: 600,
            reposition_passes_ms: vec![0, 150, 600],
            icon_size: 24.0,
            edge_padding: 8.0,
            clearance_margin: 8.0,
            right_edge_threshold: 24.0,
            alignment_threshold: 0.85,
            drag_threshold: 4.0,
            convergence_budget: 3,
            analyzer_timeout_ms: 4_000,
            min_words: 3,
        }
    }
}

impl EngineConfig {
    /// Preset for dense pages (many editors, e.g. comment threads)
    pub fn dense_page() -> Self {
        Self {
            max_overlays: 1,
            scan_cooldown_ms: 2_000,
            ..Self::default()
        }
    }

    /// Preset with every delay at zero, for deterministic tests
    pub fn immediate() -> Self {
        Self {
            scan_cooldown_ms: 0,
            settle_delay_ms: 0,
            reposition_passes_ms: vec![0],
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, LensError> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| LensError::Config(e.to_string()))?;
        if config.icon_size <= 0.0 || config.clearance_margin < 0.0 {
            return Err(LensError::Config(
                "icon_size must be positive and clearance_margin non-negative".to_string(),
            ));
        }
        if config.convergence_budget == 0 {
            return Err(LensError::Config(
                "convergence_budget must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_settings_defaults_from_empty_bag() {
        let settings = Settings::from_json("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.enabled);
        assert_eq!(settings.min_severity_to_show, Severity::Low);
    }

    #[test]
    fn test_settings_camel_case_keys() {
        let json = r#"{
            "enabled": false,
            "overlayVisible": false,
            "minSeverityToShow": "high",
            "mode": "remote",
            "endpoint": "https://api.example.com",
            "credentials": "token-123"
        }"#;
        let settings = Settings::from_json(json).unwrap();
        assert!(!settings.enabled);
        assert!(!settings.overlay_visible);
        assert_eq!(settings.min_severity_to_show, Severity::High);
        assert_eq!(settings.mode, AnalyzerMode::Remote);
        assert_eq!(settings.credentials.as_deref(), Some("token-123"));
    }

    #[test]
    fn test_remote_mode_requires_endpoint() {
        let err = Settings::from_json(r#"{"mode":"remote"}"#).unwrap_err();
        assert!(matches!(err, LensError::Config(_)));
    }

    #[test]
    fn test_neutral_threshold_rejected() {
        assert!(Settings::from_json(r#"{"minSeverityToShow":"neutral"}"#).is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let settings = Settings {
            credentials: Some("secret-token".into()),
            ..Default::default()
        };
        let out = format!("{:?}", settings);
        assert!(!out.contains("secret-token"));
        assert!(out.contains("<redacted>"));
    }

    #[test]
    fn test_merge_partial_update() {
        let base = Settings::default();
        let update = SettingsUpdate::from_json(r#"{"overlayVisible":false}"#).unwrap();
        let merged = base.merged(&update).unwrap();
        assert!(!merged.overlay_visible);
        assert!(merged.enabled);

        let bad = SettingsUpdate {
            mode: Some(AnalyzerMode::Remote),
            ..Default::default()
        };
        assert!(base.merged(&bad).is_err());
    }

    #[test]
    fn test_engine_config_partial_json() {
        let config = EngineConfig::from_json(r#"{"max_overlays": 5}"#).unwrap();
        assert_eq!(config.max_overlays, 5);
        assert_eq!(config.icon_size, 24.0);

        assert!(EngineConfig::from_json(r#"{"convergence_budget": 0}"#).is_err());
    }

    #[test]
    fn test_presets() {
        assert_eq!(EngineConfig::dense_page().max_overlays, 1);
        assert_eq!(EngineConfig::immediate().scan_cooldown_ms, 0);
    }
}
