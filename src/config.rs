//! Engine configuration
//!
//! All detection thresholds and dwell times live here as named values instead
//! of being repeated at each call site. Configurations load from JSON and are
//! validated once, when a session is constructed.

use crate::error::ProctorError;
use crate::types::ViolationKind;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default exam length (30 minutes)
pub const DEFAULT_DURATION_LIMIT_SECS: u64 = 30 * 60;

/// Longest accepted exam length (one week)
pub const MAX_DURATION_LIMIT_SECS: u64 = 7 * 24 * 60 * 60;

/// Default coalescing window for duplicate focus-loss notifications
pub const DEFAULT_COALESCE_WINDOW_MS: i64 = 200;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProctorConfig {
    pub session: SessionConfig,
    pub debounce: DebounceConfig,
    pub thresholds: DetectionThresholds,
    pub environment: EnvironmentConfig,
}

/// Timing of the session and of the capture loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Hard limit on the monitored phase
    pub duration_limit_secs: u64,
    /// Period between captured frames
    pub capture_interval_ms: u64,
    /// A perception call slower than this is treated as a dropped frame
    pub perception_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_limit_secs: DEFAULT_DURATION_LIMIT_SECS,
            capture_interval_ms: 500,
            perception_timeout_ms: 400,
        }
    }
}

impl SessionConfig {
    pub fn duration_limit(&self) -> Duration {
        Duration::seconds(self.duration_limit_secs.min(MAX_DURATION_LIMIT_SECS) as i64)
    }

    pub fn capture_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capture_interval_ms)
    }

    pub fn perception_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.perception_timeout_ms)
    }
}

/// Hysteresis dwell times for one violation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DwellTimes {
    /// `T_on`: how long the predicate must hold before an event opens
    pub on_ms: i64,
    /// `T_off`: how long the predicate must be false before an event closes
    pub off_ms: i64,
}

impl DwellTimes {
    pub fn new(on_ms: i64, off_ms: i64) -> Self {
        Self { on_ms, off_ms }
    }

    pub fn t_on(&self) -> Duration {
        Duration::milliseconds(self.on_ms)
    }

    pub fn t_off(&self) -> Duration {
        Duration::milliseconds(self.off_ms)
    }
}

/// Dwell times shared by every debounced kind, with per-kind overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    pub default: DwellTimes,
    pub overrides: BTreeMap<ViolationKind, DwellTimes>,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        // Blinks last a few hundred milliseconds; only sustained closure counts.
        overrides.insert(ViolationKind::EyesClosed, DwellTimes::new(2_000, 500));
        // Speaking produces short open/close cycles.
        overrides.insert(ViolationKind::MouthOpen, DwellTimes::new(1_500, 1_500));

        Self {
            default: DwellTimes::new(1_000, 1_000),
            overrides,
        }
    }
}

impl DebounceConfig {
    /// Dwell times that apply to `kind`
    pub fn dwell_for(&self, kind: ViolationKind) -> DwellTimes {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }

    /// The same dwell times for every kind
    pub fn uniform(on_ms: i64, off_ms: i64) -> Self {
        Self {
            default: DwellTimes::new(on_ms, off_ms),
            overrides: BTreeMap::new(),
        }
    }
}

/// Predicate thresholds for the frame-derived violation kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionThresholds {
    /// Lip distance / face box height above which the mouth is open
    pub mouth_open_ratio: f64,
    /// Absolute yaw above which the head counts as turned
    pub head_yaw_deg: f64,
    /// Absolute pitch above which the head counts as turned
    pub head_pitch_deg: f64,
    /// Eye asymmetry above which the head counts as turned (no pose angles)
    pub eye_asymmetry_ratio: f64,
    /// EAR below which an eye counts as closed
    pub eye_aspect_ratio: f64,
    /// Hand-to-face-centre distance below which a device is assumed
    /// (only when no device classifier output exists)
    pub hand_face_distance: f64,
    /// Object labels that count as an auxiliary device
    pub device_labels: Vec<String>,
    /// Minimum classifier confidence for a device label
    pub device_min_confidence: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            mouth_open_ratio: 0.12,
            head_yaw_deg: 30.0,
            head_pitch_deg: 20.0,
            eye_asymmetry_ratio: 0.35,
            eye_aspect_ratio: 0.2,
            hand_face_distance: 0.15,
            device_labels: vec![
                "cell phone".to_string(),
                "phone".to_string(),
                "tablet".to_string(),
                "earbuds".to_string(),
                "book".to_string(),
            ],
            device_min_confidence: 0.5,
        }
    }
}

/// Focus-loss channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Duplicate notifications inside this window merge into one event
    pub coalesce_window_ms: i64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            coalesce_window_ms: DEFAULT_COALESCE_WINDOW_MS,
        }
    }
}

impl EnvironmentConfig {
    pub fn coalesce_window(&self) -> Duration {
        Duration::milliseconds(self.coalesce_window_ms)
    }
}

impl ProctorConfig {
    /// Parse and validate a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ProctorError> {
        let config: ProctorConfig = serde_json::from_str(json)
            .map_err(|e| ProctorError::ConfigurationError(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn from_file(path: &Path) -> Result<Self, ProctorError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ProctorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<(), ProctorError> {
        let session = &self.session;
        if session.duration_limit_secs == 0 {
            return Err(config_error("session.duration_limit_secs must be positive"));
        }
        if session.duration_limit_secs > MAX_DURATION_LIMIT_SECS {
            return Err(ProctorError::ConfigurationError(format!(
                "session.duration_limit_secs must not exceed {}",
                MAX_DURATION_LIMIT_SECS
            )));
        }
        let max_ms = MAX_DURATION_LIMIT_SECS * 1000;
        if session.capture_interval_ms == 0 || session.capture_interval_ms > max_ms {
            return Err(config_error(
                "session.capture_interval_ms must be positive and within the duration limit",
            ));
        }
        if session.perception_timeout_ms == 0 || session.perception_timeout_ms > max_ms {
            return Err(config_error(
                "session.perception_timeout_ms must be positive and within the duration limit",
            ));
        }

        check_dwell("debounce.default", &self.debounce.default)?;
        for (kind, dwell) in &self.debounce.overrides {
            if *kind == ViolationKind::TabSwitch {
                return Err(config_error(
                    "debounce.overrides: tab_switch is edge-triggered and cannot be debounced",
                ));
            }
            check_dwell(&format!("debounce.overrides.{}", kind.as_str()), dwell)?;
        }

        let t = &self.thresholds;
        check_positive("thresholds.mouth_open_ratio", t.mouth_open_ratio)?;
        check_positive("thresholds.head_yaw_deg", t.head_yaw_deg)?;
        check_positive("thresholds.head_pitch_deg", t.head_pitch_deg)?;
        check_positive("thresholds.eye_asymmetry_ratio", t.eye_asymmetry_ratio)?;
        check_positive("thresholds.eye_aspect_ratio", t.eye_aspect_ratio)?;
        check_positive("thresholds.hand_face_distance", t.hand_face_distance)?;
        if t.head_yaw_deg >= 180.0 || t.head_pitch_deg >= 180.0 {
            return Err(config_error("head pose thresholds must be below 180 degrees"));
        }
        if !(0.0..=1.0).contains(&t.device_min_confidence) {
            return Err(config_error("thresholds.device_min_confidence must be within [0, 1]"));
        }

        if self.environment.coalesce_window_ms < 0 {
            return Err(config_error("environment.coalesce_window_ms must not be negative"));
        }

        Ok(())
    }
}

fn config_error(msg: &str) -> ProctorError {
    ProctorError::ConfigurationError(msg.to_string())
}

fn check_dwell(name: &str, dwell: &DwellTimes) -> Result<(), ProctorError> {
    if dwell.on_ms < 0 || dwell.off_ms < 0 {
        return Err(ProctorError::ConfigurationError(format!(
            "{name}: dwell times must not be negative (on_ms={}, off_ms={})",
            dwell.on_ms, dwell.off_ms
        )));
    }
    Ok(())
}

fn check_positive(name: &str, value: f64) -> Result<(), ProctorError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ProctorError::ConfigurationError(format!(
            "{name} must be a positive finite number, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ProctorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{
            "session": { "duration_limit_secs": 600 },
            "debounce": { "default": { "on_ms": 500, "off_ms": 250 } }
        }"#;

        let config = ProctorConfig::from_json(json).unwrap();
        assert_eq!(config.session.duration_limit_secs, 600);
        assert_eq!(config.session.capture_interval_ms, 500);
        assert_eq!(config.debounce.default, DwellTimes::new(500, 250));
        assert_eq!(config.thresholds, DetectionThresholds::default());
        assert_eq!(config.environment.coalesce_window_ms, 200);
    }

    #[test]
    fn test_negative_dwell_is_rejected() {
        let json = r#"{ "debounce": { "default": { "on_ms": -1, "off_ms": 100 } } }"#;
        let err = ProctorConfig::from_json(json).unwrap_err();
        assert!(matches!(err, ProctorError::ConfigurationError(_)));
    }

    #[test]
    fn test_negative_override_is_rejected() {
        let mut config = ProctorConfig::default();
        config
            .debounce
            .overrides
            .insert(ViolationKind::HeadTurned, DwellTimes::new(100, -5));
        assert!(matches!(
            config.validate(),
            Err(ProctorError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_tab_switch_override_is_rejected() {
        let mut config = ProctorConfig::default();
        config
            .debounce
            .overrides
            .insert(ViolationKind::TabSwitch, DwellTimes::new(100, 100));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_finite_threshold_is_rejected() {
        let mut config = ProctorConfig::default();
        config.thresholds.eye_aspect_ratio = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ProctorConfig::default();
        config.thresholds.head_yaw_deg = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_duration_is_rejected() {
        let mut config = ProctorConfig::default();
        config.session.duration_limit_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let json = r#"{ "session": { "duration_limit_secs": 10000000000000000 } }"#;
        let err = ProctorConfig::from_json(json).unwrap_err();
        assert!(matches!(err, ProctorError::ConfigurationError(_)));

        let mut config = ProctorConfig::default();
        config.session.duration_limit_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ProctorError::ConfigurationError(_))
        ));
        // Never negative, even unvalidated
        assert_eq!(
            config.session.duration_limit(),
            Duration::seconds(MAX_DURATION_LIMIT_SECS as i64)
        );

        config.session.duration_limit_secs = MAX_DURATION_LIMIT_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oversized_perception_timeout_is_rejected() {
        let mut config = ProctorConfig::default();
        config.session.perception_timeout_ms = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ProctorError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_dwell_override_lookup() {
        let config = DebounceConfig::default();
        assert_eq!(config.dwell_for(ViolationKind::EyesClosed).on_ms, 2_000);
        assert_eq!(config.dwell_for(ViolationKind::NoFace), config.default);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = ProctorConfig::default();
        let json = config.to_json().unwrap();
        let parsed = ProctorConfig::from_json(&json).unwrap();
        pretty_assertions::assert_eq!(parsed, config);
    }
}
