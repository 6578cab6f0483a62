//! Core types for the Synheart Proctor engine
//!
//! This module defines the data structures that flow through each stage of a
//! proctoring session: perception signals, violation events, quiz data, live
//! metrics and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kinds of violation the engine can record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultiFace,
    MouthOpen,
    HeadTurned,
    EyesClosed,
    DeviceDetected,
    TabSwitch,
}

impl ViolationKind {
    /// Every kind, in report order
    pub const ALL: [ViolationKind; 7] = [
        ViolationKind::NoFace,
        ViolationKind::MultiFace,
        ViolationKind::MouthOpen,
        ViolationKind::HeadTurned,
        ViolationKind::EyesClosed,
        ViolationKind::DeviceDetected,
        ViolationKind::TabSwitch,
    ];

    /// Kinds derived from perception frames (everything except `TabSwitch`)
    pub const FRAME_KINDS: [ViolationKind; 6] = [
        ViolationKind::NoFace,
        ViolationKind::MultiFace,
        ViolationKind::MouthOpen,
        ViolationKind::HeadTurned,
        ViolationKind::EyesClosed,
        ViolationKind::DeviceDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "no_face",
            ViolationKind::MultiFace => "multi_face",
            ViolationKind::MouthOpen => "mouth_open",
            ViolationKind::HeadTurned => "head_turned",
            ViolationKind::EyesClosed => "eyes_closed",
            ViolationKind::DeviceDetected => "device_detected",
            ViolationKind::TabSwitch => "tab_switch",
        }
    }
}

/// A discrete, timestamped record that a monitored condition was active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub start_time: DateTime<Utc>,
    /// `None` while the event is still ongoing
    pub end_time: Option<DateTime<Utc>>,
}

impl ViolationEvent {
    /// An event that is still open
    pub fn ongoing(kind: ViolationKind, start_time: DateTime<Utc>) -> Self {
        Self {
            kind,
            start_time,
            end_time: None,
        }
    }

    /// A finished event
    pub fn closed(kind: ViolationKind, start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            kind,
            start_time,
            end_time: Some(end_time),
        }
    }

    pub fn is_ongoing(&self) -> bool {
        self.end_time.is_none()
    }

    /// Duration in seconds, measuring ongoing events up to `as_of`
    pub fn duration_secs(&self, as_of: DateTime<Utc>) -> f64 {
        let end = self.end_time.unwrap_or(as_of);
        let millis = (end - self.start_time).num_milliseconds().max(0);
        millis as f64 / 1000.0
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Setup,
    Monitoring,
    Submitted,
    Reported,
}

/// What moved the session out of `Monitoring`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionTrigger {
    Manual,
    TimerExpired,
}

/// Openness of a single eye as reported by the perception provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EyeOpenness {
    /// Eye aspect ratio (vertical eyelid distance / eye width)
    Ratio(f64),
    Open,
    Closed,
}

/// Normalized observations for one analyzed frame.
///
/// Produced by the perception layer; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptionSignal {
    pub timestamp: DateTime<Utc>,
    pub face_count: u32,
    #[serde(default)]
    pub mouth_open: bool,
    /// Vertical lip distance normalized to the face box height
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mouth_open_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_yaw_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_pitch_deg: Option<f64>,
    /// Horizontal asymmetry of the eyes about the nose (0 = centred)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eye_asymmetry_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyes_open_left: Option<EyeOpenness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eyes_open_right: Option<EyeOpenness>,
    /// Device classifier output; `None` when no classifier ran on this frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auxiliary_device_present: Option<bool>,
    /// Distance from the closest hand landmark to the face centre
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hand_face_distance: Option<f64>,
}

impl PerceptionSignal {
    /// A signal carrying only a face count
    pub fn with_faces(timestamp: DateTime<Utc>, face_count: u32) -> Self {
        Self {
            timestamp,
            face_count,
            mouth_open: false,
            mouth_open_ratio: None,
            head_yaw_deg: None,
            head_pitch_deg: None,
            eye_asymmetry_ratio: None,
            eyes_open_left: None,
            eyes_open_right: None,
            auxiliary_device_present: None,
            hand_face_distance: None,
        }
    }
}

/// Coarse integrity-risk category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Output of the risk scorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Numeric score in `[0, 100]`
    pub score: f64,
    pub level: RiskLevel,
}

/// A multiple-choice question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: String,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
}

/// A candidate's answer to one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub question_id: String,
    pub selected_index: Option<usize>,
}

/// Where the session's question set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    /// Produced by a question generator
    Generated,
    /// Embedded fallback set, used when no generator was available
    Fallback,
    /// Provided directly by the caller
    Supplied,
}

/// Scored quiz outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    pub correct: u32,
    pub total: u32,
}

/// Live metrics for display while a session runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMetrics {
    pub phase: Phase,
    pub elapsed_seconds: f64,
    /// `None` before the session has started
    pub time_remaining_seconds: Option<f64>,
    pub open_counts: BTreeMap<ViolationKind, u32>,
    pub ongoing: Vec<ViolationKind>,
    pub tab_switch_count: u32,
    pub frame_count: u64,
}

/// Report producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Immutable end-of-session report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub producer: ReportProducer,
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub submission_trigger: SubmissionTrigger,
    pub duration_seconds: f64,
    pub face_visibility_pct: f64,
    pub violation_counts: BTreeMap<ViolationKind, u32>,
    pub tab_switch_count: u32,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub quiz_score: u32,
    pub quiz_total: u32,
    pub question_source: QuestionSource,
    pub frame_count: u64,
    pub face_present_frame_count: u64,
    pub dropped_frame_count: u64,
    /// Every recorded event in start order
    pub events: Vec<ViolationEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_violation_kind_serialization() {
        let json = serde_json::to_string(&ViolationKind::DeviceDetected).unwrap();
        assert_eq!(json, "\"device_detected\"");

        let parsed: ViolationKind = serde_json::from_str("\"tab_switch\"").unwrap();
        assert_eq!(parsed, ViolationKind::TabSwitch);
    }

    #[test]
    fn test_violation_kind_as_str_matches_serde() {
        for kind in ViolationKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }

    #[test]
    fn test_event_duration() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 45).unwrap();

        let closed = ViolationEvent::closed(ViolationKind::NoFace, start, end);
        assert!(!closed.is_ongoing());
        assert_eq!(closed.duration_secs(end + chrono::Duration::hours(1)), 45.0);

        let ongoing = ViolationEvent::ongoing(ViolationKind::NoFace, start);
        assert!(ongoing.is_ongoing());
        assert_eq!(ongoing.duration_secs(end), 45.0);
    }

    #[test]
    fn test_signal_deserialization_with_defaults() {
        let json = r#"{
            "timestamp": "2024-03-01T09:00:00Z",
            "face_count": 1,
            "head_yaw_deg": 12.5,
            "eyes_open_left": { "ratio": 0.31 },
            "eyes_open_right": "closed"
        }"#;

        let signal: PerceptionSignal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.face_count, 1);
        assert!(!signal.mouth_open);
        assert_eq!(signal.head_yaw_deg, Some(12.5));
        assert_eq!(signal.head_pitch_deg, None);
        assert_eq!(signal.eyes_open_left, Some(EyeOpenness::Ratio(0.31)));
        assert_eq!(signal.eyes_open_right, Some(EyeOpenness::Closed));
        assert_eq!(signal.auxiliary_device_present, None);
    }
}
