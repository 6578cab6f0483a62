//! Per-frame violation predicates
//!
//! Each frame-derived violation kind has a boolean predicate over a
//! `PerceptionSignal`. The predicates only classify; dwell-time filtering is
//! the debouncer's job.

use crate::config::DetectionThresholds;
use crate::types::{EyeOpenness, PerceptionSignal, ViolationKind};

/// Evaluates violation predicates against configured thresholds
#[derive(Debug, Clone)]
pub struct ViolationPredicates {
    thresholds: DetectionThresholds,
}

impl ViolationPredicates {
    pub fn new(thresholds: DetectionThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    /// Predicate values for every frame-derived kind
    pub fn evaluate(&self, signal: &PerceptionSignal) -> [(ViolationKind, bool); 6] {
        ViolationKind::FRAME_KINDS.map(|kind| (kind, self.holds(kind, signal)))
    }

    /// Whether the predicate for `kind` holds on this frame
    pub fn holds(&self, kind: ViolationKind, signal: &PerceptionSignal) -> bool {
        match kind {
            ViolationKind::NoFace => signal.face_count == 0,
            ViolationKind::MultiFace => signal.face_count > 1,
            // Facial predicates need a face to measure.
            ViolationKind::MouthOpen => signal.face_count > 0 && self.mouth_open(signal),
            ViolationKind::HeadTurned => signal.face_count > 0 && self.head_turned(signal),
            ViolationKind::EyesClosed => signal.face_count > 0 && self.eyes_closed(signal),
            ViolationKind::DeviceDetected => self.device_detected(signal),
            ViolationKind::TabSwitch => false,
        }
    }

    fn mouth_open(&self, signal: &PerceptionSignal) -> bool {
        match signal.mouth_open_ratio {
            Some(ratio) => ratio > self.thresholds.mouth_open_ratio,
            None => signal.mouth_open,
        }
    }

    fn head_turned(&self, signal: &PerceptionSignal) -> bool {
        if signal.head_yaw_deg.is_some() || signal.head_pitch_deg.is_some() {
            let yaw = signal.head_yaw_deg.map(f64::abs).unwrap_or(0.0);
            let pitch = signal.head_pitch_deg.map(f64::abs).unwrap_or(0.0);
            return yaw > self.thresholds.head_yaw_deg || pitch > self.thresholds.head_pitch_deg;
        }

        // Fallback when the provider gives no pose angles
        signal
            .eye_asymmetry_ratio
            .map(|ratio| ratio > self.thresholds.eye_asymmetry_ratio)
            .unwrap_or(false)
    }

    fn eyes_closed(&self, signal: &PerceptionSignal) -> bool {
        match (signal.eyes_open_left, signal.eyes_open_right) {
            (Some(left), Some(right)) => self.eye_closed(left) && self.eye_closed(right),
            _ => false,
        }
    }

    fn eye_closed(&self, eye: EyeOpenness) -> bool {
        match eye {
            EyeOpenness::Ratio(ear) => ear < self.thresholds.eye_aspect_ratio,
            EyeOpenness::Closed => true,
            EyeOpenness::Open => false,
        }
    }

    fn device_detected(&self, signal: &PerceptionSignal) -> bool {
        match signal.auxiliary_device_present {
            Some(present) => present,
            // Hand-near-face only stands in when no classifier output exists
            None => signal
                .hand_face_distance
                .map(|d| d < self.thresholds.hand_face_distance)
                .unwrap_or(false),
        }
    }
}

impl Default for ViolationPredicates {
    fn default() -> Self {
        Self::new(DetectionThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn signal(face_count: u32) -> PerceptionSignal {
        PerceptionSignal::with_faces(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(), face_count)
    }

    #[test]
    fn test_face_count_predicates() {
        let p = ViolationPredicates::default();
        assert!(p.holds(ViolationKind::NoFace, &signal(0)));
        assert!(!p.holds(ViolationKind::NoFace, &signal(1)));
        assert!(p.holds(ViolationKind::MultiFace, &signal(2)));
        assert!(!p.holds(ViolationKind::MultiFace, &signal(1)));
    }

    #[test]
    fn test_mouth_ratio_overrides_flag() {
        let p = ViolationPredicates::default();
        let mut s = signal(1);
        s.mouth_open = true;
        s.mouth_open_ratio = Some(0.05);
        assert!(!p.holds(ViolationKind::MouthOpen, &s));

        s.mouth_open_ratio = None;
        assert!(p.holds(ViolationKind::MouthOpen, &s));
    }

    #[test]
    fn test_head_pose_thresholds() {
        let p = ViolationPredicates::default();
        let mut s = signal(1);
        s.head_yaw_deg = Some(-35.0);
        assert!(p.holds(ViolationKind::HeadTurned, &s));

        s.head_yaw_deg = Some(10.0);
        s.head_pitch_deg = Some(15.0);
        assert!(!p.holds(ViolationKind::HeadTurned, &s));

        s.head_pitch_deg = Some(-25.0);
        assert!(p.holds(ViolationKind::HeadTurned, &s));
    }

    #[test]
    fn test_asymmetry_fallback_only_without_pose() {
        let p = ViolationPredicates::default();
        let mut s = signal(1);
        s.eye_asymmetry_ratio = Some(0.6);
        assert!(p.holds(ViolationKind::HeadTurned, &s));

        // Pose angles take precedence over the heuristic
        s.head_yaw_deg = Some(5.0);
        assert!(!p.holds(ViolationKind::HeadTurned, &s));
    }

    #[test]
    fn test_eyes_closed_requires_both_eyes() {
        let p = ViolationPredicates::default();
        let mut s = signal(1);
        s.eyes_open_left = Some(EyeOpenness::Ratio(0.1));
        s.eyes_open_right = Some(EyeOpenness::Ratio(0.3));
        assert!(!p.holds(ViolationKind::EyesClosed, &s));

        s.eyes_open_right = Some(EyeOpenness::Closed);
        assert!(p.holds(ViolationKind::EyesClosed, &s));

        s.eyes_open_right = None;
        assert!(!p.holds(ViolationKind::EyesClosed, &s));
    }

    #[test]
    fn test_facial_predicates_need_a_face() {
        let p = ViolationPredicates::default();
        let mut s = signal(0);
        s.mouth_open = true;
        s.head_yaw_deg = Some(80.0);
        s.eyes_open_left = Some(EyeOpenness::Closed);
        s.eyes_open_right = Some(EyeOpenness::Closed);

        let evaluated = p.evaluate(&s);
        let active: Vec<ViolationKind> = evaluated
            .iter()
            .filter(|(_, holds)| *holds)
            .map(|(kind, _)| *kind)
            .collect();
        assert_eq!(active, vec![ViolationKind::NoFace]);
    }

    #[test]
    fn test_classifier_output_beats_hand_heuristic() {
        let p = ViolationPredicates::default();
        let mut s = signal(1);
        s.hand_face_distance = Some(0.05);
        assert!(p.holds(ViolationKind::DeviceDetected, &s));

        s.auxiliary_device_present = Some(false);
        assert!(!p.holds(ViolationKind::DeviceDetected, &s));

        s.auxiliary_device_present = Some(true);
        s.hand_face_distance = None;
        assert!(p.holds(ViolationKind::DeviceDetected, &s));
    }
}
