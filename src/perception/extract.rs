//! Frame analysis → perception signal
//!
//! Measures lip opening, eye aspect ratio, eye asymmetry and hand proximity on
//! the largest detected face. Only the mouth threshold is applied here; the
//! remaining thresholds are applied by the violation predicates so that a
//! signal keeps its raw measurements.

use super::{EyeLandmarks, FaceDetection, FrameAnalysis};
use crate::config::DetectionThresholds;
use crate::types::{EyeOpenness, PerceptionSignal};
use chrono::{DateTime, Utc};

/// Provider likelihoods below this are read as "closed"
const OPEN_PROBABILITY_CUTOFF: f64 = 0.5;

/// Convert raw detections into a normalized signal
pub fn extract_signal(
    analysis: &FrameAnalysis,
    timestamp: DateTime<Utc>,
    thresholds: &DetectionThresholds,
) -> PerceptionSignal {
    let mut signal = PerceptionSignal::with_faces(timestamp, analysis.faces.len() as u32);

    signal.auxiliary_device_present = analysis.objects.as_ref().map(|objects| {
        objects.iter().any(|o| {
            o.confidence >= thresholds.device_min_confidence
                && thresholds
                    .device_labels
                    .iter()
                    .any(|label| label.eq_ignore_ascii_case(o.label.trim()))
        })
    });

    let Some(face) = primary_face(&analysis.faces) else {
        return signal;
    };

    if let Some(pose) = face.pose {
        signal.head_yaw_deg = Some(pose.yaw_deg);
        signal.head_pitch_deg = Some(pose.pitch_deg);
    }

    let center = face.bbox.center();
    signal.hand_face_distance = analysis
        .hands
        .iter()
        .map(|hand| hand.distance(&center))
        .min_by(|a, b| a.total_cmp(b));

    if let Some(landmarks) = face.landmarks {
        if face.bbox.height > 0.0 {
            let lip_gap = (landmarks.lower_lip.y - landmarks.upper_lip.y).abs();
            signal.mouth_open_ratio = Some(lip_gap / face.bbox.height);
        }

        let left = landmarks.left_eye.center();
        let right = landmarks.right_eye.center();
        let dl = (left.x - landmarks.nose_tip.x).abs();
        let dr = (right.x - landmarks.nose_tip.x).abs();
        if dl + dr > 0.0 {
            signal.eye_asymmetry_ratio = Some((dl - dr).abs() / (dl + dr));
        }

        signal.eyes_open_left = eye_aspect_ratio(&landmarks.left_eye).map(EyeOpenness::Ratio);
        signal.eyes_open_right = eye_aspect_ratio(&landmarks.right_eye).map(EyeOpenness::Ratio);
    }

    // Degenerate or missing landmarks fall back to provider likelihoods.
    if signal.eyes_open_left.is_none() {
        signal.eyes_open_left = face.left_eye_open_probability.map(categorize);
    }
    if signal.eyes_open_right.is_none() {
        signal.eyes_open_right = face.right_eye_open_probability.map(categorize);
    }

    signal.mouth_open = match signal.mouth_open_ratio {
        Some(ratio) => ratio > thresholds.mouth_open_ratio,
        None => face
            .mouth_open_probability
            .map(|p| p >= OPEN_PROBABILITY_CUTOFF)
            .unwrap_or(false),
    };

    signal
}

/// Vertical eyelid distance divided by eye width
pub fn eye_aspect_ratio(eye: &EyeLandmarks) -> Option<f64> {
    let width = eye.outer.distance(&eye.inner);
    if width <= f64::EPSILON {
        return None;
    }
    Some(eye.upper.distance(&eye.lower) / width)
}

fn primary_face(faces: &[FaceDetection]) -> Option<&FaceDetection> {
    faces
        .iter()
        .max_by(|a, b| a.bbox.area().total_cmp(&b.bbox.area()))
}

fn categorize(probability: f64) -> EyeOpenness {
    if probability < OPEN_PROBABILITY_CUTOFF {
        EyeOpenness::Closed
    } else {
        EyeOpenness::Open
    }
}
