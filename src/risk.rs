//! Integrity risk scoring
//!
//! Maps session aggregates to a numeric score and a coarse risk level. The
//! scorer is a pure function so it can be exercised without a live session.

use crate::types::{RiskAssessment, RiskLevel};

/// Face visibility (percent) below which visibility starts to cost points
const VISIBILITY_FLOOR_PCT: f64 = 90.0;

/// Points per percentage point of visibility under the floor
const VISIBILITY_WEIGHT: f64 = 0.5;

/// Points per multi-face event
const MULTI_FACE_WEIGHT: f64 = 20.0;

/// Points per tab switch
const TAB_SWITCH_WEIGHT: f64 = 10.0;

/// Scores below this are `Low`
pub const MEDIUM_RISK_THRESHOLD: f64 = 20.0;

/// Scores below this (and at least `MEDIUM_RISK_THRESHOLD`) are `Medium`
pub const HIGH_RISK_THRESHOLD: f64 = 50.0;

/// Risk scorer
pub struct RiskScorer;

impl RiskScorer {
    /// Score a session
    ///
    /// Formula:
    /// ```text
    /// penalty = max(0, 90 - face_visibility_pct) * 0.5
    ///         + multi_face_events * 20
    ///         + tab_switch_count * 10
    /// score   = min(100, penalty / max(duration_minutes, 1))
    /// ```
    pub fn score(
        face_visibility_pct: f64,
        multi_face_events: u32,
        tab_switch_count: u32,
        duration_minutes: f64,
    ) -> RiskAssessment {
        let penalty = (VISIBILITY_FLOOR_PCT - face_visibility_pct).max(0.0) * VISIBILITY_WEIGHT
            + multi_face_events as f64 * MULTI_FACE_WEIGHT
            + tab_switch_count as f64 * TAB_SWITCH_WEIGHT;

        // f64::max ignores NaN, so a NaN duration falls back to one minute
        let score = (penalty / duration_minutes.max(1.0)).min(100.0);

        RiskAssessment {
            score,
            level: Self::level(score),
        }
    }

    /// Risk level for a numeric score
    pub fn level(score: f64) -> RiskLevel {
        if score < MEDIUM_RISK_THRESHOLD {
            RiskLevel::Low
        } else if score < HIGH_RISK_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}
