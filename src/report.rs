//! Report assembly
//!
//! Turns the final session aggregates into the immutable [`Report`]. The
//! builder reads the ledger, runs the risk scorer and copies the quiz result;
//! it never mutates session state.

use crate::error::ProctorError;
use crate::ledger::ViolationLedger;
use crate::risk::RiskScorer;
use crate::types::{
    QuestionSource, QuizResult, Report, ReportProducer, SubmissionTrigger, ViolationKind,
};
use crate::{PROCTOR_VERSION, PRODUCER_NAME};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything the builder needs from a finished session
#[derive(Debug, Clone, Copy)]
pub struct SessionSummary<'a> {
    pub session_id: &'a str,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub submission_trigger: SubmissionTrigger,
    pub ledger: &'a ViolationLedger,
    pub tab_switch_count: u32,
    pub frame_count: u64,
    pub face_present_frame_count: u64,
    pub dropped_frame_count: u64,
    pub quiz: QuizResult,
    pub question_source: QuestionSource,
}

impl SessionSummary<'_> {
    /// Session length in seconds, never negative
    pub fn duration_seconds(&self) -> f64 {
        ((self.submitted_at - self.started_at).num_milliseconds() as f64 / 1000.0).max(0.0)
    }
}

/// Report builder
pub struct ReportBuilder {
    instance_id: String,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportBuilder {
    /// Create a builder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create a builder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Assemble the report for a finished session
    pub fn build(&self, summary: &SessionSummary<'_>) -> Report {
        let duration_seconds = summary.duration_seconds();
        let face_visibility_pct = summary
            .ledger
            .face_visibility_pct(duration_seconds, summary.submitted_at);
        let violation_counts = summary.ledger.counts();
        let multi_face_events = violation_counts
            .get(&ViolationKind::MultiFace)
            .copied()
            .unwrap_or(0);

        let risk = RiskScorer::score(
            face_visibility_pct,
            multi_face_events,
            summary.tab_switch_count,
            duration_seconds / 60.0,
        );

        Report {
            producer: ReportProducer {
                name: PRODUCER_NAME.to_string(),
                version: PROCTOR_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            session_id: summary.session_id.to_string(),
            started_at: summary.started_at,
            submitted_at: summary.submitted_at,
            submission_trigger: summary.submission_trigger,
            duration_seconds,
            face_visibility_pct,
            violation_counts,
            tab_switch_count: summary.tab_switch_count,
            risk_score: risk.score,
            risk_level: risk.level,
            quiz_score: summary.quiz.correct,
            quiz_total: summary.quiz.total,
            question_source: summary.question_source,
            frame_count: summary.frame_count,
            face_present_frame_count: summary.face_present_frame_count,
            dropped_frame_count: summary.dropped_frame_count,
            events: summary.ledger.events().to_vec(),
        }
    }

    /// Build and serialize to pretty JSON
    pub fn build_to_json(&self, summary: &SessionSummary<'_>) -> Result<String, ProctorError> {
        let report = self.build(summary);
        serde_json::to_string_pretty(&report).map_err(ProctorError::JsonError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RiskLevel, ViolationEvent};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn summary<'a>(ledger: &'a ViolationLedger, minutes: i64, tabs: u32) -> SessionSummary<'a> {
        SessionSummary {
            session_id: "session-1",
            started_at: t0(),
            submitted_at: t0() + Duration::minutes(minutes),
            submission_trigger: SubmissionTrigger::Manual,
            ledger,
            tab_switch_count: tabs,
            frame_count: 100,
            face_present_frame_count: 100,
            dropped_frame_count: 0,
            quiz: QuizResult { correct: 2, total: 5 },
            question_source: QuestionSource::Fallback,
        }
    }

    #[test]
    fn test_clean_session_report() {
        let ledger = ViolationLedger::new();
        let builder = ReportBuilder::with_instance_id("test-instance".to_string());
        let report = builder.build(&summary(&ledger, 10, 0));

        assert_eq!(report.duration_seconds, 600.0);
        assert_eq!(report.face_visibility_pct, 100.0);
        assert_eq!(report.risk_level, RiskLevel::Low);
        assert_eq!(report.quiz_score, 2);
        assert_eq!(report.quiz_total, 5);
        assert_eq!(report.producer.instance_id, "test-instance");
        assert_eq!(report.producer.name, PRODUCER_NAME);
        assert!(report.violation_counts.values().all(|&c| c == 0));
    }

    #[test]
    fn test_multi_face_events_feed_risk() {
        let mut ledger = ViolationLedger::new();
        ledger
            .record(ViolationEvent::closed(
                ViolationKind::MultiFace,
                t0() + Duration::seconds(10),
                t0() + Duration::seconds(20),
            ))
            .unwrap();
        ledger
            .record(ViolationEvent::closed(
                ViolationKind::MultiFace,
                t0() + Duration::seconds(40),
                t0() + Duration::seconds(50),
            ))
            .unwrap();

        let report = ReportBuilder::new().build(&summary(&ledger, 1, 1));
        // 2 * 20 + 1 * 10 over one minute
        assert_eq!(report.risk_score, 50.0);
        assert_eq!(report.risk_level, RiskLevel::High);
        assert_eq!(report.violation_counts[&ViolationKind::MultiFace], 2);
        assert_eq!(report.events.len(), 2);
    }

    #[test]
    fn test_report_json_shape() {
        let ledger = ViolationLedger::new();
        let json = ReportBuilder::new()
            .build_to_json(&summary(&ledger, 5, 6))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["session_id"], "session-1");
        assert_eq!(value["submission_trigger"], "manual");
        assert_eq!(value["risk_level"], "Low");
        assert_eq!(value["risk_score"], 12.0);
        assert_eq!(value["question_source"], "fallback");
        assert_eq!(value["violation_counts"]["tab_switch"], 0);
    }
}
