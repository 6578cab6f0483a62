//! Session controller
//!
//! Owns one proctoring session: the phase machine, the debouncers, the
//! environment monitor, the ledger and the quiz. Every mutation goes through
//! a single mutex so the capture loop, the timer and the host UI can all call
//! in from their own threads.
//!
//! ```text
//! Setup --start--> Monitoring --submit | timer_expired--> Submitted --generate_report--> Reported
//! ```
//!
//! Each event has an `_at` variant taking an explicit timestamp; the plain
//! variant uses the wall clock. Replays and tests drive the `_at` variants.

pub mod monitor;

pub use monitor::MonitorHandle;

use crate::config::ProctorConfig;
use crate::debounce::{DebouncerBank, Transition};
use crate::environment::EnvironmentMonitor;
use crate::error::ProctorError;
use crate::ledger::ViolationLedger;
use crate::predicates::ViolationPredicates;
use crate::quiz::{QuestionSet, QuizEngine};
use crate::report::{ReportBuilder, SessionSummary};
use crate::types::{
    LiveMetrics, PerceptionSignal, Phase, QuizAnswer, QuizQuestion, Report, SubmissionTrigger,
    ViolationKind,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Observable state of a session
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub phase: Phase,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_limit: Duration,
    pub submitted_at: Option<DateTime<Utc>>,
    pub submission_trigger: Option<SubmissionTrigger>,
    pub ledger: ViolationLedger,
    pub frame_count: u64,
    pub face_present_frame_count: u64,
    pub dropped_frame_count: u64,
    pub tab_switch_count: u32,
    pub last_signal_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn new(duration_limit: Duration) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            phase: Phase::Setup,
            start_time: None,
            duration_limit,
            submitted_at: None,
            submission_trigger: None,
            ledger: ViolationLedger::new(),
            frame_count: 0,
            face_present_frame_count: 0,
            dropped_frame_count: 0,
            tab_switch_count: 0,
            last_signal_at: None,
        }
    }

    /// Instant at which the session expires, once started
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.start_time.map(|start| start + self.duration_limit)
    }
}

struct SessionInner {
    state: SessionState,
    debouncers: DebouncerBank,
    environment: EnvironmentMonitor,
    quiz: QuizEngine,
    report: Option<Report>,
}

impl SessionInner {
    fn apply(&mut self, transitions: Vec<Transition>) -> Result<(), ProctorError> {
        for transition in transitions {
            match transition {
                Transition::Opened(event) => {
                    info!(
                        session_id = %self.state.session_id,
                        kind = event.kind.as_str(),
                        start = %event.start_time,
                        "violation opened"
                    );
                    self.state.ledger.record(event)?;
                }
                Transition::Closed(event) => {
                    let end = event.end_time.unwrap_or(event.start_time);
                    if let Some(closed) = self.state.ledger.close(event.kind, end) {
                        info!(
                            session_id = %self.state.session_id,
                            kind = closed.kind.as_str(),
                            duration_secs = closed.duration_secs(end),
                            "violation closed"
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn enter_submitted(&mut self, at: DateTime<Utc>, trigger: SubmissionTrigger) -> Result<(), ProctorError> {
        let start = self.state.start_time.unwrap_or(at);
        let deadline = start + self.state.duration_limit;
        let submitted_at = at.min(deadline).max(start);

        let mut closing: Vec<Transition> = self
            .debouncers
            .close_all(submitted_at)
            .into_iter()
            .map(Transition::Closed)
            .collect();
        if let Some(event) = self.environment.close_at(submitted_at) {
            closing.push(Transition::Closed(event));
        }

        self.state.phase = Phase::Submitted;
        self.state.submitted_at = Some(submitted_at);
        self.state.submission_trigger = Some(trigger);
        self.apply(closing)?;

        info!(
            session_id = %self.state.session_id,
            trigger = ?trigger,
            submitted_at = %submitted_at,
            "session submitted"
        );
        Ok(())
    }
}

/// Thread-safe controller for one proctoring session
pub struct SessionController {
    config: ProctorConfig,
    predicates: ViolationPredicates,
    report_builder: ReportBuilder,
    inner: Mutex<SessionInner>,
}

impl SessionController {
    /// Create a session in the Setup phase
    pub fn new(config: ProctorConfig, quiz: QuizEngine) -> Result<Self, ProctorError> {
        config.validate()?;
        let state = SessionState::new(config.session.duration_limit());
        let inner = SessionInner {
            state,
            debouncers: DebouncerBank::new(&config.debounce),
            environment: EnvironmentMonitor::new(&config.environment),
            quiz,
            report: None,
        };
        Ok(Self {
            predicates: ViolationPredicates::new(config.thresholds.clone()),
            report_builder: ReportBuilder::new(),
            config,
            inner: Mutex::new(inner),
        })
    }

    /// Create a session over a loaded question set
    pub fn with_question_set(config: ProctorConfig, set: QuestionSet) -> Result<Self, ProctorError> {
        Self::new(config, QuizEngine::from_set(set)?)
    }

    /// Default configuration with the embedded fallback questions
    pub fn with_defaults() -> Result<Self, ProctorError> {
        Self::with_question_set(ProctorConfig::default(), QuestionSet::fallback())
    }

    /// Replace the report builder, e.g. to pin the producer instance ID
    pub fn with_report_builder(mut self, report_builder: ReportBuilder) -> Self {
        self.report_builder = report_builder;
        self
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &ProctorConfig {
        &self.config
    }

    pub fn session_id(&self) -> String {
        self.lock().state.session_id.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().state.phase
    }

    /// Copy of the current session state
    pub fn state(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().state.deadline()
    }

    pub fn questions(&self) -> Vec<QuizQuestion> {
        self.lock().quiz.questions().to_vec()
    }

    pub fn recorded_answers(&self) -> Vec<QuizAnswer> {
        self.lock().quiz.recorded_answers()
    }

    pub fn start(&self) -> Result<(), ProctorError> {
        self.start_at(Utc::now())
    }

    /// Begin monitoring. Valid only from Setup.
    pub fn start_at(&self, at: DateTime<Utc>) -> Result<(), ProctorError> {
        let mut inner = self.lock();
        if inner.state.phase != Phase::Setup {
            return Err(ProctorError::InvalidPhase {
                operation: "start",
                phase: inner.state.phase,
            });
        }
        inner.state.phase = Phase::Monitoring;
        inner.state.start_time = Some(at);
        info!(
            session_id = %inner.state.session_id,
            started_at = %at,
            duration_limit_secs = inner.state.duration_limit.num_seconds(),
            "session started"
        );
        Ok(())
    }

    /// Feed one analyzed frame.
    ///
    /// Frames outside Monitoring, before the start, past the deadline or
    /// older than the previous frame are dropped without effect.
    pub fn ingest_signal(&self, signal: &PerceptionSignal) -> Result<(), ProctorError> {
        let at = signal.timestamp;
        let mut inner = self.lock();
        let state = &inner.state;

        if state.phase != Phase::Monitoring {
            debug!(phase = ?state.phase, "dropping signal outside monitoring");
            return Ok(());
        }
        let (Some(start), Some(deadline)) = (state.start_time, state.deadline()) else {
            return Ok(());
        };
        if at < start || at > deadline {
            debug!(timestamp = %at, "dropping signal outside session window");
            return Ok(());
        }
        if state.last_signal_at.is_some_and(|last| at < last) {
            debug!(timestamp = %at, "dropping out-of-order signal");
            return Ok(());
        }

        inner.state.last_signal_at = Some(at);
        inner.state.frame_count += 1;
        if signal.face_count > 0 {
            inner.state.face_present_frame_count += 1;
        }

        let values = self.predicates.evaluate(signal);
        let transitions = inner.debouncers.ingest(&values, at);
        inner.apply(transitions)
    }

    pub fn record_dropped_frame(&self) {
        self.record_dropped_frame_at(Utc::now())
    }

    /// Count a frame whose perception call failed or timed out
    pub fn record_dropped_frame_at(&self, at: DateTime<Utc>) {
        let mut inner = self.lock();
        if inner.state.phase == Phase::Monitoring {
            inner.state.dropped_frame_count += 1;
            debug!(
                timestamp = %at,
                dropped = inner.state.dropped_frame_count,
                "dropped frame"
            );
        }
    }

    pub fn ingest_focus_loss(&self) -> Result<(), ProctorError> {
        self.ingest_focus_loss_at(Utc::now())
    }

    /// Host reported that the test window lost focus
    pub fn ingest_focus_loss_at(&self, at: DateTime<Utc>) -> Result<(), ProctorError> {
        let mut inner = self.lock();
        if !Self::accepts_environment_event(&inner.state, at) {
            debug!(timestamp = %at, "dropping focus loss");
            return Ok(());
        }
        let transitions = inner.environment.focus_lost(at);
        inner.state.tab_switch_count = inner.environment.switch_count();
        inner.apply(transitions)
    }

    pub fn ingest_focus_gain(&self) -> Result<(), ProctorError> {
        self.ingest_focus_gain_at(Utc::now())
    }

    /// Host reported that the test window regained focus
    pub fn ingest_focus_gain_at(&self, at: DateTime<Utc>) -> Result<(), ProctorError> {
        let mut inner = self.lock();
        if !Self::accepts_environment_event(&inner.state, at) {
            debug!(timestamp = %at, "dropping focus gain");
            return Ok(());
        }
        match inner.environment.focus_gained(at) {
            Some(transition) => inner.apply(vec![transition]),
            None => Ok(()),
        }
    }

    fn accepts_environment_event(state: &SessionState, at: DateTime<Utc>) -> bool {
        state.phase == Phase::Monitoring
            && state.start_time.is_some_and(|start| at >= start)
            && state.deadline().is_some_and(|deadline| at <= deadline)
    }

    /// Record the candidate's answer. Valid only while monitoring.
    pub fn answer(&self, question_id: &str, selected: Option<usize>) -> Result<(), ProctorError> {
        let mut inner = self.lock();
        if inner.state.phase != Phase::Monitoring {
            return Err(ProctorError::InvalidPhase {
                operation: "answer",
                phase: inner.state.phase,
            });
        }
        inner.quiz.answer(question_id, selected)
    }

    pub fn submit(&self) -> Result<bool, ProctorError> {
        self.submit_at(Utc::now())
    }

    /// Manual submission.
    ///
    /// Returns `true` when this call moved the session to Submitted and
    /// `false` when the session was already submitted (for example by the
    /// timer).
    pub fn submit_at(&self, at: DateTime<Utc>) -> Result<bool, ProctorError> {
        let mut inner = self.lock();
        match inner.state.phase {
            Phase::Monitoring => {
                inner.enter_submitted(at, SubmissionTrigger::Manual)?;
                Ok(true)
            }
            Phase::Submitted => {
                debug!("submit after submission ignored");
                Ok(false)
            }
            phase => Err(ProctorError::InvalidPhase {
                operation: "submit",
                phase,
            }),
        }
    }

    pub fn timer_expired(&self) -> Result<bool, ProctorError> {
        self.timer_expired_at(Utc::now())
    }

    /// Timer expiry. A no-op outside Monitoring.
    pub fn timer_expired_at(&self, at: DateTime<Utc>) -> Result<bool, ProctorError> {
        let mut inner = self.lock();
        if inner.state.phase != Phase::Monitoring {
            debug!(phase = ?inner.state.phase, "timer expiry ignored");
            return Ok(false);
        }
        inner.enter_submitted(at, SubmissionTrigger::TimerExpired)?;
        Ok(true)
    }

    /// Score the quiz, run the risk scorer and freeze the report.
    ///
    /// Runs once; later calls return the frozen report.
    pub fn generate_report(&self) -> Result<Report, ProctorError> {
        let mut inner = self.lock();
        match inner.state.phase {
            Phase::Reported => {
                return inner.report.clone().ok_or(ProctorError::InvalidPhase {
                    operation: "generate_report",
                    phase: Phase::Reported,
                })
            }
            Phase::Submitted => {}
            phase => {
                return Err(ProctorError::InvalidPhase {
                    operation: "generate_report",
                    phase,
                })
            }
        }

        let quiz = match inner.quiz.result() {
            Some(result) => result,
            None => inner.quiz.submit_recorded()?,
        };

        let state = &inner.state;
        let (Some(started_at), Some(submitted_at), Some(trigger)) =
            (state.start_time, state.submitted_at, state.submission_trigger)
        else {
            warn!(session_id = %state.session_id, "submitted session is missing timestamps");
            return Err(ProctorError::InvalidPhase {
                operation: "generate_report",
                phase: state.phase,
            });
        };

        let summary = SessionSummary {
            session_id: &state.session_id,
            started_at,
            submitted_at,
            submission_trigger: trigger,
            ledger: &state.ledger,
            tab_switch_count: state.tab_switch_count,
            frame_count: state.frame_count,
            face_present_frame_count: state.face_present_frame_count,
            dropped_frame_count: state.dropped_frame_count,
            quiz,
            question_source: inner.quiz.source(),
        };
        let report = self.report_builder.build(&summary);

        info!(
            session_id = %report.session_id,
            risk_score = report.risk_score,
            risk_level = ?report.risk_level,
            quiz_score = report.quiz_score,
            quiz_total = report.quiz_total,
            "session reported"
        );

        inner.state.phase = Phase::Reported;
        inner.report = Some(report.clone());
        Ok(report)
    }

    /// The frozen report, once generated
    pub fn report(&self) -> Option<Report> {
        self.lock().report.clone()
    }

    pub fn snapshot(&self) -> LiveMetrics {
        self.snapshot_at(Utc::now())
    }

    /// Live metrics as of `at`
    pub fn snapshot_at(&self, at: DateTime<Utc>) -> LiveMetrics {
        let inner = self.lock();
        let state = &inner.state;

        let (elapsed_seconds, time_remaining_seconds) = match (state.start_time, state.deadline()) {
            (Some(start), Some(deadline)) => {
                let until = state.submitted_at.unwrap_or(at).min(deadline);
                let elapsed = (until - start).num_milliseconds().max(0) as f64 / 1000.0;
                let remaining = (deadline - until).num_milliseconds().max(0) as f64 / 1000.0;
                (elapsed, Some(remaining))
            }
            _ => (0.0, None),
        };

        LiveMetrics {
            phase: state.phase,
            elapsed_seconds,
            time_remaining_seconds,
            open_counts: state.ledger.counts(),
            ongoing: state.ledger.ongoing(),
            tab_switch_count: state.tab_switch_count,
            frame_count: state.frame_count,
        }
    }

    /// Whether a kind currently has an open event
    pub fn is_ongoing(&self, kind: ViolationKind) -> bool {
        self.lock().state.ledger.is_ongoing(kind)
    }
}
