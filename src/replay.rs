//! Session replay
//!
//! Drives a [`SessionController`] from a recorded session log, one JSON
//! record per line:
//!
//! ```text
//! {"type":"start","at":"2024-03-01T09:00:00Z"}
//! {"type":"signal","timestamp":"2024-03-01T09:00:06Z","face_count":1}
//! {"type":"focus_loss","at":"2024-03-01T09:01:10Z"}
//! {"type":"answer","at":"2024-03-01T09:02:00Z","question_id":"q1","selected_index":2}
//! {"type":"submit","at":"2024-03-01T09:10:00Z"}
//! ```
//!
//! Timestamps come from the records, never from the wall clock, so a replay
//! always produces the same report. A record past the session deadline fires
//! the timer at the deadline before it is applied.

use crate::error::ProctorError;
use crate::perception::{extract_signal, FrameAnalysis};
use crate::session::SessionController;
use crate::types::{PerceptionSignal, Phase, Report};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tracing::{debug, info, warn};

/// One line of a session log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionRecord {
    Start {
        at: DateTime<Utc>,
    },
    /// Pre-extracted perception signal
    Signal(PerceptionSignal),
    /// Raw provider output, converted with the session's thresholds
    Frame {
        at: DateTime<Utc>,
        analysis: FrameAnalysis,
    },
    DroppedFrame {
        at: DateTime<Utc>,
    },
    FocusLoss {
        at: DateTime<Utc>,
    },
    FocusGain {
        at: DateTime<Utc>,
    },
    Answer {
        at: DateTime<Utc>,
        question_id: String,
        #[serde(default)]
        selected_index: Option<usize>,
    },
    Submit {
        at: DateTime<Utc>,
    },
    TimerExpired {
        at: DateTime<Utc>,
    },
}

impl SessionRecord {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionRecord::Signal(signal) => signal.timestamp,
            SessionRecord::Start { at }
            | SessionRecord::Frame { at, .. }
            | SessionRecord::DroppedFrame { at }
            | SessionRecord::FocusLoss { at }
            | SessionRecord::FocusGain { at }
            | SessionRecord::Answer { at, .. }
            | SessionRecord::Submit { at }
            | SessionRecord::TimerExpired { at } => *at,
        }
    }
}

/// Replay behaviour
#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayOptions {
    /// Submit at the last record's timestamp when the log ends mid-session.
    /// Without it, a log that never submits is an error.
    pub submit_at_end: bool,
}

/// Parse a session log. Blank lines and lines starting with `#` are skipped.
pub fn parse_records<R: BufRead>(reader: R) -> Result<Vec<SessionRecord>, ProctorError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let record = serde_json::from_str(trimmed).map_err(|e| {
            ProctorError::ParseError(format!("line {}: {}", index + 1, e))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Apply parsed records to a controller and return its report
pub fn replay_records(
    controller: &SessionController,
    records: &[SessionRecord],
    options: ReplayOptions,
) -> Result<Report, ProctorError> {
    let mut last_at = None;

    for record in records {
        let at = record.timestamp();
        enforce_deadline(controller, at)?;
        apply(controller, record)?;
        last_at = Some(at);
    }

    if controller.phase() == Phase::Monitoring {
        match (options.submit_at_end, last_at) {
            (true, Some(at)) => {
                info!(at = %at, "session log ended mid-session, submitting");
                controller.submit_at(at)?;
            }
            _ => {
                return Err(ProctorError::ParseError(
                    "session log ends before submission".to_string(),
                ))
            }
        }
    }

    controller.generate_report()
}

/// Parse and replay a session log
pub fn replay<R: BufRead>(
    controller: &SessionController,
    reader: R,
    options: ReplayOptions,
) -> Result<Report, ProctorError> {
    let records = parse_records(reader)?;
    debug!(records = records.len(), "replaying session log");
    replay_records(controller, &records, options)
}

fn enforce_deadline(controller: &SessionController, at: DateTime<Utc>) -> Result<(), ProctorError> {
    if controller.phase() != Phase::Monitoring {
        return Ok(());
    }
    if let Some(deadline) = controller.deadline() {
        if at > deadline && controller.timer_expired_at(deadline)? {
            info!(deadline = %deadline, "session deadline passed during replay");
        }
    }
    Ok(())
}

fn apply(controller: &SessionController, record: &SessionRecord) -> Result<(), ProctorError> {
    match record {
        SessionRecord::Start { at } => controller.start_at(*at),
        SessionRecord::Signal(signal) => controller.ingest_signal(signal),
        SessionRecord::Frame { at, analysis } => {
            let signal = extract_signal(analysis, *at, &controller.config().thresholds);
            controller.ingest_signal(&signal)
        }
        SessionRecord::DroppedFrame { at } => {
            controller.record_dropped_frame_at(*at);
            Ok(())
        }
        SessionRecord::FocusLoss { at } => controller.ingest_focus_loss_at(*at),
        SessionRecord::FocusGain { at } => controller.ingest_focus_gain_at(*at),
        SessionRecord::Answer {
            question_id,
            selected_index,
            ..
        } => {
            if controller.phase() != Phase::Monitoring {
                warn!(question_id = %question_id, "answer after submission ignored");
                return Ok(());
            }
            controller.answer(question_id, *selected_index)
        }
        SessionRecord::Submit { at } => controller.submit_at(*at).map(|_| ()),
        SessionRecord::TimerExpired { at } => controller.timer_expired_at(*at).map(|_| ()),
    }
}
