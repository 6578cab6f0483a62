//! Violation ledger
//!
//! Append-only record of violation events with aggregate queries. At most one
//! event per kind may be open at a time; closing an event only fills in its
//! end time, so event order is the order in which events were opened.

use crate::error::ProctorError;
use crate::types::{ViolationEvent, ViolationKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ViolationLedger {
    events: Vec<ViolationEvent>,
    /// Index into `events` of the open event for each kind
    open: BTreeMap<ViolationKind, usize>,
}

impl ViolationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event (finished or ongoing)
    pub fn record(&mut self, event: ViolationEvent) -> Result<(), ProctorError> {
        if self.open.contains_key(&event.kind) {
            return Err(ProctorError::OverlappingEvent(event.kind));
        }
        if let Some(last) = self.last_of(event.kind) {
            if let Some(end) = last.end_time {
                if event.start_time < end {
                    return Err(ProctorError::OverlappingEvent(event.kind));
                }
            }
        }

        if event.is_ongoing() {
            self.open.insert(event.kind, self.events.len());
        }
        self.events.push(event);
        Ok(())
    }

    /// Open a new ongoing event of `kind`
    pub fn open(&mut self, kind: ViolationKind, at: DateTime<Utc>) -> Result<(), ProctorError> {
        self.record(ViolationEvent::ongoing(kind, at))
    }

    /// Close the ongoing event of `kind`. Returns the finished event, or
    /// `None` when nothing of that kind was open.
    pub fn close(&mut self, kind: ViolationKind, at: DateTime<Utc>) -> Option<ViolationEvent> {
        let index = self.open.remove(&kind)?;
        let event = &mut self.events[index];
        event.end_time = Some(at.max(event.start_time));
        Some(event.clone())
    }

    /// Number of events of `kind` opened so far, ongoing included
    pub fn open_count(&self, kind: ViolationKind) -> u32 {
        self.events.iter().filter(|e| e.kind == kind).count() as u32
    }

    /// Whether an event of `kind` is currently open
    pub fn is_ongoing(&self, kind: ViolationKind) -> bool {
        self.open.contains_key(&kind)
    }

    /// Kinds with an open event
    pub fn ongoing(&self) -> Vec<ViolationKind> {
        self.open.keys().copied().collect()
    }

    /// Total seconds spent in events of `kind`, measuring open events up to `as_of`
    pub fn total_duration(&self, kind: ViolationKind, as_of: DateTime<Utc>) -> f64 {
        self.events
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.duration_secs(as_of))
            .sum()
    }

    /// Percentage (0-100) of `session_duration_secs` spent in events of `kind`
    pub fn percent_time(
        &self,
        kind: ViolationKind,
        session_duration_secs: f64,
        as_of: DateTime<Utc>,
    ) -> f64 {
        if session_duration_secs <= 0.0 {
            return 0.0;
        }
        let pct = self.total_duration(kind, as_of) / session_duration_secs * 100.0;
        pct.clamp(0.0, 100.0)
    }

    /// Percentage of the session during which a face was visible
    pub fn face_visibility_pct(&self, session_duration_secs: f64, as_of: DateTime<Utc>) -> f64 {
        if session_duration_secs <= 0.0 {
            return 100.0;
        }
        100.0 - self.percent_time(ViolationKind::NoFace, session_duration_secs, as_of)
    }

    /// Event counts for every kind, zero-filled
    pub fn counts(&self) -> BTreeMap<ViolationKind, u32> {
        ViolationKind::ALL
            .iter()
            .map(|&kind| (kind, self.open_count(kind)))
            .collect()
    }

    pub fn events(&self) -> &[ViolationEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn last_of(&self, kind: ViolationKind) -> Option<&ViolationEvent> {
        self.events.iter().rev().find(|e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at_secs(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    #[test]
    fn test_open_close_and_counts() {
        let mut ledger = ViolationLedger::new();
        ledger.open(ViolationKind::NoFace, at_secs(10)).unwrap();
        assert!(ledger.is_ongoing(ViolationKind::NoFace));
        assert_eq!(ledger.open_count(ViolationKind::NoFace), 1);

        let closed = ledger.close(ViolationKind::NoFace, at_secs(40)).unwrap();
        assert_eq!(closed.end_time, Some(at_secs(40)));
        assert!(!ledger.is_ongoing(ViolationKind::NoFace));
        assert_eq!(ledger.total_duration(ViolationKind::NoFace, at_secs(100)), 30.0);
    }

    #[test]
    fn test_overlapping_open_rejected() {
        let mut ledger = ViolationLedger::new();
        ledger.open(ViolationKind::MultiFace, at_secs(0)).unwrap();
        let err = ledger.open(ViolationKind::MultiFace, at_secs(5)).unwrap_err();
        assert!(matches!(err, ProctorError::OverlappingEvent(ViolationKind::MultiFace)));

        // Other kinds are independent
        ledger.open(ViolationKind::NoFace, at_secs(5)).unwrap();
    }

    #[test]
    fn test_record_before_previous_end_rejected() {
        let mut ledger = ViolationLedger::new();
        ledger
            .record(ViolationEvent::closed(ViolationKind::HeadTurned, at_secs(0), at_secs(20)))
            .unwrap();
        assert!(ledger
            .record(ViolationEvent::closed(ViolationKind::HeadTurned, at_secs(10), at_secs(30)))
            .is_err());
        assert!(ledger
            .record(ViolationEvent::closed(ViolationKind::HeadTurned, at_secs(20), at_secs(30)))
            .is_ok());
    }

    #[test]
    fn test_close_without_open_is_none() {
        let mut ledger = ViolationLedger::new();
        assert_eq!(ledger.close(ViolationKind::EyesClosed, at_secs(1)), None);
    }

    #[test]
    fn test_ongoing_event_counts_toward_duration() {
        let mut ledger = ViolationLedger::new();
        ledger.open(ViolationKind::NoFace, at_secs(60)).unwrap();
        assert_eq!(ledger.total_duration(ViolationKind::NoFace, at_secs(90)), 30.0);
        assert!((ledger.percent_time(ViolationKind::NoFace, 120.0, at_secs(90)) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_visibility_and_no_face_sum_to_100() {
        let mut ledger = ViolationLedger::new();
        ledger
            .record(ViolationEvent::closed(ViolationKind::NoFace, at_secs(0), at_secs(45)))
            .unwrap();
        ledger
            .record(ViolationEvent::closed(ViolationKind::NoFace, at_secs(100), at_secs(137)))
            .unwrap();
        ledger.open(ViolationKind::NoFace, at_secs(500)).unwrap();

        for duration in [600.0, 777.7, 1800.0] {
            let as_of = at_secs(590);
            let visible = ledger.face_visibility_pct(duration, as_of);
            let absent = ledger.percent_time(ViolationKind::NoFace, duration, as_of);
            assert!((visible + absent - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_counts_are_zero_filled() {
        let mut ledger = ViolationLedger::new();
        ledger
            .record(ViolationEvent::closed(ViolationKind::TabSwitch, at_secs(3), at_secs(3)))
            .unwrap();
        let counts = ledger.counts();
        assert_eq!(counts.len(), ViolationKind::ALL.len());
        assert_eq!(counts[&ViolationKind::TabSwitch], 1);
        assert_eq!(counts[&ViolationKind::NoFace], 0);
    }
}
