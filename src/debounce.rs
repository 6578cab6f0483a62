//! Signal debouncing
//!
//! A `SignalDebouncer` turns a noisy per-frame predicate into stable
//! open/close event transitions using two dwell times:
//!
//! - `T_on`: the predicate must hold continuously this long before an event opens
//! - `T_off`: the predicate must stay false this long before the event closes
//!
//! An opened event is backdated to the first frame of the qualifying run and a
//! closed event ends at the first frame of the qualifying off-run, so event
//! durations measure the condition itself rather than the confirmation delay.

use crate::config::{DebounceConfig, DwellTimes};
use crate::types::{ViolationEvent, ViolationKind};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Hysteresis state of one debounced kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Closed,
    /// Predicate holds but `T_on` has not elapsed yet
    Opening { since: DateTime<Utc> },
    Open { since: DateTime<Utc> },
    /// Predicate released but `T_off` has not elapsed yet
    Closing {
        open_since: DateTime<Utc>,
        off_since: DateTime<Utc>,
    },
}

/// Event transition produced by a debouncer or the environment monitor
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// A new ongoing event
    Opened(ViolationEvent),
    /// A finished event
    Closed(ViolationEvent),
}

impl Transition {
    pub fn event(&self) -> &ViolationEvent {
        match self {
            Transition::Opened(event) | Transition::Closed(event) => event,
        }
    }
}

/// Hysteresis filter for one violation kind
#[derive(Debug, Clone)]
pub struct SignalDebouncer {
    kind: ViolationKind,
    dwell: DwellTimes,
    state: DebounceState,
    last_at: Option<DateTime<Utc>>,
}

impl SignalDebouncer {
    pub fn new(kind: ViolationKind, dwell: DwellTimes) -> Self {
        Self {
            kind,
            dwell,
            state: DebounceState::Closed,
            last_at: None,
        }
    }

    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Whether an event is currently open (including a pending close)
    pub fn is_ongoing(&self) -> bool {
        matches!(
            self.state,
            DebounceState::Open { .. } | DebounceState::Closing { .. }
        )
    }

    /// Feed one predicate sample. Samples older than the previous one are ignored.
    pub fn ingest(&mut self, value: bool, at: DateTime<Utc>) -> Option<Transition> {
        if let Some(last) = self.last_at {
            if at < last {
                debug!(kind = self.kind.as_str(), "ignoring out-of-order sample");
                return None;
            }
        }
        self.last_at = Some(at);

        let (next, transition) = match (self.state, value) {
            (DebounceState::Closed, false) => (DebounceState::Closed, None),
            (DebounceState::Closed, true) => self.try_open(at, at),
            (DebounceState::Opening { since }, true) => self.try_open(since, at),
            (DebounceState::Opening { .. }, false) => (DebounceState::Closed, None),
            (DebounceState::Open { since }, true) => (DebounceState::Open { since }, None),
            (DebounceState::Open { since }, false) => self.try_close(since, at, at),
            (DebounceState::Closing { open_since, .. }, true) => {
                (DebounceState::Open { since: open_since }, None)
            }
            (
                DebounceState::Closing {
                    open_since,
                    off_since,
                },
                false,
            ) => self.try_close(open_since, off_since, at),
        };

        self.state = next;
        if let Some(transition) = &transition {
            debug!(
                kind = self.kind.as_str(),
                opened = matches!(transition, Transition::Opened(_)),
                start = %transition.event().start_time,
                "debounced transition"
            );
        }
        transition
    }

    /// Force-close an open event, e.g. when the session is submitted.
    ///
    /// A pending close ends at the moment the predicate released; an event
    /// that never released ends at `at`. A pending open is discarded.
    pub fn close_at(&mut self, at: DateTime<Utc>) -> Option<ViolationEvent> {
        let event = match self.state {
            DebounceState::Open { since } => {
                Some(ViolationEvent::closed(self.kind, since, at.max(since)))
            }
            DebounceState::Closing {
                open_since,
                off_since,
            } => Some(ViolationEvent::closed(self.kind, open_since, off_since)),
            DebounceState::Closed | DebounceState::Opening { .. } => None,
        };
        self.state = DebounceState::Closed;
        event
    }

    fn try_open(
        &self,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> (DebounceState, Option<Transition>) {
        if at - since >= self.dwell.t_on() {
            (
                DebounceState::Open { since },
                Some(Transition::Opened(ViolationEvent::ongoing(self.kind, since))),
            )
        } else {
            (DebounceState::Opening { since }, None)
        }
    }

    fn try_close(
        &self,
        open_since: DateTime<Utc>,
        off_since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> (DebounceState, Option<Transition>) {
        if at - off_since >= self.dwell.t_off() {
            (
                DebounceState::Closed,
                Some(Transition::Closed(ViolationEvent::closed(
                    self.kind, open_since, off_since,
                ))),
            )
        } else {
            (
                DebounceState::Closing {
                    open_since,
                    off_since,
                },
                None,
            )
        }
    }
}

/// One debouncer per frame-derived violation kind
#[derive(Debug, Clone)]
pub struct DebouncerBank {
    debouncers: Vec<SignalDebouncer>,
}

impl DebouncerBank {
    pub fn new(config: &DebounceConfig) -> Self {
        let debouncers = ViolationKind::FRAME_KINDS
            .iter()
            .map(|&kind| SignalDebouncer::new(kind, config.dwell_for(kind)))
            .collect();
        Self { debouncers }
    }

    /// Feed one frame's predicate values, returning transitions in kind order
    pub fn ingest(
        &mut self,
        predicates: &[(ViolationKind, bool)],
        at: DateTime<Utc>,
    ) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for &(kind, value) in predicates {
            if let Some(debouncer) = self.debouncers.iter_mut().find(|d| d.kind() == kind) {
                if let Some(transition) = debouncer.ingest(value, at) {
                    transitions.push(transition);
                }
            }
        }
        transitions
    }

    /// Force-close every open event
    pub fn close_all(&mut self, at: DateTime<Utc>) -> Vec<ViolationEvent> {
        self.debouncers
            .iter_mut()
            .filter_map(|d| d.close_at(at))
            .collect()
    }

    /// Kinds with an open event
    pub fn ongoing(&self) -> Vec<ViolationKind> {
        self.debouncers
            .iter()
            .filter(|d| d.is_ongoing())
            .map(|d| d.kind())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    fn at_ms(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn debouncer(on_ms: i64, off_ms: i64) -> SignalDebouncer {
        SignalDebouncer::new(ViolationKind::NoFace, DwellTimes::new(on_ms, off_ms))
    }

    #[test]
    fn test_opens_after_dwell_backdated_to_first_frame() {
        let mut d = debouncer(1_000, 1_000);
        assert_eq!(d.ingest(true, at_ms(0)), None);
        assert_eq!(d.ingest(true, at_ms(500)), None);
        assert_eq!(d.state(), DebounceState::Opening { since: at_ms(0) });

        let opened = d.ingest(true, at_ms(1_000)).unwrap();
        assert_eq!(
            opened,
            Transition::Opened(ViolationEvent::ongoing(ViolationKind::NoFace, at_ms(0)))
        );
        assert!(d.is_ongoing());
    }

    #[test]
    fn test_flicker_shorter_than_t_on_never_opens() {
        let mut d = debouncer(1_000, 1_000);
        // Alternate every 400 ms for ten seconds
        for i in 0..25 {
            let value = i % 2 == 0;
            assert_eq!(d.ingest(value, at_ms(i * 400)), None);
        }
        assert!(!d.is_ongoing());
        assert_eq!(d.close_at(at_ms(10_000)), None);
    }

    #[test]
    fn test_noise_bursts_under_t_on_never_emit() {
        let mut d = debouncer(1_500, 500);
        // Bursts of three true frames (1 s) separated by one false frame
        let mut t = 0;
        for _ in 0..10 {
            for _ in 0..3 {
                assert_eq!(d.ingest(true, at_ms(t)), None);
                t += 500;
            }
            assert_eq!(d.ingest(false, at_ms(t)), None);
            t += 500;
        }
    }

    #[test]
    fn test_closes_after_t_off_ending_at_release() {
        let mut d = debouncer(0, 1_000);
        assert!(matches!(d.ingest(true, at_ms(0)), Some(Transition::Opened(_))));
        assert_eq!(d.ingest(false, at_ms(2_000)), None);
        assert_eq!(
            d.state(),
            DebounceState::Closing {
                open_since: at_ms(0),
                off_since: at_ms(2_000)
            }
        );

        let closed = d.ingest(false, at_ms(3_000)).unwrap();
        assert_eq!(
            closed,
            Transition::Closed(ViolationEvent::closed(
                ViolationKind::NoFace,
                at_ms(0),
                at_ms(2_000)
            ))
        );
        assert!(!d.is_ongoing());
    }

    #[test]
    fn test_short_release_keeps_event_open() {
        let mut d = debouncer(0, 1_000);
        d.ingest(true, at_ms(0));
        assert_eq!(d.ingest(false, at_ms(100)), None);
        assert_eq!(d.ingest(true, at_ms(600)), None);
        assert_eq!(d.state(), DebounceState::Open { since: at_ms(0) });
        assert_eq!(d.ingest(false, at_ms(1_000)), None);
        assert!(d.is_ongoing());
    }

    #[test]
    fn test_zero_t_off_closes_immediately() {
        let mut d = debouncer(0, 0);
        d.ingest(true, at_ms(0));
        let closed = d.ingest(false, at_ms(250)).unwrap();
        assert_eq!(closed.event().end_time, Some(at_ms(250)));
    }

    #[test]
    fn test_close_at_submit_for_never_released_event() {
        let mut d = debouncer(500, 500);
        d.ingest(true, at_ms(0));
        d.ingest(true, at_ms(600));
        let event = d.close_at(at_ms(5_000)).unwrap();
        assert_eq!(event.start_time, at_ms(0));
        assert_eq!(event.end_time, Some(at_ms(5_000)));
        assert_eq!(d.state(), DebounceState::Closed);
    }

    #[test]
    fn test_close_at_uses_pending_release_time() {
        let mut d = debouncer(0, 2_000);
        d.ingest(true, at_ms(0));
        d.ingest(false, at_ms(1_000));
        let event = d.close_at(at_ms(1_500)).unwrap();
        assert_eq!(event.end_time, Some(at_ms(1_000)));
    }

    #[test]
    fn test_close_at_discards_pending_open() {
        let mut d = debouncer(1_000, 0);
        d.ingest(true, at_ms(0));
        assert_eq!(d.close_at(at_ms(500)), None);
    }

    #[test]
    fn test_out_of_order_samples_ignored() {
        let mut d = debouncer(0, 0);
        d.ingest(true, at_ms(1_000));
        assert_eq!(d.ingest(false, at_ms(500)), None);
        assert!(d.is_ongoing());
    }

    #[test]
    fn test_bank_routes_by_kind() {
        let mut bank = DebouncerBank::new(&DebounceConfig::uniform(0, 0));
        let frame = [
            (ViolationKind::NoFace, false),
            (ViolationKind::MultiFace, true),
            (ViolationKind::MouthOpen, false),
            (ViolationKind::HeadTurned, true),
            (ViolationKind::EyesClosed, false),
            (ViolationKind::DeviceDetected, false),
        ];

        let transitions = bank.ingest(&frame, at_ms(0));
        let kinds: Vec<ViolationKind> = transitions.iter().map(|t| t.event().kind).collect();
        assert_eq!(kinds, vec![ViolationKind::MultiFace, ViolationKind::HeadTurned]);
        assert_eq!(bank.ongoing(), kinds);

        let closed = bank.close_all(at_ms(2_000));
        assert_eq!(closed.len(), 2);
        assert!(bank.ongoing().is_empty());
    }
}
