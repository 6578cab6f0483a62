//! Environment monitor
//!
//! Records focus-loss notifications pushed by the host UI as `TabSwitch`
//! events. Notifications are edges, not polled samples, so nothing is
//! debounced; duplicates delivered inside the coalescing window merge into the
//! event already recorded. A focus-regained notification closes the event so
//! it carries a real duration.

use crate::config::EnvironmentConfig;
use crate::debounce::Transition;
use crate::types::{ViolationEvent, ViolationKind};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EnvironmentMonitor {
    coalesce_window: Duration,
    last_loss_at: Option<DateTime<Utc>>,
    lost_since: Option<DateTime<Utc>>,
    switch_count: u32,
}

impl EnvironmentMonitor {
    pub fn new(config: &EnvironmentConfig) -> Self {
        Self {
            coalesce_window: config.coalesce_window(),
            last_loss_at: None,
            lost_since: None,
            switch_count: 0,
        }
    }

    /// Number of accepted focus-loss edges
    pub fn switch_count(&self) -> u32 {
        self.switch_count
    }

    /// Whether focus is currently lost
    pub fn is_focus_lost(&self) -> bool {
        self.lost_since.is_some()
    }

    /// Handle a focus-loss notification.
    ///
    /// Returns no transitions for a coalesced duplicate. A loss that arrives
    /// while focus is already lost (the host never reported the regain) first
    /// closes the previous event.
    pub fn focus_lost(&mut self, at: DateTime<Utc>) -> Vec<Transition> {
        // Only a repeat of the current loss is a duplicate; a loss after a
        // regain is a new edge however close it follows.
        if let (Some(last), Some(_)) = (self.last_loss_at, self.lost_since) {
            if at - last < self.coalesce_window {
                debug!(
                    since_last_ms = (at - last).num_milliseconds(),
                    "coalesced duplicate focus-loss notification"
                );
                return Vec::new();
            }
        }

        let mut transitions = Vec::with_capacity(2);
        if let Some(since) = self.lost_since.take() {
            transitions.push(Transition::Closed(ViolationEvent::closed(
                ViolationKind::TabSwitch,
                since,
                at,
            )));
        }

        self.last_loss_at = Some(at);
        self.lost_since = Some(at);
        self.switch_count += 1;
        transitions.push(Transition::Opened(ViolationEvent::ongoing(
            ViolationKind::TabSwitch,
            at,
        )));
        transitions
    }

    /// Handle a focus-regained notification
    pub fn focus_gained(&mut self, at: DateTime<Utc>) -> Option<Transition> {
        let since = self.lost_since.take()?;
        Some(Transition::Closed(ViolationEvent::closed(
            ViolationKind::TabSwitch,
            since,
            at.max(since),
        )))
    }

    /// Close a still-open event at submission
    pub fn close_at(&mut self, at: DateTime<Utc>) -> Option<ViolationEvent> {
        let since = self.lost_since.take()?;
        Some(ViolationEvent::closed(ViolationKind::TabSwitch, since, at.max(since)))
    }
}

impl Default for EnvironmentMonitor {
    fn default() -> Self {
        Self::new(&EnvironmentConfig::default())
    }
}
