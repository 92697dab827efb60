//! In-memory event sink.

use std::sync::Mutex;

use super::EventSink;
use crate::timer::{TimerEvent, TimerId};

/// Event sink that keeps every event it receives, in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(TimerEvent, TimerId)>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<(TimerEvent, TimerId)> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Returns the recorded event kinds for one timer.
    #[must_use]
    pub fn events_for(&self, timer_id: &TimerId) -> Vec<TimerEvent> {
        self.events()
            .into_iter()
            .filter(|(_, id)| id == timer_id)
            .map(|(event, _)| event)
            .collect()
    }

    /// Counts recorded occurrences of one event kind across all timers.
    #[must_use]
    pub fn count(&self, event: TimerEvent) -> usize {
        self.events().iter().filter(|(e, _)| *e == event).count()
    }

    /// Drops everything recorded so far.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: TimerEvent, timer_id: &TimerId) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((event, timer_id.clone()));
    }
}
