//! Countdown timer core
//!
//! A [`Timer`] owns one countdown: its `idle`/`active`/`paused` state,
//! the time arithmetic behind it, and the single pending wake-up that
//! completes it. Reconciliation of persisted state after a restart lives in
//! [`restore`].
//!
//! # Architecture
//!
//! - [`Timer`]: per-instance state machine behind a mutex
//! - [`Snapshot`]: the persisted string form of a timer's observable state
//! - [`restore`]: pure reconciliation of a snapshot against the current time
//! - [`span`]: `H:MM:SS` spans, config duration parsing, timestamp codec

pub mod entity;
pub mod restore;
pub mod snapshot;
pub mod span;

use serde::{Deserialize, Serialize};

pub use entity::{Timer, TimerView};
pub use restore::{Reconciled, RestoreOutcome};
pub use snapshot::Snapshot;

/// Stable identifier of a timer, unique within a registry.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerId(String);

impl TimerId {
    /// Creates a new `TimerId` from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Observable state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    /// Not counting; `end_at` is absent.
    #[default]
    Idle,
    /// Counting down; `end_at` is set and a wake-up is pending.
    Active,
    /// Stopped with `remaining` preserved.
    Paused,
}

impl TimerState {
    /// Returns the persisted spelling of this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }

    /// Parses a persisted state value. Anything outside the closed set
    /// yields `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "idle" => Some(Self::Idle),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events a timer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerEvent {
    /// Started from `idle`.
    #[serde(rename = "timer.started")]
    Started,
    /// Started again from `active` or `paused`.
    #[serde(rename = "timer.restarted")]
    Restarted,
    /// Paused while active.
    #[serde(rename = "timer.paused")]
    Paused,
    /// Cancelled (emitted from any state).
    #[serde(rename = "timer.cancelled")]
    Cancelled,
    /// Reached zero, or finished early on request.
    #[serde(rename = "timer.finished")]
    Finished,
}

impl TimerEvent {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Started,
        Self::Restarted,
        Self::Paused,
        Self::Cancelled,
        Self::Finished,
    ];

    /// Returns the event name as published on the event sink.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "timer.started",
            Self::Restarted => "timer.restarted",
            Self::Paused => "timer.paused",
            Self::Cancelled => "timer.cancelled",
            Self::Finished => "timer.finished",
        }
    }
}

impl std::fmt::Display for TimerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse_closed_set() {
        assert_eq!(TimerState::parse("idle"), Some(TimerState::Idle));
        assert_eq!(TimerState::parse("active"), Some(TimerState::Active));
        assert_eq!(TimerState::parse(" paused "), Some(TimerState::Paused));
        assert_eq!(TimerState::parse("unavailable"), None);
        assert_eq!(TimerState::parse("ACTIVE"), None);
        assert_eq!(TimerState::parse(""), None);
    }

    #[test]
    fn test_state_display_matches_persisted_spelling() {
        for state in [TimerState::Idle, TimerState::Active, TimerState::Paused] {
            assert_eq!(TimerState::parse(&state.to_string()), Some(state));
        }
    }

    #[test]
    fn test_event_names() {
        let names: Vec<&str> = TimerEvent::ALL.iter().map(|e| e.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "timer.started",
                "timer.restarted",
                "timer.paused",
                "timer.cancelled",
                "timer.finished"
            ]
        );
    }

    #[test]
    fn test_event_serializes_to_dotted_name() {
        let json = serde_json::to_string(&TimerEvent::Restarted).unwrap();
        assert_eq!(json, "\"timer.restarted\"");
    }

    #[test]
    fn test_timer_id_display() {
        assert_eq!(TimerId::new("kitchen").to_string(), "kitchen");
    }
}
