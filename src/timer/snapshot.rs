//! Persisted snapshot of a timer's observable state.
//!
//! Fields are kept as the raw strings the store holds so that corrupted
//! data survives loading and is dealt with by reconciliation instead of
//! by the deserializer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TimerState;
use super::span::{NONE_MARKER, format_instant, format_span};

/// The persisted subset of timer fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// `idle`, `active`, or `paused` (other values are coerced on restore).
    pub state: String,
    /// Nominal duration as `H:MM:SS`, or `none`.
    #[serde(default = "none_marker")]
    pub duration: String,
    /// Remaining span as `H:MM:SS`, or `none`.
    #[serde(default = "none_marker")]
    pub remaining: String,
    /// Completion instant as RFC 3339, or `none`.
    #[serde(default = "none_marker")]
    pub end_at: String,
}

fn none_marker() -> String {
    NONE_MARKER.to_string()
}

impl Snapshot {
    /// Captures typed timer fields in their persisted string form.
    #[must_use]
    pub fn capture(
        state: TimerState,
        duration: Duration,
        remaining: Duration,
        end_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            state: state.as_str().to_string(),
            duration: format_span(duration),
            remaining: format_span(remaining),
            end_at: end_at.map_or_else(none_marker, format_instant),
        }
    }
}
