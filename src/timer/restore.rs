//! Restore reconciliation.
//!
//! Decides what a timer should look like after a restart, given the last
//! persisted [`Snapshot`], the current time, and the restore settings. The
//! decision is pure: [`reconcile`] returns a [`Reconciled`] plan and the
//! [`Timer`](super::Timer) applies it, routing resumed timers through its
//! normal start path so `end_at` is always re-derived from `now`.
//!
//! Nothing in here fails. Unparseable or unknown values are logged and
//! coerced to the safe default (`idle`, zero remaining, no end).

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use super::snapshot::Snapshot;
use super::span::{
    is_none_marker, parse_instant, parse_span, to_delta, to_span, whole_seconds,
};
use super::{TimerId, TimerState};

/// Inputs to reconciliation besides the snapshot itself.
#[derive(Debug, Clone)]
pub struct RestoreContext<'a> {
    /// Timer being restored, for log context.
    pub timer_id: &'a TimerId,
    /// Current time.
    pub now: DateTime<Utc>,
    /// Whether restore is enabled at all.
    pub restore_enabled: bool,
    /// Maximum tolerated overrun for an active snapshot.
    pub grace_period: Duration,
    /// Duration currently in effect on the timer.
    pub effective_duration: Duration,
    /// Duration from configuration, used when a persisted one is corrupt.
    pub default_duration: Duration,
}

/// How reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Restore is disabled; restore data was not consulted.
    Disabled,
    /// No snapshot was available.
    Missing,
    /// The snapshot's state was outside the closed set.
    Invalid,
    /// Restored as idle.
    Idle,
    /// Restored as paused with its remaining span.
    Paused,
    /// Active snapshot within grace; the timer must be started again.
    ///
    /// `overdue` is set when the original end has already passed, in which
    /// case the countdown must complete immediately.
    Resume {
        /// Whether `end_at` was already in the past.
        overdue: bool,
    },
    /// Active snapshot whose overrun exceeded the grace period.
    Discarded,
}

impl RestoreOutcome {
    /// Returns a short label used in logs and metrics.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Missing => "missing",
            Self::Invalid => "invalid",
            Self::Idle => "idle",
            Self::Paused => "paused",
            Self::Resume { .. } => "resumed",
            Self::Discarded => "discarded",
        }
    }
}

/// Result of reconciliation: the fields to adopt and what to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// How reconciliation ended.
    pub outcome: RestoreOutcome,
    /// State to adopt. For [`RestoreOutcome::Resume`] this is `Paused`,
    /// the state the start path resumes from.
    pub state: TimerState,
    /// Duration to adopt.
    pub duration: Duration,
    /// Remaining span to adopt (never negative).
    pub remaining: Duration,
    /// End instant to adopt; only ever `Some` for an active timer, so
    /// always `None` here.
    pub end_at: Option<DateTime<Utc>>,
}

impl Reconciled {
    const fn idle(outcome: RestoreOutcome, duration: Duration) -> Self {
        Self {
            outcome,
            state: TimerState::Idle,
            duration,
            remaining: Duration::ZERO,
            end_at: None,
        }
    }
}

/// Reconciles a persisted snapshot against the current time.
#[must_use]
pub fn reconcile(snapshot: Option<&Snapshot>, ctx: &RestoreContext<'_>) -> Reconciled {
    let id = ctx.timer_id;

    if !ctx.restore_enabled {
        return Reconciled::idle(RestoreOutcome::Disabled, ctx.effective_duration);
    }

    let Some(snapshot) = snapshot else {
        debug!(timer_id = %id, "no snapshot to restore");
        return Reconciled::idle(RestoreOutcome::Missing, ctx.effective_duration);
    };

    let Some(state) = TimerState::parse(&snapshot.state) else {
        warn!(timer_id = %id, state = %snapshot.state, "unrecognised restored state; resetting to idle");
        return Reconciled::idle(RestoreOutcome::Invalid, ctx.effective_duration);
    };

    let duration = restored_duration(snapshot, ctx);

    let remaining = if state == TimerState::Paused {
        restored_remaining(snapshot, id)
    } else {
        Duration::ZERO
    };

    let end_at = if is_none_marker(&snapshot.end_at) {
        None
    } else {
        let parsed = parse_instant(&snapshot.end_at);
        if parsed.is_none() {
            warn!(timer_id = %id, end_at = %snapshot.end_at, "unparseable restored end time; treating as absent");
        }
        parsed
    };

    match state {
        TimerState::Idle => Reconciled::idle(RestoreOutcome::Idle, duration),
        TimerState::Paused => Reconciled {
            outcome: RestoreOutcome::Paused,
            state: TimerState::Paused,
            duration,
            remaining,
            end_at: None,
        },
        TimerState::Active => reconcile_active(end_at, duration, ctx),
    }
}

/// Applies the grace test to a snapshot that was active when persisted.
fn reconcile_active(
    end_at: Option<DateTime<Utc>>,
    duration: Duration,
    ctx: &RestoreContext<'_>,
) -> Reconciled {
    // Measured from the same whole second `start` arms from, so a resumed
    // timer keeps its original end instant.
    let now = whole_seconds(ctx.now);
    let left = end_at.map_or(TimeDelta::zero(), |end| end - now);
    debug!(timer_id = %ctx.timer_id, remaining_secs = left.num_seconds(), "restored remaining");

    let within_grace = left
        .checked_add(&to_delta(ctx.grace_period))
        .is_none_or(|slack| slack >= TimeDelta::zero());

    if within_grace {
        Reconciled {
            outcome: RestoreOutcome::Resume {
                overdue: left < TimeDelta::zero(),
            },
            state: TimerState::Paused,
            duration,
            remaining: to_span(left),
            end_at: None,
        }
    } else {
        debug!(
            timer_id = %ctx.timer_id,
            overrun_secs = -left.num_seconds(),
            grace_secs = ctx.grace_period.as_secs(),
            "restored timer overran its grace period; discarding"
        );
        Reconciled::idle(RestoreOutcome::Discarded, duration)
    }
}

/// Picks the duration to adopt: the persisted one only when the timer has
/// no duration of its own.
fn restored_duration(snapshot: &Snapshot, ctx: &RestoreContext<'_>) -> Duration {
    if !ctx.effective_duration.is_zero() || is_none_marker(&snapshot.duration) {
        return ctx.effective_duration;
    }
    parse_span(&snapshot.duration).unwrap_or_else(|err| {
        warn!(timer_id = %ctx.timer_id, %err, "unparseable restored duration; using default");
        ctx.default_duration
    })
}

fn restored_remaining(snapshot: &Snapshot, id: &TimerId) -> Duration {
    if is_none_marker(&snapshot.remaining) {
        return Duration::ZERO;
    }
    parse_span(&snapshot.remaining).unwrap_or_else(|err| {
        warn!(timer_id = %id, %err, "unparseable restored remaining; using zero");
        Duration::ZERO
    })
}
