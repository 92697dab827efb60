//! The timer entity.
//!
//! A [`Timer`] owns its countdown state behind a mutex and talks to the
//! outside world only through [`Ports`]. Every command runs under the lock
//! from start to finish: the state change, the event, the re-armed or
//! cancelled wake-up, and the snapshot write are one critical section, so
//! snapshots for a timer are written in the order its transitions happen.
//!
//! Completion callbacks hold a `Weak` reference and carry the handle they
//! were scheduled under. A callback whose handle is no longer the pending
//! one (it lost a race against a restart, pause, or finish) does nothing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use super::restore::{RestoreContext, RestoreOutcome, reconcile};
use super::snapshot::Snapshot;
use super::span::{format_instant, format_span, to_delta, to_span, whole_seconds, whole_span};
use super::{TimerEvent, TimerId, TimerState};
use crate::config::TimerSettings;
use crate::error::StoreError;
use crate::observability::metrics;
use crate::ports::{Ports, ScheduleHandle};

// ============================================================================
// View
// ============================================================================

/// Read-only picture of a timer, as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerView {
    /// Timer id.
    pub id: TimerId,
    /// Display name.
    pub name: String,
    /// Display icon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Current state.
    pub state: TimerState,
    /// Nominal duration.
    #[serde(serialize_with = "span_str")]
    pub duration: Duration,
    /// Remaining span. Only meaningful while paused; while active it holds
    /// the span the current run started from.
    #[serde(serialize_with = "span_str")]
    pub remaining: Duration,
    /// Completion instant, present only while active.
    #[serde(serialize_with = "instant_str")]
    pub finishes_at: Option<DateTime<Utc>>,
    /// Whether the timer may be updated or deleted dynamically.
    pub editable: bool,
    /// Whether restore is enabled.
    pub restore: bool,
    /// Tolerated overrun on restore.
    #[serde(serialize_with = "span_str")]
    pub restore_grace_period: Duration,
}

fn span_str<S: Serializer>(span: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_span(*span))
}

#[allow(clippy::ref_option)]
fn instant_str<S: Serializer>(at: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match at {
        Some(at) => s.serialize_str(&format_instant(*at)),
        None => s.serialize_none(),
    }
}

// ============================================================================
// Timer
// ============================================================================

/// Snapshots hold whole seconds, so settings do too.
fn whole_second_settings(mut settings: TimerSettings) -> TimerSettings {
    settings.duration = whole_span(settings.duration);
    settings.restore_grace_period = whole_span(settings.restore_grace_period);
    settings
}

struct TimerInner {
    settings: TimerSettings,
    state: TimerState,
    duration: Duration,
    remaining: Duration,
    end_at: Option<DateTime<Utc>>,
    pending: Option<ScheduleHandle>,
    /// Set once the registry drops the timer; no later command may act.
    detached: bool,
}

/// A durable countdown timer.
pub struct Timer {
    id: TimerId,
    editable: bool,
    ports: Ports,
    this: Weak<Self>,
    inner: Mutex<TimerInner>,
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("pending", &inner.pending)
            .finish_non_exhaustive()
    }
}

impl Timer {
    /// Creates an idle timer. Call [`attach`](Self::attach) to restore its
    /// persisted state.
    #[must_use]
    pub fn new(id: TimerId, settings: TimerSettings, editable: bool, ports: Ports) -> Arc<Self> {
        let settings = whole_second_settings(settings);
        Arc::new_cyclic(|this| Self {
            id,
            editable,
            ports,
            this: this.clone(),
            inner: Mutex::new(TimerInner {
                state: TimerState::Idle,
                duration: settings.duration,
                remaining: settings.duration,
                end_at: None,
                pending: None,
                detached: false,
                settings,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TimerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the timer for a command, or returns `None` once detached.
    fn lock_attached(&self, command: &str) -> Option<MutexGuard<'_, TimerInner>> {
        let inner = self.lock();
        if inner.detached {
            debug!(timer_id = %self.id, command, "ignored: timer detached");
            return None;
        }
        Some(inner)
    }

    /// Returns the timer id.
    #[must_use]
    pub const fn id(&self) -> &TimerId {
        &self.id
    }

    /// Returns `true` for dynamically created timers.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        self.editable
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        self.lock().state
    }

    /// Returns the current settings.
    #[must_use]
    pub fn settings(&self) -> TimerSettings {
        self.lock().settings.clone()
    }

    /// Returns a read-only view of the timer.
    #[must_use]
    pub fn view(&self) -> TimerView {
        let inner = self.lock();
        TimerView {
            id: self.id.clone(),
            name: inner.settings.name.clone(),
            icon: inner.settings.icon.clone(),
            state: inner.state,
            duration: inner.duration,
            remaining: inner.remaining,
            finishes_at: inner.end_at,
            editable: self.editable,
            restore: inner.settings.restore,
            restore_grace_period: inner.settings.restore_grace_period,
        }
    }

    /// Returns the snapshot that would be persisted right now.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Self::capture(&self.lock())
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Restores persisted state, if restore is enabled, and persists the
    /// result.
    ///
    /// A snapshot that cannot be loaded is logged and treated as absent.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the resulting snapshot cannot be saved.
    /// The timer is fully restored in memory either way.
    pub fn attach(&self) -> Result<RestoreOutcome, StoreError> {
        let mut inner = self.lock();

        let snapshot = if inner.settings.restore {
            self.ports.store.load(&self.id).unwrap_or_else(|err| {
                warn!(timer_id = %self.id, %err, "failed to load snapshot; starting fresh");
                metrics::record_store_failure("load");
                None
            })
        } else {
            None
        };

        let outcome = self.restore_from(&mut inner, snapshot.as_ref());
        self.persist(&inner)?;
        Ok(outcome)
    }

    /// Cancels the pending wake-up, if any, and stops the timer from acting
    /// on later commands. Its snapshot is never written again.
    ///
    /// Used when the timer is being removed from the registry.
    pub fn detach(&self) {
        let mut inner = self.lock();
        self.cancel_pending(&mut inner);
        inner.detached = true;
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Starts or restarts the countdown.
    ///
    /// With no (or a zero) `requested` span the timer resumes from its
    /// remaining span if it has one, and otherwise runs its full duration.
    /// A requested span also becomes the new duration. Spans are counted in
    /// whole seconds; any fraction is dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot cannot be saved; the timer
    /// is running regardless.
    pub fn start(&self, requested: Option<Duration>) -> Result<(), StoreError> {
        let Some(mut inner) = self.lock_attached("start") else {
            return Ok(());
        };
        let now = self.ports.clock.now();
        self.start_locked(&mut inner, requested, now);
        self.persist(&inner)
    }

    /// Pauses an active timer, keeping its remaining span. No-op otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot cannot be saved.
    pub fn pause(&self) -> Result<(), StoreError> {
        let Some(mut inner) = self.lock_attached("pause") else {
            return Ok(());
        };
        if inner.state != TimerState::Active {
            debug!(timer_id = %self.id, state = %inner.state, "pause ignored: timer not active");
            return Ok(());
        }

        self.cancel_pending(&mut inner);
        let now = whole_seconds(self.ports.clock.now());
        inner.remaining = inner.end_at.map_or(Duration::ZERO, |end| to_span(end - now));
        inner.end_at = None;
        inner.state = TimerState::Paused;
        self.emit(TimerEvent::Paused);
        self.persist(&inner)
    }

    /// Resets the timer to idle. Emits `cancelled` even when already idle.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot cannot be saved.
    pub fn cancel(&self) -> Result<(), StoreError> {
        let Some(mut inner) = self.lock_attached("cancel") else {
            return Ok(());
        };
        self.cancel_pending(&mut inner);
        inner.state = TimerState::Idle;
        inner.end_at = None;
        inner.remaining = Duration::ZERO;
        self.emit(TimerEvent::Cancelled);
        self.persist(&inner)
    }

    /// Completes an active timer early. No-op otherwise.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot cannot be saved.
    pub fn finish(&self) -> Result<(), StoreError> {
        let Some(mut inner) = self.lock_attached("finish") else {
            return Ok(());
        };
        if inner.state != TimerState::Active {
            debug!(timer_id = %self.id, state = %inner.state, "finish ignored: timer not active");
            return Ok(());
        }
        self.cancel_pending(&mut inner);
        self.complete(&mut inner);
        self.persist(&inner)
    }

    /// Completion callback entry point.
    ///
    /// Ignored unless `handle` is the pending wake-up and the timer is
    /// still active.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot cannot be saved.
    pub fn on_timeout(&self, handle: ScheduleHandle) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.pending != Some(handle) || inner.state != TimerState::Active {
            debug!(timer_id = %self.id, %handle, "stale wake-up ignored");
            return Ok(());
        }
        inner.pending = None;
        self.complete(&mut inner);
        self.persist(&inner)
    }

    /// Replaces the timer's settings.
    ///
    /// With restore enabled, the current state is re-reconciled as if it
    /// had just been restored; an active timer is restarted from what it
    /// has left. With restore disabled the timer is forced idle.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot cannot be saved.
    pub fn update_config(&self, settings: TimerSettings) -> Result<(), StoreError> {
        let settings = whole_second_settings(settings);
        let Some(mut inner) = self.lock_attached("update") else {
            return Ok(());
        };
        inner.duration = settings.duration;
        inner.settings = settings;

        if inner.settings.restore {
            let current = Self::capture(&inner);
            self.restore_from(&mut inner, Some(&current));
        } else {
            self.cancel_pending(&mut inner);
            inner.state = TimerState::Idle;
            inner.end_at = None;
            inner.remaining = Duration::ZERO;
        }
        debug!(timer_id = %self.id, state = %inner.state, "settings updated");
        self.persist(&inner)
    }

    // ------------------------------------------------------------------------
    // Internals (all called with the lock held)
    // ------------------------------------------------------------------------

    fn restore_from(&self, inner: &mut TimerInner, snapshot: Option<&Snapshot>) -> RestoreOutcome {
        let now = self.ports.clock.now();
        let ctx = RestoreContext {
            timer_id: &self.id,
            now,
            restore_enabled: inner.settings.restore,
            grace_period: inner.settings.restore_grace_period,
            effective_duration: inner.duration,
            default_duration: inner.settings.duration,
        };
        let plan = reconcile(snapshot, &ctx);

        self.cancel_pending(inner);
        inner.state = plan.state;
        inner.duration = plan.duration;
        inner.remaining = plan.remaining;
        inner.end_at = plan.end_at;

        match plan.outcome {
            RestoreOutcome::Resume { overdue: true } => self.arm(inner, Duration::ZERO, now),
            RestoreOutcome::Resume { overdue: false } => self.start_locked(inner, None, now),
            _ => {}
        }

        metrics::record_restore(plan.outcome);
        debug!(
            timer_id = %self.id,
            outcome = plan.outcome.label(),
            state = %inner.state,
            "reconciled timer state"
        );
        plan.outcome
    }

    fn start_locked(&self, inner: &mut TimerInner, requested: Option<Duration>, now: DateTime<Utc>) {
        let requested = requested.map(whole_span);
        let remaining = match requested.filter(|span| !span.is_zero()) {
            Some(span) => {
                inner.duration = span;
                span
            }
            None if !inner.remaining.is_zero() => inner.remaining,
            None => inner.duration,
        };
        self.arm(inner, remaining, now);
    }

    /// Moves to `active` with `remaining` left and schedules completion.
    fn arm(&self, inner: &mut TimerInner, remaining: Duration, now: DateTime<Utc>) {
        self.cancel_pending(inner);
        let event = if inner.state == TimerState::Idle {
            TimerEvent::Started
        } else {
            TimerEvent::Restarted
        };

        let end_at = whole_seconds(now)
            .checked_add_signed(to_delta(remaining))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        inner.remaining = remaining;
        inner.end_at = Some(end_at);
        inner.state = TimerState::Active;

        self.emit(event);
        inner.pending = Some(self.schedule_completion(end_at));
    }

    fn complete(&self, inner: &mut TimerInner) {
        inner.state = TimerState::Idle;
        inner.end_at = None;
        inner.remaining = Duration::ZERO;
        self.emit(TimerEvent::Finished);
    }

    fn schedule_completion(&self, at: DateTime<Utc>) -> ScheduleHandle {
        let this = self.this.clone();
        self.ports.scheduler.schedule(
            at,
            Box::new(move |handle: ScheduleHandle| {
                let Some(timer) = this.upgrade() else {
                    return;
                };
                if let Err(err) = timer.on_timeout(handle) {
                    warn!(timer_id = %timer.id, %err, "completion not persisted");
                }
            }),
        )
    }

    fn cancel_pending(&self, inner: &mut TimerInner) {
        if let Some(handle) = inner.pending.take() {
            self.ports.scheduler.cancel(handle);
        }
    }

    fn emit(&self, event: TimerEvent) {
        info!(timer_id = %self.id, %event, "timer event");
        metrics::record_timer_event(event);
        self.ports.events.emit(event, &self.id);
    }

    fn capture(inner: &TimerInner) -> Snapshot {
        Snapshot::capture(inner.state, inner.duration, inner.remaining, inner.end_at)
    }

    fn persist(&self, inner: &TimerInner) -> Result<(), StoreError> {
        if inner.detached {
            return Ok(());
        }
        self.ports
            .store
            .save(&self.id, &Self::capture(inner))
            .inspect_err(|err| {
                warn!(timer_id = %self.id, %err, "failed to persist snapshot");
                metrics::record_store_failure("save");
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
