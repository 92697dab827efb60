//! Scheduler adapters.
//!
//! [`TokioScheduler`] spawns one sleeping task per wake-up and cancels it
//! through a [`CancellationToken`]. [`ManualScheduler`] only fires when
//! [`ManualScheduler::fire_due`] is called, which makes timer tests
//! deterministic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{Clock, Scheduler, WakeCallback};
use crate::timer::span::to_span;

/// Opaque handle to one scheduled wake-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleHandle(u64);

impl ScheduleHandle {
    /// Returns the raw handle number.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ScheduleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Tokio
// ============================================================================

/// Scheduler backed by tokio tasks.
///
/// Each wake-up is a task that sleeps until its instant (measured against
/// the given clock when scheduled) or until its token is cancelled. A
/// wake-up fires at most once: whichever of firing and cancelling removes
/// the handle from the pending map first wins.
pub struct TokioScheduler {
    runtime: tokio::runtime::Handle,
    clock: Arc<dyn Clock>,
    next_id: AtomicU64,
    pending: Arc<DashMap<ScheduleHandle, CancellationToken>>,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns onto `runtime`.
    #[must_use]
    pub fn new(runtime: tokio::runtime::Handle, clock: Arc<dyn Clock>) -> Self {
        Self {
            runtime,
            clock,
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Returns the number of wake-ups that have neither fired nor been
    /// cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Cancels every pending wake-up.
    pub fn shutdown(&self) {
        let handles: Vec<ScheduleHandle> = self.pending.iter().map(|e| *e.key()).collect();
        for handle in handles {
            self.cancel(handle);
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, at: DateTime<Utc>, callback: WakeCallback) -> ScheduleHandle {
        let handle = ScheduleHandle(self.next_id.fetch_add(1, Ordering::SeqCst));
        let token = CancellationToken::new();
        self.pending.insert(handle, token.clone());

        let delay = to_span(at - self.clock.now());
        let pending = Arc::clone(&self.pending);
        trace!(%handle, delay_ms = delay.as_millis(), "scheduling wake-up");

        self.runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    trace!(%handle, "wake-up cancelled");
                }
                () = tokio::time::sleep(delay) => {
                    if pending.remove(&handle).is_some() {
                        callback(handle);
                    }
                }
            }
        });

        handle
    }

    fn cancel(&self, handle: ScheduleHandle) {
        if let Some((_, token)) = self.pending.remove(&handle) {
            token.cancel();
            debug!(%handle, "cancelled wake-up");
        }
    }
}

impl std::fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Manual
// ============================================================================

struct Entry {
    at: DateTime<Utc>,
    callback: WakeCallback,
}

#[derive(Default)]
struct ManualInner {
    next_id: u64,
    pending: BTreeMap<ScheduleHandle, Entry>,
}

/// Scheduler that fires only when driven explicitly.
#[derive(Default)]
pub struct ManualScheduler {
    inner: Mutex<ManualInner>,
}

impl ManualScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Returns the number of pending wake-ups.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns the instants of all pending wake-ups, earliest first.
    #[must_use]
    pub fn deadlines(&self) -> Vec<DateTime<Utc>> {
        let mut at: Vec<_> = self.lock().pending.values().map(|e| e.at).collect();
        at.sort();
        at
    }

    /// Fires every wake-up due at or before `now`, earliest first, and
    /// returns how many fired.
    ///
    /// Due callbacks are taken out under the lock and invoked after it is
    /// released, so a callback may schedule or cancel freely.
    pub fn fire_due(&self, now: DateTime<Utc>) -> usize {
        let mut due: Vec<(ScheduleHandle, Entry)> = {
            let mut inner = self.lock();
            let handles: Vec<ScheduleHandle> = inner
                .pending
                .iter()
                .filter(|(_, e)| e.at <= now)
                .map(|(h, _)| *h)
                .collect();
            handles
                .into_iter()
                .filter_map(|h| inner.pending.remove(&h).map(|e| (h, e)))
                .collect()
        };
        due.sort_by_key(|(h, e)| (e.at, *h));

        let fired = due.len();
        for (handle, entry) in due {
            (entry.callback)(handle);
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, at: DateTime<Utc>, callback: WakeCallback) -> ScheduleHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let handle = ScheduleHandle(inner.next_id);
        inner.pending.insert(handle, Entry { at, callback });
        handle
    }

    fn cancel(&self, handle: ScheduleHandle) {
        self.lock().pending.remove(&handle);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending_count())
            .finish()
    }
}
