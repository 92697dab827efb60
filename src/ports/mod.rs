//! Ports the timer core depends on.
//!
//! Each port is a small trait with a production adapter and a
//! deterministic adapter for tests:
//!
//! | Port | Production | Deterministic |
//! |------|------------|---------------|
//! | [`Clock`] | [`SystemClock`] | [`ManualClock`] |
//! | [`Scheduler`] | [`TokioScheduler`] | [`ManualScheduler`] |
//! | [`EventSink`] | [`EventEmitter`](crate::observability::EventEmitter) | [`RecordingSink`] |
//! | [`SnapshotStore`] | [`JsonFileStore`] | [`MemoryStore`] |

pub mod clock;
pub mod scheduler;
pub mod sink;
pub mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::timer::{Snapshot, TimerEvent, TimerId};

pub use clock::{ManualClock, SystemClock};
pub use scheduler::{ManualScheduler, ScheduleHandle, TokioScheduler};
pub use sink::RecordingSink;
pub use store::{JsonFileStore, MemoryStore};

/// Source of the current UTC time.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Callback invoked when a scheduled instant is reached. Receives the
/// handle it was scheduled under.
pub type WakeCallback = Box<dyn FnOnce(ScheduleHandle) + Send + 'static>;

/// One-shot wake-up scheduling.
pub trait Scheduler: Send + Sync {
    /// Schedules `callback` to run once at `at`. An instant in the past
    /// fires as soon as possible.
    fn schedule(&self, at: DateTime<Utc>, callback: WakeCallback) -> ScheduleHandle;

    /// Cancels a pending wake-up. Cancelling a fired, cancelled, or unknown
    /// handle is a no-op.
    fn cancel(&self, handle: ScheduleHandle);
}

/// Receiver of timer lifecycle events.
pub trait EventSink: Send + Sync {
    /// Publishes one event for one timer.
    fn emit(&self, event: TimerEvent, timer_id: &TimerId);
}

/// Durable key-value storage for timer snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Persists the latest snapshot for a timer, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the snapshot could not be written.
    fn save(&self, timer_id: &TimerId, snapshot: &Snapshot) -> Result<(), StoreError>;

    /// Loads the last snapshot for a timer, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the backing storage could not be read.
    fn load(&self, timer_id: &TimerId) -> Result<Option<Snapshot>, StoreError>;

    /// Forgets a timer's snapshot. Removing an unknown id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the removal could not be written.
    fn remove(&self, timer_id: &TimerId) -> Result<(), StoreError>;
}

/// The set of ports a timer is wired to. Cheap to clone.
#[derive(Clone)]
pub struct Ports {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Wake-up scheduler.
    pub scheduler: Arc<dyn Scheduler>,
    /// Event sink.
    pub events: Arc<dyn EventSink>,
    /// Snapshot store.
    pub store: Arc<dyn SnapshotStore>,
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ports").finish_non_exhaustive()
    }
}
