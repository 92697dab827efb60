//! `countdown` - durable countdown timers
//!
//! Timers run from idle to active, can be paused and resumed, and survive
//! process restarts by persisting a snapshot after every transition. On
//! startup each timer reconciles its snapshot against the clock, resuming,
//! completing, or discarding overdue runs according to its grace period.
//!
//! The timer core talks to the outside world only through [`ports`], so
//! the same code runs against tokio and the filesystem in production and
//! against a manual clock and scheduler in tests.

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod observability;
pub mod ports;
pub mod registry;
pub mod timer;

pub use error::{CountdownError, Result};
pub use registry::TimerRegistry;
pub use timer::{Timer, TimerEvent, TimerId, TimerState, TimerView};
