//! Structured event stream for `countdown`.
//!
//! Timer lifecycle and host events are serialized as newline-delimited JSON
//! (JSONL) with a monotonically increasing sequence number for ordering.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ports::EventSink;
use crate::timer::{TimerEvent, TimerId};

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted while the host runs.
///
/// Serialized with a `"type"` tag matching the event names consumers
/// subscribe to (`timer.started`, `host.stopped`, ...).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The host finished loading and is serving commands.
    #[serde(rename = "host.started")]
    HostStarted {
        /// When the host started.
        timestamp: DateTime<Utc>,
        /// Number of timers registered at startup.
        timers: usize,
    },

    /// The host is shutting down.
    #[serde(rename = "host.stopped")]
    HostStopped {
        /// When the host stopped.
        timestamp: DateTime<Utc>,
        /// Why it stopped.
        reason: StopReason,
    },

    /// A timer started from idle.
    #[serde(rename = "timer.started")]
    TimerStarted {
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
        /// Timer the event belongs to.
        timer_id: TimerId,
    },

    /// A timer was started again while active or paused.
    #[serde(rename = "timer.restarted")]
    TimerRestarted {
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
        /// Timer the event belongs to.
        timer_id: TimerId,
    },

    /// A timer was paused.
    #[serde(rename = "timer.paused")]
    TimerPaused {
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
        /// Timer the event belongs to.
        timer_id: TimerId,
    },

    /// A timer was cancelled.
    #[serde(rename = "timer.cancelled")]
    TimerCancelled {
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
        /// Timer the event belongs to.
        timer_id: TimerId,
    },

    /// A timer ran out or was finished explicitly.
    #[serde(rename = "timer.finished")]
    TimerFinished {
        /// When the event was emitted.
        timestamp: DateTime<Utc>,
        /// Timer the event belongs to.
        timer_id: TimerId,
    },
}

impl Event {
    /// Builds the variant for a timer lifecycle event.
    #[must_use]
    pub fn timer(event: TimerEvent, timer_id: TimerId, timestamp: DateTime<Utc>) -> Self {
        match event {
            TimerEvent::Started => Self::TimerStarted {
                timestamp,
                timer_id,
            },
            TimerEvent::Restarted => Self::TimerRestarted {
                timestamp,
                timer_id,
            },
            TimerEvent::Paused => Self::TimerPaused {
                timestamp,
                timer_id,
            },
            TimerEvent::Cancelled => Self::TimerCancelled {
                timestamp,
                timer_id,
            },
            TimerEvent::Finished => Self::TimerFinished {
                timestamp,
                timer_id,
            },
        }
    }
}

/// Why the host stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Control input reached end of file.
    InputClosed,
    /// Interrupted by Ctrl+C / SIGINT.
    Interrupted,
    /// Terminated by SIGTERM.
    Terminated,
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit_event`](Self::emit_event) increments the sequence
/// counter, writes the event as one JSON line, and flushes. Serialization
/// and I/O failures are dropped; a broken event stream never stops timers.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stderr.
    ///
    /// stdout is reserved for control-protocol replies.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that appends to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit_event(&self, event: Event) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope { sequence, event };

        let mut w = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(line) = serde_json::to_string(&envelope) {
            let _ = writeln!(w, "{line}");
            let _ = w.flush();
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

impl EventSink for EventEmitter {
    fn emit(&self, event: TimerEvent, timer_id: &TimerId) {
        self.emit_event(Event::timer(event, timer_id.clone(), Utc::now()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn lines(&self) -> Vec<serde_json::Value> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn timer_events_use_dotted_type_names() {
        let now = Utc::now();
        for kind in TimerEvent::ALL {
            let json = serde_json::to_value(Event::timer(kind, TimerId::new("t"), now)).unwrap();
            assert_eq!(json["type"], kind.as_str());
            assert_eq!(json["timer_id"], "t");
        }
    }

    #[test]
    fn sink_writes_sequenced_jsonl() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        let id = TimerId::new("kitchen");
        EventSink::emit(&emitter, TimerEvent::Started, &id);
        EventSink::emit(&emitter, TimerEvent::Finished, &id);

        assert_eq!(emitter.event_count(), 2);
        let lines = tw.lines();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[0]["type"], "timer.started");
        assert_eq!(lines[1]["sequence"], 1);
        assert_eq!(lines[1]["type"], "timer.finished");
        assert_eq!(lines[1]["timer_id"], "kitchen");
    }

    #[test]
    fn host_events_serialize_flat() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit_event(Event::HostStopped {
            timestamp: Utc::now(),
            reason: StopReason::InputClosed,
        });
        let lines = tw.lines();
        assert_eq!(lines[0]["type"], "host.stopped");
        assert_eq!(lines[0]["reason"], "input_closed");
        assert!(lines[0].get("event").is_none());
    }

    #[test]
    fn keeps_writing_after_poisoned_lock() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        let poisoned = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = emitter.writer.lock().unwrap();
            panic!("writer poisoned");
        }));
        assert!(poisoned.is_err());
        assert!(emitter.writer.is_poisoned());

        EventSink::emit(&emitter, TimerEvent::Started, &TimerId::new("a"));
        EventSink::emit(&emitter, TimerEvent::Finished, &TimerId::new("a"));
        assert_eq!(tw.lines().len(), 2);
    }

    #[test]
    fn file_emitter_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        {
            let emitter = EventEmitter::from_file(&path).unwrap();
            EventSink::emit(&emitter, TimerEvent::Paused, &TimerId::new("a"));
        }
        {
            let emitter = EventEmitter::from_file(&path).unwrap();
            EventSink::emit(&emitter, TimerEvent::Cancelled, &TimerId::new("a"));
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
