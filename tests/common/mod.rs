//! Shared integration-test harness: a registry wired to the deterministic
//! ports, and a helper for driving the `countdown` binary over stdio.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use countdown::config::{TimerDefinition, TimerSettings};
use countdown::ports::{Clock, ManualClock, ManualScheduler, MemoryStore, Ports, RecordingSink};
use countdown::{TimerEvent, TimerId, TimerRegistry};

/// Default timeout for reading one reply from the binary.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed starting instant for deterministic tests.
#[must_use]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
}

/// A configured timer definition with the given duration.
#[must_use]
pub fn definition(id: &str, duration_secs: u64) -> TimerDefinition {
    let id = TimerId::new(id);
    let mut settings = TimerSettings::with_defaults(&id);
    settings.duration = Duration::from_secs(duration_secs);
    TimerDefinition { id, settings }
}

// ============================================================================
// Deterministic harness
// ============================================================================

/// A registry on manual ports. The store can be shared between harnesses to
/// simulate a process restart.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub scheduler: Arc<ManualScheduler>,
    pub events: Arc<RecordingSink>,
    pub store: Arc<MemoryStore>,
    pub registry: TimerRegistry,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        Self::restarted(Arc::new(MemoryStore::new()), t0())
    }

    /// A fresh "process" at `now` that reuses `store`.
    #[must_use]
    pub fn restarted(store: Arc<MemoryStore>, now: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let scheduler = Arc::new(ManualScheduler::new());
        let events = Arc::new(RecordingSink::new());
        let registry = TimerRegistry::new(Ports {
            clock: clock.clone(),
            scheduler: scheduler.clone(),
            events: events.clone(),
            store: store.clone(),
        });
        Self {
            clock,
            scheduler,
            events,
            store,
            registry,
        }
    }

    /// Moves the clock forward and fires whatever came due.
    pub fn advance(&self, secs: u64) -> usize {
        self.clock.advance(Duration::from_secs(secs));
        self.scheduler.fire_due(self.clock.now())
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn events_for(&self, id: &str) -> Vec<TimerEvent> {
        self.events.events_for(&TimerId::new(id))
    }
}

// ============================================================================
// Binary driver
// ============================================================================

/// A running `countdown run` process.
///
/// The child process is killed on drop via `kill_on_drop(true)`.
pub struct CountdownProcess {
    child: Child,
    stdin: tokio::process::ChildStdin,
    reader: BufReader<tokio::process::ChildStdout>,
}

impl CountdownProcess {
    /// Spawns `countdown run` with the given extra arguments.
    #[must_use]
    pub fn spawn(args: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_countdown"))
            .arg("--quiet")
            .arg("run")
            .args(args)
            .env_remove("COUNTDOWN_CONFIG")
            .env_remove("COUNTDOWN_STATE")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn countdown");

        let stdin = child.stdin.take().expect("stdin not captured");
        let stdout = child.stdout.take().expect("stdout not captured");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
        }
    }

    /// Sends one command line and returns its JSON reply.
    pub async fn send(&mut self, line: &str) -> Value {
        self.stdin
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write to stdin");
        self.stdin.flush().await.expect("failed to flush stdin");

        let mut reply = String::new();
        let n = tokio::time::timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut reply))
            .await
            .expect("timed out waiting for reply")
            .expect("read_line I/O error");
        assert!(n > 0, "unexpected EOF from countdown");
        serde_json::from_str(reply.trim())
            .unwrap_or_else(|e| panic!("invalid JSON reply: {e}\nline: {reply}"))
    }

    /// Closes stdin and waits for a clean exit.
    pub async fn shutdown(self) -> std::process::ExitStatus {
        let Self {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        tokio::time::timeout(Duration::from_secs(5), child.wait())
            .await
            .expect("countdown did not exit after EOF")
            .expect("failed to wait for countdown")
    }

    /// Runs the binary to completion with the given arguments.
    #[must_use]
    pub fn run_command(args: &[&str]) -> std::process::Output {
        std::process::Command::new(env!("CARGO_BIN_EXE_countdown"))
            .args(args)
            .output()
            .expect("failed to run countdown")
    }
}

/// Writes `body` to `name` inside `dir` and returns the path as a string.
#[must_use]
pub fn write_file(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("failed to write fixture");
    path.to_str().expect("non-UTF-8 temp path").to_string()
}
