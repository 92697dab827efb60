//! `run` command
//!
//! Wires the production ports together, registers the configured timers,
//! and serves the control protocol on stdin until input closes or a
//! signal arrives.

use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};

use crate::cli::args::RunArgs;
use crate::config::{ConfigLoader, TimerDefinition};
use crate::control::Controller;
use crate::error::CountdownError;
use crate::observability::{Event, EventEmitter, StopReason, init_metrics};
use crate::ports::{
    Clock, JsonFileStore, MemoryStore, Ports, SnapshotStore, SystemClock, TokioScheduler,
};
use crate::registry::TimerRegistry;

/// Run the timer host.
///
/// # Errors
///
/// Returns a configuration error if the file fails to load, a store error
/// if the state file cannot be opened, or an I/O error from the control
/// streams.
pub async fn run(args: &RunArgs) -> Result<(), CountdownError> {
    if let Some(port) = args.metrics_port {
        init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let definitions = load_definitions(args)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let scheduler = Arc::new(TokioScheduler::new(
        tokio::runtime::Handle::current(),
        Arc::clone(&clock),
    ));
    let emitter = Arc::new(match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stderr(),
    });
    let store: Arc<dyn SnapshotStore> = match &args.state {
        Some(path) => {
            tracing::info!(state = %path.display(), "using state file");
            Arc::new(JsonFileStore::open(path)?)
        }
        None => {
            tracing::warn!("no --state given; timers will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = Arc::new(TimerRegistry::new(Ports {
        clock,
        scheduler: scheduler.clone(),
        events: emitter.clone(),
        store,
    }));
    registry.reload(&definitions);

    emitter.emit_event(Event::HostStarted {
        timestamp: Utc::now(),
        timers: registry.len(),
    });
    tracing::info!(timers = registry.len(), "serving commands on stdin");

    let controller = Controller::new(Arc::clone(&registry), args.config.clone());
    let outcome = serve(&controller).await;

    scheduler.shutdown();
    let reason = match &outcome {
        Ok(reason) => *reason,
        Err(_) => StopReason::InputClosed,
    };
    emitter.emit_event(Event::HostStopped {
        timestamp: Utc::now(),
        reason,
    });
    tracing::info!(?reason, "host stopped");

    outcome.map(|_| ())
}

fn load_definitions(args: &RunArgs) -> Result<Arc<Vec<TimerDefinition>>, CountdownError> {
    let Some(path) = &args.config else {
        tracing::warn!("no --config given; only dynamically created timers are available");
        return Ok(Arc::new(Vec::new()));
    };

    tracing::info!(config = %path.display(), "loading configuration");
    let loaded = ConfigLoader::with_defaults().load(path)?;
    for warning in &loaded.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
    Ok(loaded.timers)
}

/// Reads commands until stdin closes or the process is signalled.
async fn serve(controller: &Controller) -> Result<StopReason, CountdownError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => return Ok(StopReason::Interrupted),
            _ = sigterm.recv() => return Ok(StopReason::Terminated),
        };
        let Some(line) = line else {
            return Ok(StopReason::InputClosed);
        };

        if let Some(reply) = controller.handle_line(&line) {
            let mut out = serde_json::to_vec(&reply)?;
            out.push(b'\n');
            stdout.write_all(&out).await?;
            stdout.flush().await?;
        }
    }
}
