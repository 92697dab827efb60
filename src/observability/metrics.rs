//! Metrics collection for `countdown`.
//!
//! Prometheus-compatible counters with typed recording helpers. Every label
//! value comes from a closed set, so cardinality is bounded.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::CountdownError;
use crate::timer::{RestoreOutcome, TimerEvent};

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `CountdownError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), CountdownError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| CountdownError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "countdown_timer_events_total",
        "Timer lifecycle events emitted, by event type"
    );
    describe_counter!(
        "countdown_restores_total",
        "Timer restore reconciliations, by outcome"
    );
    describe_counter!(
        "countdown_store_failures_total",
        "Snapshot writes or reads that failed"
    );
    describe_gauge!("countdown_timers", "Number of registered timers");
}

/// Records an emitted timer event.
pub fn record_timer_event(event: TimerEvent) {
    counter!("countdown_timer_events_total", "event" => event.as_str()).increment(1);
}

/// Records how a restore reconciliation ended.
pub fn record_restore(outcome: RestoreOutcome) {
    counter!("countdown_restores_total", "outcome" => outcome.label()).increment(1);
}

/// Records a failed store operation.
pub fn record_store_failure(operation: &'static str) {
    counter!("countdown_store_failures_total", "operation" => operation).increment(1);
}

/// Sets the registered timer count.
#[allow(clippy::cast_precision_loss)]
pub fn set_timer_count(count: usize) {
    gauge!("countdown_timers").set(count as f64);
}
