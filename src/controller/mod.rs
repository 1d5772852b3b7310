//! Bulk controller split into focused submodules.
//!
//! The `BulkController` struct and its methods are organized by concern:
//! - [`tracking`] - Single-run slot, run IDs and status snapshots
//! - [`run`] - The confirm/execute/pace loop over one connection
//! - [`session`] - Connect-then-run convenience and background runs

mod run;
mod session;
mod tracking;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use session::RunHandle;

use crate::config::Config;
use crate::confirmation::{ConfirmationGate, ConfirmationReceiver};
use crate::connection::{TransportFactory, transport_factory_for};
use crate::error::{Error, Result};
use crate::executor::{TransmitExecutor, UnitExecutor};
use crate::sink::{EventForwarder, LogSink, ProgressSink};
use crate::types::{Event, LogLevel, RunId, RunState, RunStatus};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracking::RunTracking;

/// Drives bulk runs against a remote device (cloneable - all fields are Arc-wrapped)
///
/// One controller runs at most one bulk run at a time. Progress, log lines and
/// state changes are published on a broadcast channel (see [`subscribe`](Self::subscribe));
/// confirmations are answered through the [`ConfirmationReceiver`] returned by
/// [`new`](Self::new).
#[derive(Clone)]
pub struct BulkController {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Unbounded per-subscriber queues; never drop events, unlike the broadcast channel
    pub(crate) lossless_txs: Arc<Mutex<Vec<mpsc::UnboundedSender<Event>>>>,
    /// Requesting side of the confirmation round-trip
    pub(crate) gate: ConfirmationGate,
    /// Performs each unit operation (trait object for pluggable implementations)
    pub(crate) executor: Arc<dyn UnitExecutor>,
    /// Builds transports for `connect_and_run`
    pub(crate) transports: Arc<dyn TransportFactory>,
    /// Active run slot and status snapshot
    pub(crate) tracking: RunTracking,
}

impl BulkController {
    /// Create a controller from configuration
    ///
    /// Validates the configuration, selects the transport named by
    /// `device.transport`, and uses [`TransmitExecutor`] for unit operations.
    /// The returned receiver must be serviced (by a UI task, the HTTP API, or
    /// [`ConfirmationReceiver::serve`]); dropping it makes every confirmation
    /// resolve to "declined".
    pub fn new(config: Config) -> Result<(Self, ConfirmationReceiver)> {
        let transports = transport_factory_for(&config);
        Self::with_parts(config, transports, Arc::new(TransmitExecutor))
    }

    /// Create a controller with an explicit transport factory and executor
    pub fn with_parts(
        config: Config,
        transports: Arc<dyn TransportFactory>,
        executor: Arc<dyn UnitExecutor>,
    ) -> Result<(Self, ConfirmationReceiver)> {
        config.validate()?;

        let (event_tx, _rx) = tokio::sync::broadcast::channel(config.run.event_buffer);
        let (gate, receiver) = ConfirmationGate::channel(config.run.confirmation_buffer);

        tracing::info!(
            transport = transports.name(),
            executor = executor.name(),
            pacing_ms = config.run.pacing_delay.as_millis() as u64,
            "Bulk controller initialized"
        );

        let controller = Self {
            config: Arc::new(config),
            event_tx,
            lossless_txs: Arc::new(Mutex::new(Vec::new())),
            gate,
            executor,
            transports,
            tracking: RunTracking::default(),
        };
        Ok((controller, receiver))
    }

    /// Subscribe to controller events
    ///
    /// Each subscriber receives every event emitted after it subscribed, in
    /// production order. Slow subscribers may observe `Lagged` when the buffer
    /// (`run.event_buffer`) overflows.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Subscribe to controller events without the risk of lagging
    ///
    /// Every event emitted after this call is queued until the receiver takes it,
    /// however slowly it is drained. The queue closes once every clone of the
    /// controller is dropped.
    pub fn subscribe_lossless(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lossless_txs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Feed progress and log sinks from a lossless subscription
    ///
    /// Sinks see every progress tick and log line in production order. The
    /// forwarding task ends once every clone of the controller is dropped.
    pub fn attach_sinks(
        &self,
        progress: Arc<dyn ProgressSink>,
        log: Arc<dyn LogSink>,
    ) -> tokio::task::JoinHandle<()> {
        EventForwarder::spawn(self.subscribe_lossless(), progress, log)
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Snapshot of the current (or most recent) run
    pub fn status(&self) -> RunStatus {
        self.tracking.snapshot()
    }

    /// Whether a run is currently holding the run slot
    pub fn is_active(&self) -> bool {
        self.tracking.active_run().is_some()
    }

    /// Signal cancellation to the active run
    ///
    /// Cancellation is cooperative: an in-flight unit operation finishes first, and
    /// the run stops at its next check (loop top, pacing delay, or confirmation).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveRun`] if no run is active.
    pub fn cancel_active(&self) -> Result<RunId> {
        match self.tracking.cancel_active() {
            Some(run_id) => {
                tracing::info!(run_id = %run_id, "Cancellation requested");
                Ok(run_id)
            }
            None => Err(Error::NoActiveRun),
        }
    }

    /// Emit an event to all subscribers
    pub(crate) fn emit_event(&self, event: Event) {
        // Held across both sends so every subscriber sees one global order
        let mut lossless = self
            .lossless_txs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        lossless.retain(|tx| tx.send(event.clone()).is_ok());

        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Emit a user-facing log line and mirror it to tracing
    pub(crate) fn emit_log(&self, run_id: Option<RunId>, level: LogLevel, message: String) {
        let id = run_id.map(|id| id.0);
        match level {
            LogLevel::Info => tracing::info!(run_id = ?id, "{message}"),
            LogLevel::Warning => tracing::warn!(run_id = ?id, "{message}"),
            LogLevel::Error => tracing::error!(run_id = ?id, "{message}"),
        }
        self.emit_event(Event::Log {
            run_id,
            level,
            message,
            at: chrono::Utc::now(),
        });
    }

    /// End a claimed run that failed with `error`
    ///
    /// Publishes the `Failed` state and a [`Event::RunFailed`], so observers that
    /// never see the returned error still learn the run is over.
    pub(crate) fn fail(&self, run_id: RunId, error: &Error) {
        let message = error.to_string();
        self.tracking
            .update(|status| status.last_error = Some(message.clone()));
        self.set_state(run_id, RunState::Failed);
        self.emit_log(Some(run_id), LogLevel::Error, format!("Run failed: {message}"));
        self.emit_event(Event::RunFailed {
            run_id,
            error: message,
        });
    }

    /// Record a state transition and publish it
    pub(crate) fn set_state(&self, run_id: RunId, state: RunState) {
        self.tracking.update(|status| status.state = state);
        self.emit_event(Event::StateChanged { run_id, state });
    }
}
