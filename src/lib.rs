//! # bulk-dispatch
//!
//! Drives a sequence of discrete, possibly failing operations against a remote
//! device, with user confirmations, cooperative cancellation and progress events.
//!
//! ## Design
//!
//! - **One run at a time** - a controller rejects a second run while one is active
//! - **Ask, don't guess** - a pre-flight prompt before starting, and a prompt after
//!   every failed step; failed steps are never retried silently
//! - **Cooperative cancellation** - checked at the loop top, before and during the
//!   pacing delay, and while a confirmation is pending; an in-flight operation
//!   always finishes first
//! - **Event-driven** - progress, log lines and state changes go out on one ordered
//!   broadcast channel
//!
//! ## Quick Start
//!
//! ```no_run
//! use bulk_dispatch::{AutoApprove, BulkController, BulkRunRequest, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (controller, confirmations) = BulkController::new(Config::default())?;
//!     confirmations.serve(AutoApprove);
//!
//!     let mut events = controller.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let outcome = controller
//!         .connect_and_run("192.168.1.50", BulkRunRequest::new(25, "^XA^FDlabel^FS^XZ"))
//!         .await?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Confirmation round-trips and policies
pub mod confirmation;
/// Device connections and transports
pub mod connection;
/// Bulk controller (decomposed into focused submodules)
pub mod controller;
/// Error types
pub mod error;
/// Unit operation execution
pub mod executor;
/// Progress and log sinks
pub mod sink;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{ApiConfig, Config, DeviceConfig, RunConfig, SimulationConfig, TransportKind};
pub use confirmation::{
    AutoApprove, AutoDecline, ConfirmationGate, ConfirmationPolicy, ConfirmationReceiver,
    ConfirmationRequest, DeclineErrors,
};
pub use connection::{Connection, Transport, TransportFactory};
pub use controller::{BulkController, RunHandle};
pub use error::{
    ApiError, ConnectionError, Error, ErrorDetail, OperationError, Result, ToHttpStatus,
};
pub use executor::{TransmitExecutor, UnitExecutor};
pub use sink::{EventForwarder, LogSink, ProgressSink, TracingLogSink};
pub use types::{
    BulkRunRequest, ConfirmationId, ConfirmationKind, ConnectionState, Event, LogLevel, Payload,
    ReadinessResult, RunId, RunOutcome, RunState, RunStatus,
};

/// Helper function to cancel the active run on a termination signal.
///
/// Waits for a termination signal, then cancels whatever run is active. Returns
/// once the signal arrived; a run that was active winds down on its own task.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use bulk_dispatch::{BulkController, BulkRunRequest, Config, DeclineErrors, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (controller, confirmations) = BulkController::new(Config::default())?;
///     confirmations.serve(DeclineErrors);
///
///     let handle = controller.spawn_connect_and_run("192.168.1.50", BulkRunRequest::new(10, "x"))?;
///     run_with_shutdown(controller).await;
///     println!("{}", handle.join().await?);
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(controller: BulkController) {
    wait_for_signal().await;
    match controller.cancel_active() {
        Ok(run_id) => tracing::info!(run_id = %run_id, "Shutdown signal cancelled the active run"),
        Err(_) => tracing::info!("Shutdown signal received with no active run"),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
