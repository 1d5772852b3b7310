//! Simulated bulk run
//!
//! Runs a bulk job against the in-process simulated device, which randomly
//! refuses work or fails mid-transmission:
//! - Building a controller from configuration
//! - Answering confirmations with a policy
//! - Forwarding events into progress and log sinks
//!
//! Run with `RUST_LOG=bulk_dispatch=debug cargo run --example simulated_run -- 20`

use bulk_dispatch::config::{Config, TransportKind};
use bulk_dispatch::{AutoApprove, BulkController, BulkRunRequest, LogSink, ProgressSink};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn report_progress(&self, current: u32, total: u32) {
        println!("[{current:>3}/{total}]");
    }
}

impl LogSink for ConsoleSink {
    fn log_event(&self, message: &str) {
        println!("  {message}");
    }

    fn clear(&self) {
        println!("----");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let count = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<u32>())
        .transpose()?
        .unwrap_or(10);

    let mut config = Config::default();
    config.device.transport = TransportKind::Simulated;
    config.run.pacing_delay = Duration::from_millis(200);
    config.simulation.seed = Some(7);

    let (controller, confirmations) = BulkController::new(config)?;
    // Approve the pre-flight prompt and every error prompt (skip failed steps)
    confirmations.serve(AutoApprove);

    let sink = Arc::new(ConsoleSink);
    let forwarder = controller.attach_sinks(sink.clone(), sink);

    let handle =
        controller.spawn_connect_and_run("simulated-printer", BulkRunRequest::new(count, "label"))?;

    let cancel_on_signal = tokio::spawn(bulk_dispatch::run_with_shutdown(controller.clone()));
    let outcome = handle.join().await;
    cancel_on_signal.abort();
    // The aborted task holds a controller clone; wait for it so the event channel can close
    let _ = cancel_on_signal.await;

    match outcome {
        Ok(outcome) => println!("Outcome: {outcome}"),
        Err(e) => println!("Run failed: {e}"),
    }

    drop(controller);
    forwarder.await?;
    Ok(())
}
