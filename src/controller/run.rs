//! The bulk run loop: pre-flight confirmation, per-step execution, pacing.

use crate::connection::Connection;
use crate::error::{ConnectionError, Error, OperationError, Result};
use crate::types::{
    BulkRunRequest, ConfirmationKind, Event, LogLevel, RunId, RunOutcome, RunState,
};
use tokio_util::sync::CancellationToken;

use super::BulkController;
use super::tracking::ActiveRunGuard;

impl BulkController {
    /// Run `request.count` unit operations over an already-open connection
    ///
    /// The connection is moved into the run and closed before this returns,
    /// whichever outcome is reached. The sequence is:
    ///
    /// 1. Pre-flight confirmation ("About to run N operations ... Proceed?")
    /// 2. For each step: check cancellation, execute, report progress. A failed
    ///    step raises an error confirmation; declining stops the run, accepting
    ///    skips the step. Failed steps are never retried. A step that leaves the
    ///    connection closed or lost ends the run with an error, without a prompt.
    /// 3. Between steps, wait `run.pacing_delay`. Cancellation interrupts the wait.
    ///
    /// Cancellation is reported as [`RunOutcome::CancelledByUser`], not as an error.
    /// Steps that already ran are not rolled back.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidRequest`] if `request.count` is zero
    /// - [`Error::RunInProgress`] if another run is active on this controller
    /// - [`Error::NotConnected`] if `conn` is not open; no confirmation is raised
    /// - [`Error::Connection`] if the channel drops during a step
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use bulk_dispatch::*;
    /// # async fn example(controller: BulkController, conn: connection::Connection) -> Result<()> {
    /// let outcome = controller.run(conn, BulkRunRequest::new(10, "^XA^FDhello^FS^XZ")).await?;
    /// println!("{outcome}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, conn: Connection, request: BulkRunRequest) -> Result<RunOutcome> {
        let address = conn.address().unwrap_or("<not connected>").to_string();
        let guard = self.begin_run(&request, &address)?;
        self.run_claimed(guard, conn, request).await
    }

    /// Run with the slot already claimed; closes `conn` and releases the slot
    pub(crate) async fn run_claimed(
        &self,
        guard: ActiveRunGuard,
        mut conn: Connection,
        request: BulkRunRequest,
    ) -> Result<RunOutcome> {
        let result = self.drive(&guard, &mut conn, &request).await;
        conn.close();
        if let Err(e) = &result {
            self.fail(guard.run_id(), e);
        }
        drop(guard);
        result
    }

    /// Validate the request and claim the single-run slot
    pub(crate) fn begin_run(
        &self,
        request: &BulkRunRequest,
        address: &str,
    ) -> Result<ActiveRunGuard> {
        if request.count == 0 {
            let err = Error::InvalidRequest("operation count must be at least 1".to_string());
            self.emit_log(None, LogLevel::Error, format!("Run rejected: {err}"));
            return Err(err);
        }

        let guard = match self
            .tracking
            .begin(request.count, address, request.cancel.clone())
        {
            Ok(guard) => guard,
            Err(err) => {
                self.emit_log(None, LogLevel::Warning, format!("Run rejected: {err}"));
                return Err(err);
            }
        };

        let run_id = guard.run_id();
        self.emit_event(Event::LogCleared);
        self.emit_event(Event::RunStarted {
            run_id,
            total: request.count,
            address: address.to_string(),
        });
        tracing::info!(
            run_id = %run_id,
            total = request.count,
            address,
            payload_bytes = request.payload.len(),
            "Bulk run accepted"
        );
        Ok(guard)
    }

    pub(crate) async fn drive(
        &self,
        guard: &ActiveRunGuard,
        conn: &mut Connection,
        request: &BulkRunRequest,
    ) -> Result<RunOutcome> {
        let run_id = guard.run_id();
        let total = request.count;
        let cancel = &request.cancel;

        if !conn.is_connected() {
            let err = Error::not_connected("start a bulk run");
            self.emit_log(Some(run_id), LogLevel::Error, format!("Cannot start: {err}"));
            return Err(err);
        }
        let address = conn.address().unwrap_or_default().to_string();

        self.set_state(run_id, RunState::AwaitingPreflightConfirmation);
        let prompt = format!("About to run {total} operations against {address}. Proceed?");
        let proceed = self
            .confirm(run_id, ConfirmationKind::Preflight { count: total }, prompt, cancel)
            .await;
        if !proceed {
            let outcome = if cancel.is_cancelled() {
                RunOutcome::CancelledByUser { at_step: 0 }
            } else {
                RunOutcome::DeclinedByUser
            };
            return Ok(self.finish(run_id, total, outcome));
        }

        self.set_state(run_id, RunState::Running);
        self.emit_log(
            Some(run_id),
            LogLevel::Info,
            format!("Starting {total} operations against {address}"),
        );

        for step in 1..=total {
            if cancel.is_cancelled() {
                let outcome = RunOutcome::CancelledByUser { at_step: step };
                return Ok(self.finish(run_id, total, outcome));
            }

            self.set_state(run_id, RunState::Executing { step });
            match self.executor.execute_one(conn, step, &request.payload).await {
                Ok(()) => {
                    self.tracking.update(|status| status.progress = step);
                    self.set_state(run_id, RunState::Succeeded { step });
                    self.emit_event(Event::Progress {
                        run_id,
                        current: step,
                        total,
                    });
                    self.emit_log(
                        Some(run_id),
                        LogLevel::Info,
                        format!("Operation {step} of {total} completed"),
                    );
                }
                Err(e)
                    if !conn.is_connected()
                        || matches!(e, OperationError::NotConnected { .. }) =>
                {
                    self.emit_log(
                        Some(run_id),
                        LogLevel::Error,
                        format!(
                            "Operation {step} of {total} failed: {e}. The connection is gone, stopping"
                        ),
                    );
                    return Err(match e {
                        OperationError::NotConnected { .. } => {
                            Error::not_connected(format!("run operation {step}"))
                        }
                        other => Error::Connection(ConnectionError::Lost {
                            reason: other.to_string(),
                        }),
                    });
                }
                Err(e) => {
                    self.emit_log(
                        Some(run_id),
                        LogLevel::Warning,
                        format!("Operation {step} of {total} failed: {e}"),
                    );
                    self.set_state(run_id, RunState::AwaitingErrorConfirmation { step });

                    let prompt = format!(
                        "Operation {step} of {total} failed: {e}. Continue with the remaining operations?"
                    );
                    let resume = self
                        .confirm(run_id, ConfirmationKind::StepError { step }, prompt, cancel)
                        .await;
                    if !resume {
                        let outcome = if cancel.is_cancelled() {
                            RunOutcome::CancelledByUser { at_step: step }
                        } else {
                            RunOutcome::StoppedAfterError { at_step: step }
                        };
                        return Ok(self.finish(run_id, total, outcome));
                    }

                    self.tracking.update(|status| status.skipped += 1);
                    self.emit_log(
                        Some(run_id),
                        LogLevel::Info,
                        format!("Skipping operation {step}, continuing"),
                    );
                }
            }

            if step < total && !self.pace(run_id, cancel).await {
                let outcome = RunOutcome::CancelledByUser { at_step: step };
                return Ok(self.finish(run_id, total, outcome));
            }
        }

        Ok(self.finish(run_id, total, RunOutcome::Completed { count: total }))
    }

    /// Ask the confirmation responder, publishing the round-trip as events
    async fn confirm(
        &self,
        run_id: RunId,
        kind: ConfirmationKind,
        prompt: String,
        cancel: &CancellationToken,
    ) -> bool {
        self.emit_event(Event::ConfirmationRequested {
            run_id,
            kind,
            prompt: prompt.clone(),
        });
        let approved = self.gate.request_confirmation(kind, prompt, cancel).await;
        self.emit_event(Event::ConfirmationResolved { run_id, approved });
        approved
    }

    /// Inter-step delay; returns `false` if cancelled before or during the wait
    async fn pace(&self, run_id: RunId, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let delay = self.config.run.pacing_delay;
        if delay.is_zero() {
            return true;
        }

        tracing::debug!(run_id = %run_id, delay_ms = delay.as_millis() as u64, "Pacing");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn finish(&self, run_id: RunId, total: u32, outcome: RunOutcome) -> RunOutcome {
        self.tracking
            .update(|status| status.last_outcome = Some(outcome));
        self.set_state(run_id, outcome.terminal_state());

        let skipped = self.tracking.snapshot().skipped;
        let (level, message) = match outcome {
            RunOutcome::Completed { .. } if skipped == 0 => (
                LogLevel::Info,
                format!("Finished: all {total} operations succeeded"),
            ),
            RunOutcome::Completed { .. } => (
                LogLevel::Warning,
                format!(
                    "Finished: {} of {total} operations succeeded, {skipped} skipped",
                    total - skipped
                ),
            ),
            RunOutcome::DeclinedByUser => {
                (LogLevel::Info, "Run declined, nothing was sent".to_string())
            }
            other => (LogLevel::Warning, format!("Run {other}")),
        };
        self.emit_log(Some(run_id), level, message);
        self.emit_event(Event::RunFinished { run_id, outcome });
        outcome
    }
}
