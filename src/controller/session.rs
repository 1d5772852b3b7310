//! Connect-then-run convenience and background runs.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::types::{BulkRunRequest, LogLevel, RunId, RunOutcome};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::BulkController;
use super::tracking::ActiveRunGuard;

/// Handle to a run executing on a background task
#[derive(Debug)]
pub struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
    task: JoinHandle<Result<RunOutcome>>,
}

impl RunHandle {
    /// ID of the spawned run
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Signal cancellation; the run stops at its next check
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the background task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the terminal outcome
    pub async fn join(self) -> Result<RunOutcome> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("run task failed: {e}")))?
    }
}

impl BulkController {
    /// Open a fresh connection to `address`, check readiness, then [`run`](Self::run)
    ///
    /// The connection is built by the configured transport factory and closed on
    /// every path, including a failed connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Connection`] if the connection cannot be opened
    /// - [`Error::DeviceNotReady`] if the device answers "not ready"
    /// - [`Error::Connection`] if the readiness check loses the channel
    /// - anything [`run`](Self::run) returns
    pub async fn connect_and_run(
        &self,
        address: &str,
        request: BulkRunRequest,
    ) -> Result<RunOutcome> {
        let conn = Connection::new(self.transports.create());
        let guard = self.begin_run(&request, address)?;
        self.connect_and_run_claimed(guard, conn, address, request)
            .await
    }

    /// Run over `conn` on a background task
    ///
    /// The run slot is claimed before this returns, so a second call while the
    /// first is still running fails immediately with [`Error::RunInProgress`].
    pub fn spawn_run(&self, conn: Connection, request: BulkRunRequest) -> Result<RunHandle> {
        let address = conn.address().unwrap_or("<not connected>").to_string();
        let guard = self.begin_run(&request, &address)?;
        let run_id = guard.run_id();
        let cancel = request.cancel.clone();

        let controller = self.clone();
        let task = tokio::spawn(async move { controller.run_claimed(guard, conn, request).await });

        Ok(RunHandle {
            run_id,
            cancel,
            task,
        })
    }

    /// [`connect_and_run`](Self::connect_and_run) on a background task
    pub fn spawn_connect_and_run(
        &self,
        address: impl Into<String>,
        request: BulkRunRequest,
    ) -> Result<RunHandle> {
        let address = address.into();
        let conn = Connection::new(self.transports.create());
        let guard = self.begin_run(&request, &address)?;
        let run_id = guard.run_id();
        let cancel = request.cancel.clone();

        let controller = self.clone();
        let task = tokio::spawn(async move {
            controller
                .connect_and_run_claimed(guard, conn, &address, request)
                .await
        });

        Ok(RunHandle {
            run_id,
            cancel,
            task,
        })
    }

    async fn connect_and_run_claimed(
        &self,
        guard: ActiveRunGuard,
        mut conn: Connection,
        address: &str,
        request: BulkRunRequest,
    ) -> Result<RunOutcome> {
        if let Err(e) = self.open_session(guard.run_id(), &mut conn, address).await {
            conn.close();
            self.fail(guard.run_id(), &e);
            return Err(e);
        }

        self.run_claimed(guard, conn, request).await
    }

    /// Connect `conn` to `address` and confirm the device is ready
    async fn open_session(&self, run_id: RunId, conn: &mut Connection, address: &str) -> Result<()> {
        let run_id = Some(run_id);
        self.emit_log(run_id, LogLevel::Info, format!("Connecting to {address}"));

        if let Err(e) = conn.connect(address).await {
            self.emit_log(
                run_id,
                LogLevel::Error,
                format!("Could not connect to {address}: {e}"),
            );
            return Err(e.into());
        }

        match conn.is_ready().await {
            Ok(readiness) if readiness.ready => Ok(()),
            Ok(readiness) => {
                let reason = readiness.describe().to_string();
                self.emit_log(
                    run_id,
                    LogLevel::Error,
                    format!("Device at {address} is not ready: {reason}"),
                );
                Err(Error::DeviceNotReady(reason))
            }
            Err(e) => {
                self.emit_log(
                    run_id,
                    LogLevel::Error,
                    format!("Readiness check against {address} failed: {e}"),
                );
                Err(e)
            }
        }
    }
}
