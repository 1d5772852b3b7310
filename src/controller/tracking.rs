//! Single-run slot and status snapshot

use crate::error::{Error, Result};
use crate::types::{RunId, RunState, RunStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ActiveRun {
    id: RunId,
    cancel: CancellationToken,
}

/// Shared run bookkeeping
///
/// Plain `std::sync` locks: every critical section is short and never held
/// across an await point.
#[derive(Clone, Default)]
pub(crate) struct RunTracking {
    active: Arc<Mutex<Option<ActiveRun>>>,
    status: Arc<RwLock<RunStatus>>,
    next_run_id: Arc<AtomicU64>,
}

impl RunTracking {
    /// Claim the run slot
    ///
    /// Fails with [`Error::RunInProgress`] while another run holds it.
    pub(crate) fn begin(
        &self,
        total: u32,
        address: &str,
        cancel: CancellationToken,
    ) -> Result<ActiveRunGuard> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(Error::RunInProgress);
        }

        let id = RunId(self.next_run_id.fetch_add(1, Ordering::Relaxed) + 1);
        *active = Some(ActiveRun { id, cancel });
        drop(active);

        self.update(|status| {
            status.run_id = Some(id);
            status.state = RunState::Idle;
            status.progress = 0;
            status.skipped = 0;
            status.total = total;
            status.address = Some(address.to_string());
            status.last_error = None;
            status.active = true;
        });

        Ok(ActiveRunGuard {
            run_id: id,
            tracking: self.clone(),
        })
    }

    /// ID of the run holding the slot
    pub(crate) fn active_run(&self) -> Option<RunId> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|run| run.id)
    }

    /// Fire the active run's cancellation token
    pub(crate) fn cancel_active(&self) -> Option<RunId> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.as_ref().map(|run| {
            run.cancel.cancel();
            run.id
        })
    }

    pub(crate) fn snapshot(&self) -> RunStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn update(&self, apply: impl FnOnce(&mut RunStatus)) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        apply(&mut status);
    }

    fn release(&self, run_id: RunId) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|run| run.id == run_id) {
            *active = None;
        }
        drop(active);
        self.update(|status| {
            if status.run_id == Some(run_id) {
                status.active = false;
            }
        });
    }
}

/// Holds the run slot; releases it on drop
///
/// Dropped on every exit path of a run, including panics and aborted tasks.
#[derive(Debug)]
pub(crate) struct ActiveRunGuard {
    run_id: RunId,
    tracking: RunTracking,
}

impl ActiveRunGuard {
    pub(crate) fn run_id(&self) -> RunId {
        self.run_id
    }
}

impl Drop for ActiveRunGuard {
    fn drop(&mut self) {
        self.tracking.release(self.run_id);
    }
}

impl std::fmt::Debug for RunTracking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunTracking")
            .field("active", &self.active_run())
            .finish()
    }
}
