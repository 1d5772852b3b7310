//! Application state for the API server

use crate::confirmation::{ConfirmationReceiver, ConfirmationRequest};
use crate::types::{ConfirmationId, ConfirmationKind};
use crate::{BulkController, Config};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The controller driving bulk runs
    pub controller: BulkController,

    /// Configuration (read-only)
    pub config: Arc<Config>,

    /// Confirmation waiting for an HTTP client to answer it
    pub(crate) pending: Arc<Mutex<Option<ConfirmationRequest>>>,
}

/// A confirmation as shown to HTTP clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct PendingConfirmation {
    /// ID to answer with `POST /confirmations/{id}`
    pub id: ConfirmationId,
    /// What is being asked
    pub kind: ConfirmationKind,
    /// Prompt text
    pub prompt: String,
}

impl AppState {
    /// Create a new AppState
    ///
    /// Spawns a task that moves incoming confirmation requests into the pending
    /// slot. The controller keeps at most one request outstanding, so a newer
    /// request replaces an older, already abandoned one.
    pub fn new(
        controller: BulkController,
        mut confirmations: ConfirmationReceiver,
        config: Arc<Config>,
    ) -> Self {
        let pending: Arc<Mutex<Option<ConfirmationRequest>>> = Arc::new(Mutex::new(None));

        let slot = pending.clone();
        tokio::spawn(async move {
            while let Some(request) = confirmations.recv().await {
                tracing::debug!(
                    confirmation_id = %request.id(),
                    "Confirmation parked for HTTP clients"
                );
                *slot.lock().await = Some(request);
            }
        });

        Self {
            controller,
            config,
            pending,
        }
    }

    /// The pending confirmation, dropping it if its run stopped waiting
    pub async fn pending_confirmation(&self) -> Option<PendingConfirmation> {
        let mut pending = self.pending.lock().await;
        if pending.as_ref().is_some_and(ConfirmationRequest::is_abandoned) {
            *pending = None;
        }
        pending.as_ref().map(|request| PendingConfirmation {
            id: request.id(),
            kind: request.kind(),
            prompt: request.prompt().to_string(),
        })
    }

    /// Answer the pending confirmation if its ID matches
    ///
    /// Returns `false` if nothing with that ID is pending or the run is no
    /// longer waiting for it.
    pub async fn answer_confirmation(&self, id: ConfirmationId, approve: bool) -> bool {
        let mut pending = self.pending.lock().await;
        match pending.take() {
            Some(request) if request.id() == id => {
                let delivered = request.respond(approve);
                tracing::info!(confirmation_id = %id, approve, delivered, "Confirmation answered");
                delivered
            }
            other => {
                *pending = other;
                false
            }
        }
    }
}
