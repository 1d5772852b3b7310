//! Confirmation gate: a synchronous yes/no round-trip to an external actor
//!
//! The controller never talks to the actor directly. [`ConfirmationGate`] sends a
//! [`ConfirmationRequest`] over a channel to whichever context services the
//! [`ConfirmationReceiver`] (a UI task, the HTTP API, or a [`ConfirmationPolicy`]),
//! then awaits the reply on a oneshot channel. From the run's point of view the
//! call blocks until the decision arrives.
//!
//! There is no timeout. An unanswered request waits until the run's cancellation
//! token fires, at which point the gate resolves to `false` and abandons the request.
//!
//! ```no_run
//! use bulk_dispatch::confirmation::{AutoApprove, ConfirmationGate};
//! use bulk_dispatch::types::ConfirmationKind;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let (gate, receiver) = ConfirmationGate::channel(8);
//! receiver.serve(AutoApprove);
//!
//! let cancel = CancellationToken::new();
//! let proceed = gate
//!     .request_confirmation(ConfirmationKind::Preflight { count: 3 }, "Proceed?", &cancel)
//!     .await;
//! assert!(proceed);
//! # }
//! ```

mod policy;

pub use policy::{AutoApprove, AutoDecline, ConfirmationPolicy, DeclineErrors};

use crate::types::{ConfirmationId, ConfirmationKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// One outstanding yes/no question
///
/// The reply slot is filled exactly once through [`respond`](Self::respond).
/// Dropping the request without answering counts as "declined".
#[derive(Debug)]
pub struct ConfirmationRequest {
    id: ConfirmationId,
    kind: ConfirmationKind,
    prompt: String,
    reply: oneshot::Sender<bool>,
}

impl ConfirmationRequest {
    /// Unique request ID
    pub fn id(&self) -> ConfirmationId {
        self.id
    }

    /// What is being asked
    pub fn kind(&self) -> ConfirmationKind {
        self.kind
    }

    /// Prompt text for the actor
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Whether the requester has already given up (e.g., the run was cancelled)
    pub fn is_abandoned(&self) -> bool {
        self.reply.is_closed()
    }

    /// Deliver the decision
    ///
    /// Returns `false` if the requester was no longer waiting.
    pub fn respond(self, approve: bool) -> bool {
        self.reply.send(approve).is_ok()
    }
}

/// Requesting side of the confirmation channel (cheap to clone)
#[derive(Clone)]
pub struct ConfirmationGate {
    tx: mpsc::Sender<ConfirmationRequest>,
    next_id: Arc<AtomicU64>,
    // Serializes round-trips so at most one request is outstanding
    outstanding: Arc<Mutex<()>>,
}

/// Servicing side of the confirmation channel
pub struct ConfirmationReceiver {
    rx: mpsc::Receiver<ConfirmationRequest>,
}

impl ConfirmationGate {
    /// Create a connected gate/receiver pair
    pub fn channel(capacity: usize) -> (ConfirmationGate, ConfirmationReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            ConfirmationGate {
                tx,
                next_id: Arc::new(AtomicU64::new(1)),
                outstanding: Arc::new(Mutex::new(())),
            },
            ConfirmationReceiver { rx },
        )
    }

    /// Ask the external actor and wait for the decision
    ///
    /// Resolves to `false` when:
    /// - `cancel` fires before the answer arrives
    /// - no receiver is attached anymore
    /// - the responder drops the request without answering
    pub async fn request_confirmation(
        &self,
        kind: ConfirmationKind,
        prompt: impl Into<String>,
        cancel: &CancellationToken,
    ) -> bool {
        let _outstanding = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            guard = self.outstanding.lock() => guard,
        };

        let (reply, decision) = oneshot::channel();
        let id = ConfirmationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let request = ConfirmationRequest {
            id,
            kind,
            prompt: prompt.into(),
            reply,
        };

        tracing::debug!(confirmation_id = %id, ?kind, "Requesting confirmation");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(confirmation_id = %id, "Cancelled before confirmation was delivered");
                return false;
            }
            sent = self.tx.send(request) => {
                if sent.is_err() {
                    tracing::warn!(
                        confirmation_id = %id,
                        "No confirmation responder attached, treating as declined"
                    );
                    return false;
                }
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(confirmation_id = %id, "Confirmation abandoned, run cancelled");
                false
            }
            decision = decision => match decision {
                Ok(approved) => {
                    tracing::debug!(confirmation_id = %id, approved, "Confirmation answered");
                    approved
                }
                Err(_) => {
                    tracing::warn!(
                        confirmation_id = %id,
                        "Responder dropped confirmation without answering, treating as declined"
                    );
                    false
                }
            },
        }
    }
}

impl ConfirmationReceiver {
    /// Wait for the next request; `None` once every gate is dropped
    pub async fn recv(&mut self) -> Option<ConfirmationRequest> {
        self.rx.recv().await
    }

    /// Service every request with `policy` on a background task
    pub fn serve<P>(mut self, policy: P) -> tokio::task::JoinHandle<()>
    where
        P: ConfirmationPolicy + 'static,
    {
        tokio::spawn(async move {
            tracing::debug!(policy = policy.name(), "Confirmation responder started");
            while let Some(request) = self.rx.recv().await {
                let approved = policy.decide(request.kind(), request.prompt()).await;
                let id = request.id();
                if !request.respond(approved) {
                    tracing::debug!(confirmation_id = %id, "Requester stopped waiting");
                }
            }
            tracing::debug!(policy = policy.name(), "Confirmation responder stopped");
        })
    }
}
