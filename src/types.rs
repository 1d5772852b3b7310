//! Core types for bulk-dispatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;

/// Unique identifier for a bulk run
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl From<u64> for RunId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an outstanding confirmation request
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct ConfirmationId(pub u64);

impl std::fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque bytes transmitted by one unit operation
///
/// The crate never interprets the contents; encoding for a particular device
/// is the caller's business.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wrap raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Answer to a readiness check
///
/// Produced fresh on every check. A `ready: false` result is a normal answer from
/// the device, unlike a dropped channel which surfaces as an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReadinessResult {
    /// Whether the device can accept work right now
    pub ready: bool,
    /// Optional diagnostic (e.g., "media out")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ReadinessResult {
    /// A plain "ready" answer
    pub fn ready() -> Self {
        Self {
            ready: true,
            message: None,
        }
    }

    /// A "not ready" answer with a diagnostic
    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: Some(message.into()),
        }
    }

    /// Diagnostic text, or a generic placeholder
    pub fn describe(&self) -> &str {
        self.message.as_deref().unwrap_or(if self.ready {
            "ready"
        } else {
            "device reported not ready"
        })
    }
}

/// Lifecycle of a device connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not (or no longer) connected; may connect again
    Disconnected,
    /// Open and usable for operations
    Connected,
    /// Closed for good
    Closed,
}

/// Controller state machine position
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// No run has started
    Idle,
    /// Waiting on the pre-flight "proceed?" decision
    AwaitingPreflightConfirmation,
    /// Pre-flight accepted, loop running
    Running,
    /// A unit operation is in flight
    Executing {
        /// 1-based step number
        step: u32,
    },
    /// The last step succeeded
    Succeeded {
        /// 1-based step number
        step: u32,
    },
    /// A step failed; waiting on the "continue?" decision
    AwaitingErrorConfirmation {
        /// 1-based step number
        step: u32,
    },
    /// Terminal: all steps processed
    Completed,
    /// Terminal: pre-flight declined
    Declined,
    /// Terminal: error confirmation declined
    StoppedAfterError,
    /// Terminal: cancellation observed
    Cancelled,
    /// Terminal: the run ended with an error (connection lost, device not ready, ...)
    Failed,
}

impl RunState {
    /// Whether this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed
                | RunState::Declined
                | RunState::StoppedAfterError
                | RunState::Cancelled
                | RunState::Failed
        )
    }
}

/// Terminal result of one bulk run; exactly one per invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The loop ran to the end
    Completed {
        /// Number of steps processed; failed steps the user chose to skip are
        /// counted in [`RunStatus::skipped`]
        count: u32,
    },
    /// The cancellation signal was observed
    CancelledByUser {
        /// Step being processed when cancellation was observed
        /// (0 = still at the pre-flight confirmation)
        at_step: u32,
    },
    /// The pre-flight confirmation was declined
    DeclinedByUser,
    /// A step failed and the user chose not to continue
    StoppedAfterError {
        /// The failed step
        at_step: u32,
    },
}

impl RunOutcome {
    /// The [`RunState`] this outcome terminates in
    pub fn terminal_state(&self) -> RunState {
        match self {
            RunOutcome::Completed { .. } => RunState::Completed,
            RunOutcome::CancelledByUser { .. } => RunState::Cancelled,
            RunOutcome::DeclinedByUser => RunState::Declined,
            RunOutcome::StoppedAfterError { .. } => RunState::StoppedAfterError,
        }
    }
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed { count } => write!(f, "completed {count} operations"),
            RunOutcome::CancelledByUser { at_step: 0 } => {
                write!(f, "cancelled before the first operation")
            }
            RunOutcome::CancelledByUser { at_step } => {
                write!(f, "cancelled at operation {at_step}")
            }
            RunOutcome::DeclinedByUser => write!(f, "declined before starting"),
            RunOutcome::StoppedAfterError { at_step } => {
                write!(f, "stopped after error at operation {at_step}")
            }
        }
    }
}

/// Parameters for one bulk run
#[derive(Clone, Debug)]
pub struct BulkRunRequest {
    /// Number of unit operations (must be at least 1)
    pub count: u32,
    /// Bytes sent by every unit operation
    pub payload: Payload,
    /// Shared cancellation signal; once cancelled it stays cancelled
    pub cancel: CancellationToken,
}

impl BulkRunRequest {
    /// Create a request with a fresh cancellation token
    pub fn new(count: u32, payload: impl Into<Payload>) -> Self {
        Self {
            count,
            payload: payload.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use a caller-owned cancellation token
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What a confirmation is asking about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationKind {
    /// "About to run N operations, proceed?"
    Preflight {
        /// Number of operations about to run
        count: u32,
    },
    /// "Step failed, continue?"
    StepError {
        /// The failed step
        step: u32,
    },
}

/// Severity of a user-facing log line
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Normal progress information
    Info,
    /// Recoverable problem
    Warning,
    /// Failure
    Error,
}

/// Event emitted during a bulk run
///
/// Events are published on a single broadcast channel in production order, so
/// every subscriber observes progress and log lines in step order.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A run was accepted and is about to ask for pre-flight confirmation
    RunStarted {
        /// Run ID
        run_id: RunId,
        /// Number of operations requested
        total: u32,
        /// Endpoint address
        address: String,
    },

    /// The controller moved to a new state
    StateChanged {
        /// Run ID
        run_id: RunId,
        /// New state
        state: RunState,
    },

    /// A step succeeded
    Progress {
        /// Run ID
        run_id: RunId,
        /// Number of the step that just succeeded (1..=total)
        current: u32,
        /// Total operations in the run
        total: u32,
    },

    /// Human-readable status line
    Log {
        /// Run the line belongs to, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        run_id: Option<RunId>,
        /// Severity
        level: LogLevel,
        /// Message text
        message: String,
        /// When the line was produced
        #[schema(value_type = String)]
        at: DateTime<Utc>,
    },

    /// The user-facing log should be cleared
    LogCleared,

    /// A confirmation was raised and is awaiting an answer
    ConfirmationRequested {
        /// Run ID
        run_id: RunId,
        /// What is being asked
        kind: ConfirmationKind,
        /// Prompt text
        prompt: String,
    },

    /// A confirmation was answered (or abandoned, which counts as declined)
    ConfirmationResolved {
        /// Run ID
        run_id: RunId,
        /// Final decision
        approved: bool,
    },

    /// A run ended with an error instead of an outcome
    RunFailed {
        /// Run ID
        run_id: RunId,
        /// Error description
        error: String,
    },

    /// A run reached its terminal outcome
    RunFinished {
        /// Run ID
        run_id: RunId,
        /// Terminal outcome
        outcome: RunOutcome,
    },
}

/// Point-in-time snapshot of the controller
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RunStatus {
    /// Current or most recent run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Current state
    pub state: RunState,
    /// Highest step reported as succeeded
    pub progress: u32,
    /// Failed steps skipped after the user chose to continue
    pub skipped: u32,
    /// Total operations in the current or most recent run
    pub total: u32,
    /// Endpoint of the current or most recent run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Outcome of the most recent finished run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<RunOutcome>,
    /// Error that ended the current or most recent run, if it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Whether a run is currently active
    pub active: bool,
}

impl Default for RunStatus {
    fn default() -> Self {
        Self {
            run_id: None,
            state: RunState::Idle,
            progress: 0,
            skipped: 0,
            total: 0,
            address: None,
            last_outcome: None,
            last_error: None,
            active: false,
        }
    }
}
