//! Error types for bulk-dispatch
//!
//! This module provides the error hierarchy for the library:
//! - Connection-level failures ([`ConnectionError`]), never retried automatically
//! - Single-step failures ([`OperationError`]), which the controller turns into a
//!   user decision instead of propagating
//! - The crate-wide [`Error`] with HTTP status mapping for the control API
//!
//! Cancellation is deliberately absent here. A cancelled run is a terminal
//! [`RunOutcome`](crate::types::RunOutcome), not an error.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for bulk-dispatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bulk-dispatch
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "simulation.not_ready_rate")
        key: Option<String>,
    },

    /// Establishing or keeping the device connection failed
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// An operation that requires a live connection was attempted without one
    #[error("not connected: cannot {operation} while the connection is not open")]
    NotConnected {
        /// The operation that was attempted (e.g., "check readiness", "start run")
        operation: String,
    },

    /// The device answered the readiness check with "not ready"
    #[error("device not ready: {0}")]
    DeviceNotReady(String),

    /// A single unit operation failed
    #[error("operation error: {0}")]
    Operation(#[from] OperationError),

    /// Caller supplied an invalid request (e.g., zero operations)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A run is already active on this controller
    #[error("a bulk run is already in progress")]
    RunInProgress,

    /// There is no active run to act on
    #[error("no bulk run is currently active")]
    NoActiveRun,

    /// Resource not found (e.g., an already-answered confirmation)
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::NotConnected`]
    pub fn not_connected(operation: impl Into<String>) -> Self {
        Error::NotConnected {
            operation: operation.into(),
        }
    }

    /// Shorthand for [`Error::Config`] with a key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Connection-level failures
///
/// These are surfaced to the caller as-is. Nothing in the crate retries them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The endpoint actively refused the connection or the transport faulted while opening
    #[error("connection to {address} refused: {reason}")]
    Refused {
        /// Endpoint address as given by the caller
        address: String,
        /// Underlying reason reported by the transport
        reason: String,
    },

    /// The connection attempt did not complete in time
    #[error("connection to {address} timed out after {}ms", after.as_millis())]
    Timeout {
        /// Endpoint address as given by the caller
        address: String,
        /// How long we waited
        after: Duration,
    },

    /// An established channel dropped
    #[error("connection lost: {reason}")]
    Lost {
        /// Underlying reason reported by the transport
        reason: String,
    },

    /// The address string could not be turned into an endpoint
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress {
        /// The offending address
        address: String,
        /// Why it was rejected
        reason: String,
    },

    /// The connection was already closed and cannot be reopened
    #[error("connection is closed")]
    Closed,
}

/// Failure of a single unit operation
///
/// `NotSent` and `SentButFailed` are kept apart on purpose: the first means the
/// device never saw the payload, the second means some of it may have been acted on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OperationError {
    /// The executor was invoked without an open connection
    #[error("step {step}: connection is not open")]
    NotConnected {
        /// 1-based step number
        step: u32,
    },

    /// The device reported "not ready" on the pre-transmit readiness check
    #[error("step {step}: device not ready: {reason}")]
    NotReady {
        /// 1-based step number
        step: u32,
        /// Diagnostic returned by the device
        reason: String,
    },

    /// The readiness check itself failed (channel dropped while checking)
    #[error("step {step}: readiness check failed: {reason}")]
    ReadinessCheckFailed {
        /// 1-based step number
        step: u32,
        /// Underlying reason
        reason: String,
    },

    /// Transmission failed before any byte reached the device
    #[error("step {step}: payload not sent: {reason}")]
    NotSent {
        /// 1-based step number
        step: u32,
        /// Underlying reason
        reason: String,
    },

    /// Transmission failed after part of the payload was written
    #[error("step {step}: failed after sending {bytes_sent} bytes: {reason}")]
    SentButFailed {
        /// 1-based step number
        step: u32,
        /// Number of bytes written before the failure
        bytes_sent: usize,
        /// Underlying reason
        reason: String,
    },
}

impl OperationError {
    /// The step this error belongs to
    pub fn step(&self) -> u32 {
        match self {
            OperationError::NotConnected { step }
            | OperationError::NotReady { step, .. }
            | OperationError::ReadinessCheckFailed { step, .. }
            | OperationError::NotSent { step, .. }
            | OperationError::SentButFailed { step, .. } => *step,
        }
    }

    /// Whether any part of the payload may have reached the device
    pub fn was_partially_sent(&self) -> bool {
        matches!(self, OperationError::SentButFailed { bytes_sent, .. } if *bytes_sent > 0)
    }
}

/// API error response format
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "run_in_progress",
///     "message": "a bulk run is already in progress"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "run_in_progress")
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            Error::Config { .. } => 400,
            Error::InvalidRequest(_) => 400,

            Error::NotFound(_) => 404,

            Error::RunInProgress => 409,
            Error::NoActiveRun => 409,
            Error::NotConnected { .. } => 409,

            Error::Operation(_) => 422,

            // Device-side problems
            Error::Connection(_) => 502,
            Error::DeviceNotReady(_) => 503,

            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Connection(e) => match e {
                ConnectionError::Refused { .. } => "connection_refused",
                ConnectionError::Timeout { .. } => "connection_timeout",
                ConnectionError::Lost { .. } => "connection_lost",
                ConnectionError::InvalidAddress { .. } => "invalid_address",
                ConnectionError::Closed => "connection_closed",
            },
            Error::NotConnected { .. } => "not_connected",
            Error::DeviceNotReady(_) => "device_not_ready",
            Error::Operation(_) => "operation_failed",
            Error::InvalidRequest(_) => "invalid_request",
            Error::RunInProgress => "run_in_progress",
            Error::NoActiveRun => "no_active_run",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        let details = match &error {
            Error::Config { key: Some(key), .. } => Some(serde_json::json!({ "key": key })),
            Error::Connection(ConnectionError::Refused { address, .. })
            | Error::Connection(ConnectionError::InvalidAddress { address, .. }) => {
                Some(serde_json::json!({ "address": address }))
            }
            Error::Connection(ConnectionError::Timeout { address, after }) => {
                Some(serde_json::json!({
                    "address": address,
                    "timeout_ms": after.as_millis() as u64,
                }))
            }
            Error::NotConnected { operation } => {
                Some(serde_json::json!({ "operation": operation }))
            }
            Error::Operation(op) => Some(serde_json::json!({
                "step": op.step(),
                "partially_sent": op.was_partially_sent(),
            })),
            _ => None,
        };

        Self {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_error_converts_into_crate_error() {
        let err: Error = ConnectionError::Lost {
            reason: "peer reset".to_string(),
        }
        .into();

        assert!(matches!(err, Error::Connection(ConnectionError::Lost { .. })));
        assert_eq!(err.to_string(), "connection error: connection lost: peer reset");
    }

    #[test]
    fn timeout_message_reports_milliseconds() {
        let err = ConnectionError::Timeout {
            address: "10.0.0.5:9100".to_string(),
            after: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "connection to 10.0.0.5:9100 timed out after 1500ms"
        );
    }

    #[test]
    fn operation_error_reports_step_for_every_variant() {
        let cases = [
            OperationError::NotConnected { step: 1 },
            OperationError::NotReady {
                step: 2,
                reason: "media out".into(),
            },
            OperationError::ReadinessCheckFailed {
                step: 3,
                reason: "reset".into(),
            },
            OperationError::NotSent {
                step: 4,
                reason: "broken pipe".into(),
            },
            OperationError::SentButFailed {
                step: 5,
                bytes_sent: 10,
                reason: "reset".into(),
            },
        ];

        for (i, err) in cases.iter().enumerate() {
            assert_eq!(err.step(), i as u32 + 1, "wrong step for {err:?}");
        }
    }

    #[test]
    fn partial_send_is_distinguished_from_never_sent() {
        let never = OperationError::NotSent {
            step: 1,
            reason: "refused".into(),
        };
        let partial = OperationError::SentButFailed {
            step: 1,
            bytes_sent: 128,
            reason: "reset".into(),
        };

        assert!(!never.was_partially_sent());
        assert!(partial.was_partially_sent());
    }

    #[test]
    fn http_status_mapping_covers_run_conflicts() {
        assert_eq!(Error::RunInProgress.status_code(), 409);
        assert_eq!(Error::RunInProgress.error_code(), "run_in_progress");
        assert_eq!(Error::NoActiveRun.status_code(), 409);
        assert_eq!(Error::not_connected("start run").status_code(), 409);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::DeviceNotReady("paused".into()).status_code(), 503);
    }

    #[test]
    fn api_error_carries_operation_details() {
        let err = Error::Operation(OperationError::SentButFailed {
            step: 7,
            bytes_sent: 3,
            reason: "reset".into(),
        });
        let api: ApiError = err.into();

        assert_eq!(api.error.code, "operation_failed");
        let details = api.error.details.unwrap();
        assert_eq!(details["step"], 7);
        assert_eq!(details["partially_sent"], true);
    }

    #[test]
    fn api_error_carries_config_key() {
        let api: ApiError = Error::config("must be within [0, 1]", "simulation.latency").into();
        assert_eq!(api.error.code, "config_error");
        assert_eq!(api.error.details.unwrap()["key"], "simulation.latency");
    }
}
