//! Transport abstraction behind [`Connection`](super::Connection)

use crate::error::ConnectionError;
use crate::types::ReadinessResult;
use async_trait::async_trait;
use thiserror::Error;

/// Failure while writing a payload
///
/// `bytes_sent` records how much of the payload left before the failure, so callers
/// can tell "never sent" apart from "sent, then failed".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason} ({bytes_sent} bytes sent)")]
pub struct TransmitError {
    /// Bytes written before the failure
    pub bytes_sent: usize,
    /// Underlying reason
    pub reason: String,
    /// Whether the channel is gone and the connection must be considered dropped
    pub connection_lost: bool,
}

impl TransmitError {
    /// Failure that leaves the channel usable
    pub fn new(bytes_sent: usize, reason: impl Into<String>) -> Self {
        Self {
            bytes_sent,
            reason: reason.into(),
            connection_lost: false,
        }
    }

    /// Failure that also tore down the channel
    pub fn lost(bytes_sent: usize, reason: impl Into<String>) -> Self {
        Self {
            bytes_sent,
            reason: reason.into(),
            connection_lost: true,
        }
    }
}

/// Low-level channel to one remote endpoint
///
/// Implementations only move bytes and answer readiness probes; state tracking
/// (Disconnected/Connected/Closed) lives in [`Connection`](super::Connection).
#[async_trait]
pub trait Transport: Send {
    /// Open the channel to `address`
    async fn open(&mut self, address: &str) -> Result<(), ConnectionError>;

    /// Ask the endpoint whether it can accept work
    ///
    /// Returns `Err(ConnectionError::Lost)` if the channel dropped while checking.
    async fn probe(&mut self) -> Result<ReadinessResult, ConnectionError>;

    /// Write one payload
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError>;

    /// Release the channel. Called exactly once per [`Connection`](super::Connection).
    fn close(&mut self);

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Creates a fresh transport for every connection
pub trait TransportFactory: Send + Sync {
    /// Build a new, unopened transport
    fn create(&self) -> Box<dyn Transport>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}
