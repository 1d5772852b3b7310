//! Unit operation execution
//!
//! The controller drives steps through the [`UnitExecutor`] trait so that tests
//! can substitute a deterministic double. [`TransmitExecutor`] is the production
//! implementation: re-check readiness, then write the payload.

use crate::connection::Connection;
use crate::error::{Error, OperationError};
use crate::types::Payload;
use async_trait::async_trait;

/// Performs one unit of work against an open connection
#[async_trait]
pub trait UnitExecutor: Send + Sync {
    /// Execute step `step` (1-based) with `payload`
    ///
    /// # Errors
    ///
    /// - [`OperationError::NotConnected`] if `conn` is not open
    /// - [`OperationError::NotReady`] / [`OperationError::ReadinessCheckFailed`]
    ///   if the pre-transmit readiness check does not pass
    /// - [`OperationError::NotSent`] / [`OperationError::SentButFailed`] if the
    ///   transmission fails before or after bytes went out
    async fn execute_one(
        &self,
        conn: &mut Connection,
        step: u32,
        payload: &Payload,
    ) -> Result<(), OperationError>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Re-checks readiness and transmits the payload
#[derive(Debug, Default, Clone, Copy)]
pub struct TransmitExecutor;

#[async_trait]
impl UnitExecutor for TransmitExecutor {
    async fn execute_one(
        &self,
        conn: &mut Connection,
        step: u32,
        payload: &Payload,
    ) -> Result<(), OperationError> {
        if !conn.is_connected() {
            return Err(OperationError::NotConnected { step });
        }

        match conn.is_ready().await {
            Ok(readiness) if readiness.ready => {}
            Ok(readiness) => {
                return Err(OperationError::NotReady {
                    step,
                    reason: readiness.describe().to_string(),
                });
            }
            Err(Error::NotConnected { .. }) => return Err(OperationError::NotConnected { step }),
            Err(e) => {
                return Err(OperationError::ReadinessCheckFailed {
                    step,
                    reason: e.to_string(),
                });
            }
        }

        conn.send(payload.as_bytes()).await.map_err(|e| {
            if e.bytes_sent == 0 {
                OperationError::NotSent {
                    step,
                    reason: e.reason,
                }
            } else {
                OperationError::SentButFailed {
                    step,
                    bytes_sent: e.bytes_sent,
                    reason: e.reason,
                }
            }
        })?;

        tracing::debug!(step, bytes = payload.len(), "Payload transmitted");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "transmit"
    }
}
