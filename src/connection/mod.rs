//! Stateful channel to one remote device
//!
//! [`Connection`] owns a [`Transport`] and enforces the connection lifecycle:
//!
//! ```text
//! Disconnected --connect--> Connected --close--> Closed
//!      ^                        |
//!      +------ channel lost ----+
//! ```
//!
//! Operations are refused unless the state is `Connected`. `close()` is idempotent
//! and also runs from `Drop`, so a connection is released on every exit path,
//! including aborted tasks.
//!
//! Two transports are provided:
//!
//! - [`TcpTransport`]: raw TCP socket (e.g., port 9100 on a network printer)
//! - [`SimulatedTransport`]: in-process device with randomized fault injection

mod simulated;
mod tcp;
mod traits;

pub use simulated::{SimulatedTransport, SimulatedTransportFactory};
pub use tcp::{TcpTransport, TcpTransportFactory, resolve_endpoint};
pub use traits::{TransmitError, Transport, TransportFactory};

use crate::config::{Config, TransportKind};
use crate::error::{ConnectionError, Error, Result};
use crate::types::{ConnectionState, ReadinessResult};
use std::sync::Arc;

/// A single device connection
pub struct Connection {
    transport: Box<dyn Transport>,
    address: Option<String>,
    state: ConnectionState,
}

impl Connection {
    /// Wrap an unopened transport
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            address: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Address passed to the last `connect` call
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether operations may use this connection
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Open the channel to `address`
    ///
    /// Connecting an already-open connection to the same address is a no-op.
    /// A closed connection cannot be reopened.
    pub async fn connect(&mut self, address: &str) -> std::result::Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Closed => return Err(ConnectionError::Closed),
            ConnectionState::Connected => {
                if self.address.as_deref() == Some(address) {
                    return Ok(());
                }
                return Err(ConnectionError::InvalidAddress {
                    address: address.to_string(),
                    reason: format!(
                        "connection is already open to {}",
                        self.address.as_deref().unwrap_or("another endpoint")
                    ),
                });
            }
            ConnectionState::Disconnected => {}
        }

        self.address = Some(address.to_string());
        match self.transport.open(address).await {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                tracing::info!(
                    address,
                    transport = self.transport.name(),
                    "Connected to device"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(address, error = %e, "Failed to connect to device");
                Err(e)
            }
        }
    }

    /// Ask the device whether it can accept work
    ///
    /// A lost channel is an error and moves the connection back to `Disconnected`;
    /// a device that answers "not ready" is a normal `Ok` result.
    pub async fn is_ready(&mut self) -> Result<ReadinessResult> {
        if !self.is_connected() {
            return Err(Error::not_connected("check readiness"));
        }

        match self.transport.probe().await {
            Ok(readiness) => Ok(readiness),
            Err(e) => {
                self.mark_lost(&e);
                Err(Error::Connection(e))
            }
        }
    }

    /// Write one payload to the device
    ///
    /// Callers are expected to check [`is_connected`](Self::is_connected) first;
    /// sending on a connection that is not open fails without touching the transport.
    pub async fn send(&mut self, payload: &[u8]) -> std::result::Result<(), TransmitError> {
        if !self.is_connected() {
            return Err(TransmitError::new(0, "connection is not open"));
        }

        let result = self.transport.send(payload).await;
        if let Err(e) = &result
            && e.connection_lost
        {
            self.mark_lost(&ConnectionError::Lost {
                reason: e.reason.clone(),
            });
        }
        result
    }

    /// Close the connection. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.transport.close();
        self.state = ConnectionState::Closed;
        tracing::debug!(
            address = self.address.as_deref().unwrap_or("<never connected>"),
            "Connection closed"
        );
    }

    fn mark_lost(&mut self, error: &ConnectionError) {
        if self.state == ConnectionState::Connected {
            tracing::warn!(
                address = self.address.as_deref().unwrap_or_default(),
                error = %error,
                "Device connection lost"
            );
            self.state = ConnectionState::Disconnected;
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.state != ConnectionState::Closed {
            tracing::debug!("Connection dropped while open, closing");
            self.close();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport.name())
            .field("address", &self.address)
            .field("state", &self.state)
            .finish()
    }
}

/// Pick the transport factory described by the configuration
pub fn transport_factory_for(config: &Config) -> Arc<dyn TransportFactory> {
    let factory: Arc<dyn TransportFactory> = match config.device.transport {
        TransportKind::Tcp => Arc::new(TcpTransportFactory::new(&config.device)),
        TransportKind::Simulated => Arc::new(SimulatedTransportFactory::new(
            config.simulation.clone(),
        )),
    };

    tracing::info!(transport = factory.name(), "Transport initialized");
    factory
}
