//! Raw TCP transport

use super::traits::{TransmitError, Transport, TransportFactory};
use crate::config::DeviceConfig;
use crate::error::ConnectionError;
use crate::types::ReadinessResult;
use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Interest};
use tokio::net::TcpStream;

/// Turn a caller-supplied address into a connectable `host:port`
///
/// Accepts `ip:port`, a bare IP (v4 or v6), `host:port`, or a bare host name.
/// Addresses without a port get `default_port`.
///
/// # Examples
///
/// ```
/// use bulk_dispatch::connection::resolve_endpoint;
///
/// assert_eq!(resolve_endpoint("192.168.1.40", 9100).unwrap(), "192.168.1.40:9100");
/// assert_eq!(resolve_endpoint("printer.local:6101", 9100).unwrap(), "printer.local:6101");
/// ```
pub fn resolve_endpoint(address: &str, default_port: u16) -> Result<String, ConnectionError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ConnectionError::InvalidAddress {
            address: address.to_string(),
            reason: "address is empty".to_string(),
        });
    }

    if let Ok(socket) = trimmed.parse::<SocketAddr>() {
        return Ok(socket.to_string());
    }
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port).to_string());
    }

    match trimmed.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() || port.parse::<u16>().is_err() {
                return Err(ConnectionError::InvalidAddress {
                    address: address.to_string(),
                    reason: "expected host:port with a numeric port".to_string(),
                });
            }
            Ok(trimmed.to_string())
        }
        None => Ok(format!("{trimmed}:{default_port}")),
    }
}

/// Transport over a plain TCP socket
pub struct TcpTransport {
    stream: Option<TcpStream>,
    default_port: u16,
    connect_timeout: Duration,
    readiness_timeout: Duration,
}

impl TcpTransport {
    /// Create an unopened transport
    pub fn new(default_port: u16, connect_timeout: Duration, readiness_timeout: Duration) -> Self {
        Self {
            stream: None,
            default_port,
            connect_timeout,
            readiness_timeout,
        }
    }
}

fn is_disconnect(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
    )
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self, address: &str) -> Result<(), ConnectionError> {
        let endpoint = resolve_endpoint(address, self.default_port)?;

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(endpoint.as_str()),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(ConnectionError::Refused {
                    address: address.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Err(ConnectionError::Timeout {
                    address: address.to_string(),
                    after: self.connect_timeout,
                });
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "Could not set TCP_NODELAY");
        }

        self.stream = Some(stream);
        Ok(())
    }

    async fn probe(&mut self) -> Result<ReadinessResult, ConnectionError> {
        let stream = self.stream.as_ref().ok_or_else(|| ConnectionError::Lost {
            reason: "no open socket".to_string(),
        })?;

        if let Ok(Some(e)) = stream.take_error() {
            return Err(ConnectionError::Lost {
                reason: e.to_string(),
            });
        }

        let ready = match tokio::time::timeout(
            self.readiness_timeout,
            stream.ready(Interest::READABLE | Interest::WRITABLE),
        )
        .await
        {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                return Err(ConnectionError::Lost {
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                return Ok(ReadinessResult::not_ready(format!(
                    "device did not respond within {}ms",
                    self.readiness_timeout.as_millis()
                )));
            }
        };

        if ready.is_read_closed() || ready.is_write_closed() {
            return Err(ConnectionError::Lost {
                reason: "peer closed the connection".to_string(),
            });
        }

        // Pending status bytes from the device are left in the socket; only EOF matters here
        if ready.is_readable() {
            let mut buf = [0u8; 1];
            match stream.peek(&mut buf).await {
                Ok(0) => {
                    return Err(ConnectionError::Lost {
                        reason: "peer closed the connection".to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    return Err(ConnectionError::Lost {
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !ready.is_writable() {
            match tokio::time::timeout(self.readiness_timeout, stream.writable()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(ConnectionError::Lost {
                        reason: e.to_string(),
                    });
                }
                Err(_) => {
                    return Ok(ReadinessResult::not_ready(
                        "device is not accepting data (send buffer full)",
                    ));
                }
            }
        }

        Ok(ReadinessResult::ready())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| TransmitError::lost(0, "no open socket"))?;

        let mut written = 0;
        while written < payload.len() {
            match stream.write(&payload[written..]).await {
                Ok(0) => {
                    return Err(TransmitError::lost(
                        written,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => written += n,
                Err(e) if is_disconnect(&e) => {
                    return Err(TransmitError::lost(written, e.to_string()));
                }
                Err(e) => return Err(TransmitError::new(written, e.to_string())),
            }
        }

        stream.flush().await.map_err(|e| {
            if is_disconnect(&e) {
                TransmitError::lost(written, e.to_string())
            } else {
                TransmitError::new(written, e.to_string())
            }
        })
    }

    fn close(&mut self) {
        // Dropping the stream closes the socket
        self.stream.take();
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

/// Builds [`TcpTransport`]s from device settings
pub struct TcpTransportFactory {
    default_port: u16,
    connect_timeout: Duration,
    readiness_timeout: Duration,
}

impl TcpTransportFactory {
    /// Capture the relevant device settings
    pub fn new(device: &DeviceConfig) -> Self {
        Self {
            default_port: device.default_port,
            connect_timeout: device.connect_timeout,
            readiness_timeout: device.readiness_timeout,
        }
    }
}

impl TransportFactory for TcpTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(TcpTransport::new(
            self.default_port,
            self.connect_timeout,
            self.readiness_timeout,
        ))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}
