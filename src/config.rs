//! Configuration types for bulk-dispatch

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use utoipa::ToSchema;

/// Which transport backs new connections
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Raw TCP socket to the device (default)
    #[default]
    Tcp,
    /// In-process simulated device with fault injection
    Simulated,
}

/// Remote device settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DeviceConfig {
    /// Default endpoint address (IP, host, or host:port). Can be overridden per run.
    #[serde(default)]
    pub address: Option<String>,

    /// Port used when the address does not carry one (default: 9100)
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// How long to wait for the connection to open (default: 5 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub connect_timeout: Duration,

    /// Upper bound for a single readiness probe (default: 2 seconds)
    #[serde(default = "default_readiness_timeout", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub readiness_timeout: Duration,

    /// Transport implementation
    #[serde(default)]
    pub transport: TransportKind,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            default_port: default_port(),
            connect_timeout: default_connect_timeout(),
            readiness_timeout: default_readiness_timeout(),
            transport: TransportKind::default(),
        }
    }
}

/// Bulk run behavior
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RunConfig {
    /// Fixed delay between consecutive steps so the device is not flooded (default: 500ms)
    #[serde(default = "default_pacing_delay", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub pacing_delay: Duration,

    /// Capacity of the event broadcast channel (default: 1000)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Capacity of the confirmation request channel (default: 8)
    #[serde(default = "default_confirmation_buffer")]
    pub confirmation_buffer: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pacing_delay: default_pacing_delay(),
            event_buffer: default_event_buffer(),
            confirmation_buffer: default_confirmation_buffer(),
        }
    }
}

/// Fault injection for the simulated transport
///
/// All rates are probabilities in `[0.0, 1.0]`, evaluated independently per call.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SimulationConfig {
    /// Probability that `connect` is refused (default: 0.0)
    #[serde(default)]
    pub connect_failure_rate: f64,

    /// Probability that a readiness check answers "not ready" (default: 0.05)
    #[serde(default = "default_not_ready_rate")]
    pub not_ready_rate: f64,

    /// Probability that a transmission fails (default: 0.1)
    #[serde(default = "default_transmit_failure_rate")]
    pub transmit_failure_rate: f64,

    /// Of the failed transmissions, the fraction that fail after a partial write (default: 0.5)
    #[serde(default = "default_partial_failure_rate")]
    pub partial_failure_rate: f64,

    /// Simulated per-operation latency (default: 50ms)
    #[serde(default = "default_latency", with = "duration_ms_serde")]
    #[schema(value_type = u64)]
    pub latency: Duration,

    /// Fixed RNG seed for reproducible runs (None = entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connect_failure_rate: 0.0,
            not_ready_rate: default_not_ready_rate(),
            transmit_failure_rate: default_transmit_failure_rate(),
            partial_failure_rate: default_partial_failure_rate(),
            latency: default_latency(),
            seed: None,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: any)
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
        }
    }
}

/// Main configuration for [`BulkController`](crate::BulkController)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Remote device settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Bulk run behavior
    #[serde(default)]
    pub run: RunConfig,

    /// Simulated transport fault injection
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Parse and validate a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let rates = [
            (
                "simulation.connect_failure_rate",
                self.simulation.connect_failure_rate,
            ),
            ("simulation.not_ready_rate", self.simulation.not_ready_rate),
            (
                "simulation.transmit_failure_rate",
                self.simulation.transmit_failure_rate,
            ),
            (
                "simulation.partial_failure_rate",
                self.simulation.partial_failure_rate,
            ),
        ];
        for (key, rate) in rates {
            if !(0.0..=1.0).contains(&rate) {
                return Err(Error::config(
                    format!("{key} must be within [0.0, 1.0], got {rate}"),
                    key,
                ));
            }
        }

        if self.run.event_buffer == 0 {
            return Err(Error::config(
                "event buffer must hold at least one event",
                "run.event_buffer",
            ));
        }
        if self.run.confirmation_buffer == 0 {
            return Err(Error::config(
                "confirmation buffer must hold at least one request",
                "run.confirmation_buffer",
            ));
        }
        if self.device.connect_timeout.is_zero() {
            return Err(Error::config(
                "connect timeout must be greater than zero",
                "device.connect_timeout",
            ));
        }

        Ok(())
    }
}

fn default_port() -> u16 {
    9100
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_readiness_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_pacing_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_event_buffer() -> usize {
    1000
}

fn default_confirmation_buffer() -> usize {
    8
}

fn default_not_ready_rate() -> f64 {
    0.05
}

fn default_transmit_failure_rate() -> f64 {
    0.1
}

fn default_partial_failure_rate() -> f64 {
    0.5
}

fn default_latency() -> Duration {
    Duration::from_millis(50)
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Duration serialization helper (integer milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
