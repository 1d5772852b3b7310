//! Simulated device with randomized fault injection
//!
//! Useful for demos and for exercising the confirmation flow without hardware.
//! Failure probabilities come from [`SimulationConfig`]; a fixed seed makes a run
//! reproducible.

use super::traits::{TransmitError, Transport, TransportFactory};
use crate::config::SimulationConfig;
use crate::error::ConnectionError;
use crate::types::ReadinessResult;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};

const NOT_READY_DIAGNOSTICS: &[&str] = &[
    "print head open",
    "media out",
    "ribbon out",
    "device paused",
    "buffer full",
];

/// In-process device that fails at configurable rates
pub struct SimulatedTransport {
    config: SimulationConfig,
    rng: StdRng,
    open: bool,
}

impl SimulatedTransport {
    /// Create a simulated device; `seed` fixes the fault sequence
    pub fn new(config: SimulationConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            open: false,
        }
    }

    fn roll(&mut self, rate: f64) -> bool {
        self.rng.gen_bool(rate.clamp(0.0, 1.0))
    }

    async fn latency(&self) {
        if !self.config.latency.is_zero() {
            tokio::time::sleep(self.config.latency).await;
        }
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&mut self, address: &str) -> Result<(), ConnectionError> {
        self.latency().await;
        if self.roll(self.config.connect_failure_rate) {
            return Err(ConnectionError::Refused {
                address: address.to_string(),
                reason: "simulated device refused the connection".to_string(),
            });
        }
        self.open = true;
        Ok(())
    }

    async fn probe(&mut self) -> Result<ReadinessResult, ConnectionError> {
        if !self.open {
            return Err(ConnectionError::Lost {
                reason: "simulated device is not connected".to_string(),
            });
        }
        if self.roll(self.config.not_ready_rate) {
            let diagnostic = NOT_READY_DIAGNOSTICS
                .choose(&mut self.rng)
                .copied()
                .unwrap_or("device not ready");
            return Ok(ReadinessResult::not_ready(diagnostic));
        }
        Ok(ReadinessResult::ready())
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransmitError> {
        if !self.open {
            return Err(TransmitError::lost(0, "simulated device is not connected"));
        }
        self.latency().await;

        if self.roll(self.config.transmit_failure_rate) {
            if payload.len() > 1 && self.roll(self.config.partial_failure_rate) {
                let sent = self.rng.gen_range(1..payload.len());
                return Err(TransmitError::new(
                    sent,
                    "simulated device stopped acknowledging mid-payload",
                ));
            }
            return Err(TransmitError::new(0, "simulated device rejected the payload"));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Builds [`SimulatedTransport`]s; with a configured seed, each transport gets
/// `seed + n` so consecutive connections differ but stay reproducible.
pub struct SimulatedTransportFactory {
    config: SimulationConfig,
    created: AtomicU64,
}

impl SimulatedTransportFactory {
    /// Create a factory from simulation settings
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            created: AtomicU64::new(0),
        }
    }
}

impl TransportFactory for SimulatedTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        let n = self.created.fetch_add(1, Ordering::Relaxed);
        let seed = self.config.seed.map(|seed| seed.wrapping_add(n));
        Box::new(SimulatedTransport::new(self.config.clone(), seed))
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
