//! Handshake configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::prober::ProbeSchedule;

/// Timing parameters for a handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeConfig {
    /// Sleep before the first probe in milliseconds
    #[serde(rename = "probe-base-ms", default = "default_probe_base_ms")]
    pub probe_base_ms: u64,

    /// Added to the probe sleep after every attempt, in milliseconds
    #[serde(rename = "probe-increment-ms", default = "default_probe_increment_ms")]
    pub probe_increment_ms: u64,

    /// Overall deadline for the exchange in milliseconds
    #[serde(rename = "deadline-ms", default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

fn default_probe_base_ms() -> u64 {
    100
}

fn default_probe_increment_ms() -> u64 {
    10
}

fn default_deadline_ms() -> u64 {
    5_000
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            probe_base_ms: default_probe_base_ms(),
            probe_increment_ms: default_probe_increment_ms(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl HandshakeConfig {
    pub fn schedule(&self) -> ProbeSchedule {
        debug!(
            probe_base_ms = self.probe_base_ms,
            probe_increment_ms = self.probe_increment_ms,
            "HandshakeConfig::schedule: called"
        );
        ProbeSchedule {
            base: Duration::from_millis(self.probe_base_ms),
            increment: Duration::from_millis(self.probe_increment_ms),
        }
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}
