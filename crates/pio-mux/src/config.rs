//! Timing and link configuration

use std::time::Duration;

use pio_protocol::DEFAULT_BAUD_RATE;
use serde::{Deserialize, Serialize};

/// Transport worker timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How long the idle loop waits on the input queue before draining
    /// unsolicited output
    pub poll_interval_ms: u64,
    /// Ceiling on the wait for the first reply line of a transaction
    pub reply_ceiling_ms: u64,
    /// Quiet gap that ends a reply once lines have started arriving
    pub settle_ms: u64,
    /// How long `stopped()` waits for the worker task to exit
    pub shutdown_grace_ms: u64,
}

impl WorkerConfig {
    /// Idle poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// First-line reply ceiling
    pub fn reply_ceiling(&self) -> Duration {
        Duration::from_millis(self.reply_ceiling_ms)
    }

    /// Quiet gap ending a reply
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    /// Shutdown grace period
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            reply_ceiling_ms: 2_000,
            settle_ms: 100,
            shutdown_grace_ms: 2_000,
        }
    }
}

/// Caller-side configuration of a service channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Safety net on how long `invoke` waits for its reply
    pub response_timeout_ms: u64,
    /// Most unsolicited lines held for `take_unsolicited`; older lines are
    /// dropped first
    pub unsolicited_limit: usize,
}

impl ChannelConfig {
    /// Caller-side response ceiling
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 10_000,
            unsolicited_limit: 256,
        }
    }
}

/// Physical serial link parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Baud rate
    pub baud_rate: u32,
    /// Read timeout at the connection layer
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 2_000,
        }
    }
}
