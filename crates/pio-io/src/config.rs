//! Device client configuration
//!
//! Loaded from JSON of the form:
//!
//! ```json
//! {
//!   "interface": "/dev/ttyACM0",
//!   "inputs": { "in0": 0, "in2": 2 },
//!   "outputs": { "out1": 1, "out3": 3 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use pio_mux::{PortRegistry, SerialConfig, WorkerConfig};
use serde::{Deserialize, Serialize};

use crate::error::IoError;

/// Which port to use and the names of the digital pins
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IoConfig {
    /// Serial port of the board
    pub interface: String,
    /// Input pins by name
    #[serde(default)]
    pub inputs: BTreeMap<String, u8>,
    /// Output pins by name
    #[serde(default)]
    pub outputs: BTreeMap<String, u8>,
    /// Link speed override, applied by [`IoConfig::serial_config`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
}

impl IoConfig {
    /// Configuration for a port with no named pins
    pub fn for_interface(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, IoError> {
        let config: IoConfig =
            serde_json::from_str(json).map_err(|e| IoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| IoError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Check that the configuration can be applied
    pub fn validate(&self) -> Result<(), IoError> {
        if self.interface.trim().is_empty() {
            return Err(IoError::Config("interface is empty".into()));
        }
        if let Some((name, pin)) = self
            .outputs
            .iter()
            .find(|(_, pin)| self.inputs.values().any(|p| p == *pin))
        {
            return Err(IoError::Config(format!(
                "pin {} ({}) is configured as both input and output",
                pin, name
            )));
        }
        Ok(())
    }

    /// Serial link settings with the configured baud rate applied
    pub fn serial_config(&self) -> SerialConfig {
        let mut serial = SerialConfig::default();
        if let Some(baud_rate) = self.baud_rate {
            serial.baud_rate = baud_rate;
        }
        serial
    }

    /// Registry that opens serial ports with this configuration's link settings
    pub fn serial_registry(&self, worker: WorkerConfig) -> PortRegistry {
        PortRegistry::serial(self.serial_config(), worker)
    }

    /// Resolve a configured pin name or a plain pin index
    pub fn resolve_pin(&self, name_or_pin: &str) -> Result<u8, IoError> {
        let key = name_or_pin.trim();
        if let Some(pin) = self.inputs.get(key).or_else(|| self.outputs.get(key)) {
            return Ok(*pin);
        }
        key.parse()
            .map_err(|_| IoError::UnknownPin(name_or_pin.to_string()))
    }
}
