//! Logical services sharing a serial port

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// A logical class of device capability that can share a physical port
/// with other services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ServiceId {
    /// General purpose digital inputs and outputs
    DigitalIo,
    /// Relay outputs
    Relay,
    /// SPI bridge
    Spi,
}

impl ServiceId {
    /// Every service
    pub const ALL: [ServiceId; 3] = [ServiceId::DigitalIo, ServiceId::Relay, ServiceId::Spi];

    /// Short name used in logs and configuration
    pub fn name(&self) -> &'static str {
        match self {
            ServiceId::DigitalIo => "dio",
            ServiceId::Relay => "relay",
            ServiceId::Spi => "spi",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServiceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dio" | "digital_io" | "digitalio" => Ok(ServiceId::DigitalIo),
            "relay" => Ok(ServiceId::Relay),
            "spi" => Ok(ServiceId::Spi),
            _ => Err(ParseError::UnknownService(s.to_string())),
        }
    }
}
