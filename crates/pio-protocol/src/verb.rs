//! Command verbs
//!
//! Every request line starts with a verb, and every well-formed reply echoes
//! the verb it answers. The wire spelling is the upper-case snake name.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::service::ServiceId;

/// Command keyword understood by both ends of the line protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verb {
    /// Firmware version: `VERSION`
    Version,
    /// Command summary: `HELP`
    Help,
    /// Set pin direction: `DIO_DIRECTION <pin> <IN|OUT>`
    DioDirection,
    /// Pin table: `DIO_LIST`
    DioList,
    /// Drive an output low: `DIO_CLEAR <pin>`
    DioClear,
    /// Drive an output high: `DIO_SET <pin>`
    DioSet,
    /// Read a pin: `DIO_READ <pin>`
    DioRead,
    /// Relay table: `RELAY_LIST`
    RelayList,
    /// Close a relay: `RELAY_SET <relay>`
    RelaySet,
    /// Open a relay: `RELAY_CLEAR <relay>`
    RelayClear,
    /// Read a relay: `RELAY_READ <relay>`
    RelayRead,
    /// Write bytes on the SPI bus: `SPI_SEND <hex bytes>`
    SpiSend,
    /// Read bytes from the SPI bus: `SPI_RECEIVE <hex length>`
    SpiReceive,
}

impl Verb {
    /// Every verb, in protocol table order
    pub const ALL: [Verb; 13] = [
        Verb::Version,
        Verb::Help,
        Verb::DioDirection,
        Verb::DioList,
        Verb::DioClear,
        Verb::DioSet,
        Verb::DioRead,
        Verb::RelayList,
        Verb::RelaySet,
        Verb::RelayClear,
        Verb::RelayRead,
        Verb::SpiSend,
        Verb::SpiReceive,
    ];

    /// Wire spelling of the verb
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Version => "VERSION",
            Verb::Help => "HELP",
            Verb::DioDirection => "DIO_DIRECTION",
            Verb::DioList => "DIO_LIST",
            Verb::DioClear => "DIO_CLEAR",
            Verb::DioSet => "DIO_SET",
            Verb::DioRead => "DIO_READ",
            Verb::RelayList => "RELAY_LIST",
            Verb::RelaySet => "RELAY_SET",
            Verb::RelayClear => "RELAY_CLEAR",
            Verb::RelayRead => "RELAY_READ",
            Verb::SpiSend => "SPI_SEND",
            Verb::SpiReceive => "SPI_RECEIVE",
        }
    }

    /// Service that owns this verb, or `None` for the shared verbs
    /// (`VERSION`, `HELP`) any service may issue
    pub fn service(&self) -> Option<ServiceId> {
        match self {
            Verb::Version | Verb::Help => None,
            Verb::DioDirection | Verb::DioList | Verb::DioClear | Verb::DioSet | Verb::DioRead => {
                Some(ServiceId::DigitalIo)
            }
            Verb::RelayList | Verb::RelaySet | Verb::RelayClear | Verb::RelayRead => {
                Some(ServiceId::Relay)
            }
            Verb::SpiSend | Verb::SpiReceive => Some(ServiceId::Spi),
        }
    }

    /// Look up a verb by its exact wire spelling
    pub fn from_wire(token: &str) -> Option<Verb> {
        Verb::ALL.iter().copied().find(|v| v.as_str() == token)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = ParseError;

    /// Case-insensitive parse, matching how the firmware upper-cases
    /// incoming commands
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Verb::from_wire(&upper).ok_or_else(|| ParseError::UnknownVerb(s.to_string()))
    }
}
