//! Subcommands and their mapping onto protocol requests

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use pio_protocol::{hex, Payload, ServiceId, Verb};

/// Commands sent to the board
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the firmware version
    Version,
    /// Print the firmware's command summary
    Help,
    /// List every digital pin with its direction and value
    DioList,
    /// Switch a digital pin between input and output
    DioDirection {
        pin: u8,
        /// `in` or `out`
        direction: String,
    },
    /// Drive a digital output high
    DioSet { pin: u8 },
    /// Drive a digital output low
    DioClear { pin: u8 },
    /// Read a digital pin
    DioRead { pin: u8 },
    /// List every relay with its state
    RelayList,
    /// Close a relay
    RelaySet { relay: u8 },
    /// Open a relay
    RelayClear { relay: u8 },
    /// Read a relay
    RelayRead { relay: u8 },
    /// Write bytes on the SPI bus, given as hex (`dead`, `de:ad` or `de ad`)
    SpiSend { data: String },
    /// Read bytes from the SPI bus
    SpiReceive { length: u8 },
    /// Show the effective settings, optionally saving them
    Settings {
        /// Write the effective settings to the settings file
        #[arg(long)]
        save: bool,
    },
}

/// A subcommand resolved to the request it sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub service: ServiceId,
    pub verb: Verb,
    pub payload: Payload,
}

impl Invocation {
    fn new(verb: Verb, payload: impl Into<Payload>) -> Self {
        Self {
            // VERSION and HELP are answered on any service
            service: verb.service().unwrap_or(ServiceId::DigitalIo),
            verb,
            payload: payload.into(),
        }
    }
}

impl Command {
    /// Request this command sends, or `None` for local commands
    pub fn invocation(&self) -> Result<Option<Invocation>> {
        let invocation = match self {
            Command::Version => Invocation::new(Verb::Version, Payload::none()),
            Command::Help => Invocation::new(Verb::Help, Payload::none()),
            Command::DioList => Invocation::new(Verb::DioList, Payload::none()),
            Command::DioDirection { pin, direction } => {
                let direction = match direction.to_ascii_lowercase().as_str() {
                    "in" | "input" => "IN",
                    "out" | "output" => "OUT",
                    other => bail!("Direction must be `in` or `out`, not `{}`", other),
                };
                Invocation::new(Verb::DioDirection, format!("{} {}", pin, direction))
            }
            Command::DioSet { pin } => Invocation::new(Verb::DioSet, pin.to_string()),
            Command::DioClear { pin } => Invocation::new(Verb::DioClear, pin.to_string()),
            Command::DioRead { pin } => Invocation::new(Verb::DioRead, pin.to_string()),
            Command::RelayList => Invocation::new(Verb::RelayList, Payload::none()),
            Command::RelaySet { relay } => Invocation::new(Verb::RelaySet, relay.to_string()),
            Command::RelayClear { relay } => Invocation::new(Verb::RelayClear, relay.to_string()),
            Command::RelayRead { relay } => Invocation::new(Verb::RelayRead, relay.to_string()),
            Command::SpiSend { data } => {
                let bytes = hex::decode(data)
                    .with_context(|| format!("Invalid SPI data `{}`", data))?;
                Invocation::new(Verb::SpiSend, bytes)
            }
            Command::SpiReceive { length } => Invocation::new(Verb::SpiReceive, vec![*length]),
            Command::Settings { .. } => return Ok(None),
        };
        Ok(Some(invocation))
    }
}
