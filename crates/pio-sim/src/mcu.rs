//! Virtual microcontroller
//!
//! Models the pins behind the firmware's command table and produces the same
//! reply lines the board prints: `<CMD> <reply>` on success, an `ERROR:` reply
//! for pins that cannot be used, `EXCEPTION: Could not run: ...` when the
//! arguments make the handler fail, and `<CMD> not understood` followed by the
//! help text for anything else.

use std::collections::VecDeque;
use std::fmt;

use pio_protocol::{hex, ParseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Firmware version the virtual board reports
pub const FIRMWARE_VERSION: &str = "0.0.1";

const HELP_TEXT: &str = "
    Commands:
      HELP
      DIO_DIRECTION <pin number> <[OUT,IN]>
      DIO_LIST
      DIO_CLEAR <pin number>
      DIO_SET <pin number>
      DIO_READ <pin number>
      SPI_SEND <hex bytes>
      SPI_RECEIVE <hex length>
      RELAY_LIST
      RELAY_SET <pin number>
      RELAY_CLEAR <pin_number>
      RELAY_READ
      VERSION
    ";

/// Digital pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Input with pull-down
    Input,
    /// Driven output
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("digitalio.Direction.INPUT"),
            Direction::Output => f.write_str("digitalio.Direction.OUTPUT"),
        }
    }
}

/// Configuration for creating a virtual MCU
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualMcuConfig {
    /// Board names of the logical digital I/O pins
    pub dio_pins: Vec<String>,
    /// Board names of the relay pins
    pub relay_pins: Vec<String>,
    /// Reported firmware version
    pub version: String,
    /// Whether the console echoes each received line
    pub echo: bool,
}

impl Default for VirtualMcuConfig {
    fn default() -> Self {
        let names = |pins: &[&str]| -> Vec<String> {
            pins.iter().map(|p| format!("board.{}", p)).collect()
        };
        Self {
            dio_pins: names(&["GP0", "GP1", "GP2", "GP3", "GP20", "GP21", "GP22", "GP23"]),
            relay_pins: names(&["GP6", "GP7"]),
            version: FIRMWARE_VERSION.to_string(),
            echo: true,
        }
    }
}

#[derive(Debug, Clone)]
struct DioPin {
    name: String,
    direction: Direction,
    driven: bool,
    external: bool,
}

impl DioPin {
    fn value(&self) -> bool {
        match self.direction {
            Direction::Output => self.driven,
            Direction::Input => self.external,
        }
    }
}

#[derive(Debug, Clone)]
struct RelayPin {
    name: String,
    closed: bool,
}

/// Why a command handler could not run
#[derive(Debug, Error)]
enum Fault {
    #[error("list index out of range")]
    MissingArgument,
    #[error("invalid syntax for integer with base 10: '{0}'")]
    InvalidInteger(String),
    #[error("{0}")]
    InvalidHex(#[from] ParseError),
}

/// A simulated proxy-io board
#[derive(Debug, Clone)]
pub struct VirtualMcu {
    version: String,
    echo: bool,
    dio: Vec<DioPin>,
    relays: Vec<RelayPin>,
    /// Bytes the SPI peripheral will clock out on the next receives
    spi_rx: VecDeque<u8>,
    /// Every SPI_SEND payload, in order
    spi_sent: Vec<Vec<u8>>,
    /// Every non-empty command line received
    received: Vec<String>,
}

impl Default for VirtualMcu {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMcu {
    /// Create a virtual board with the Pico pin layout
    pub fn new() -> Self {
        Self::from_config(VirtualMcuConfig::default())
    }

    /// Create a virtual board from configuration
    pub fn from_config(config: VirtualMcuConfig) -> Self {
        Self {
            version: config.version,
            echo: config.echo,
            dio: config
                .dio_pins
                .into_iter()
                .map(|name| DioPin {
                    name,
                    direction: Direction::Input,
                    driven: false,
                    external: false,
                })
                .collect(),
            relays: config
                .relay_pins
                .into_iter()
                .map(|name| RelayPin {
                    name,
                    closed: false,
                })
                .collect(),
            spi_rx: VecDeque::new(),
            spi_sent: Vec::new(),
            received: Vec::new(),
        }
    }

    /// Whether the console echoes received lines
    pub fn echo(&self) -> bool {
        self.echo
    }

    /// Number of digital I/O pins
    pub fn dio_count(&self) -> usize {
        self.dio.len()
    }

    /// Direction of a digital pin
    pub fn dio_direction(&self, pin: usize) -> Option<Direction> {
        self.dio.get(pin).map(|p| p.direction)
    }

    /// Current level of a digital pin
    pub fn dio_value(&self, pin: usize) -> Option<bool> {
        self.dio.get(pin).map(DioPin::value)
    }

    /// Drive the external level seen by an input pin
    pub fn set_input_level(&mut self, pin: usize, level: bool) {
        if let Some(p) = self.dio.get_mut(pin) {
            p.external = level;
        }
    }

    /// Whether a relay is closed
    pub fn relay_closed(&self, relay: usize) -> Option<bool> {
        self.relays.get(relay).map(|r| r.closed)
    }

    /// Queue bytes for the SPI peripheral to return
    pub fn queue_spi_rx(&mut self, data: &[u8]) {
        self.spi_rx.extend(data);
    }

    /// Payloads written by SPI_SEND
    pub fn spi_sent(&self) -> &[Vec<u8>] {
        &self.spi_sent
    }

    /// Command lines received so far
    pub fn received_commands(&self) -> &[String] {
        &self.received
    }

    /// Run one command line and return the lines the board prints
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = parts.first() else {
            return Vec::new();
        };
        let command = first.to_uppercase();
        self.received.push(line.trim().to_string());
        debug!("Virtual MCU handling {}", line.trim());

        let result = match command.as_str() {
            "HELP" => Ok(HELP_TEXT.to_string()),
            "VERSION" => Ok(self.version.clone()),
            "DIO_DIRECTION" => self.dio_set_direction(&parts),
            "DIO_LIST" => Ok(self.dio_list()),
            "DIO_CLEAR" => self.dio_write(&parts, false),
            "DIO_SET" => self.dio_write(&parts, true),
            "DIO_READ" => self.dio_read(&parts),
            "RELAY_LIST" => Ok(self.relay_list()),
            "RELAY_CLEAR" => self.relay_write(&parts, false),
            "RELAY_SET" => self.relay_write(&parts, true),
            "RELAY_READ" => self.relay_read(&parts),
            "SPI_SEND" => self.spi_send(&parts),
            "SPI_RECEIVE" => self.spi_receive(&parts),
            _ => {
                let mut out = vec![format!("{} not understood", command)];
                out.extend(HELP_TEXT.split('\n').map(String::from));
                return out;
            }
        };

        match result {
            Ok(reply) => format!("{} {}", command, reply)
                .split('\n')
                .map(String::from)
                .collect(),
            Err(fault) => vec![format!(
                "EXCEPTION: Could not run: {} because {}",
                command, fault
            )],
        }
    }

    fn dio_set_direction(&mut self, parts: &[&str]) -> Result<String, Fault> {
        let pin_num = int_arg(parts, 1)?;
        let requested = arg(parts, 2)?.to_uppercase();
        let Some(pin) = self.dio.get_mut(pin_num) else {
            return Ok(format!("ERROR: Unknown Pin: {}", pin_num));
        };
        pin.direction = if matches!(requested.as_str(), "1" | "OUT" | "OUTPUT") {
            Direction::Output
        } else {
            Direction::Input
        };
        Ok(format!("{} {}", pin_num, pin.direction))
    }

    fn dio_list(&self) -> String {
        let mut out = vec![String::new()];
        for (i, pin) in self.dio.iter().enumerate() {
            out.push(format!(
                "    {} {} {} {}",
                i,
                pin.name,
                pin.direction,
                py_bool(pin.value())
            ));
        }
        out.join("\n")
    }

    fn dio_write(&mut self, parts: &[&str], value: bool) -> Result<String, Fault> {
        let pin_num = int_arg(parts, 1)?;
        match self.dio.get_mut(pin_num) {
            Some(pin) if pin.direction == Direction::Output => {
                pin.driven = value;
                Ok(format!("{} {}", pin_num, py_bool(value)))
            }
            _ => Ok(format!("ERROR: Cannot set pin: {}", pin_num)),
        }
    }

    fn dio_read(&self, parts: &[&str]) -> Result<String, Fault> {
        let pin_num = int_arg(parts, 1)?;
        Ok(match self.dio.get(pin_num) {
            Some(pin) => format!("{} {}", pin_num, py_bool(pin.value())),
            None => format!("ERROR: Cannot read pin: {}", pin_num),
        })
    }

    fn relay_list(&self) -> String {
        let mut out = vec![String::new()];
        for (i, relay) in self.relays.iter().enumerate() {
            out.push(format!("    {} {} {}", i, relay.name, py_bool(relay.closed)));
        }
        out.join("\n")
    }

    fn relay_write(&mut self, parts: &[&str], closed: bool) -> Result<String, Fault> {
        let relay_num = int_arg(parts, 1)?;
        Ok(match self.relays.get_mut(relay_num) {
            Some(relay) => {
                relay.closed = closed;
                format!("{} {}", relay_num, py_bool(closed))
            }
            None => format!("ERROR: Cannot set relay pin: {}", relay_num),
        })
    }

    fn relay_read(&self, parts: &[&str]) -> Result<String, Fault> {
        let relay_num = int_arg(parts, 1)?;
        Ok(match self.relays.get(relay_num) {
            Some(relay) => format!("{} {}", relay_num, py_bool(relay.closed)),
            None => format!("ERROR: Cannot read relay pin: {}", relay_num),
        })
    }

    fn spi_send(&mut self, parts: &[&str]) -> Result<String, Fault> {
        let data = hex::decode(&parts[1..].join(" "))?;
        let reply = format!("Sent: {}", hex::encode_spaced(&data));
        self.spi_sent.push(data);
        Ok(reply)
    }

    fn spi_receive(&mut self, parts: &[&str]) -> Result<String, Fault> {
        let length = hex::decode(arg(parts, 1)?)?
            .first()
            .copied()
            .ok_or(Fault::MissingArgument)?;
        let data: Vec<u8> = (0..length)
            .map(|_| self.spi_rx.pop_front().unwrap_or(0))
            .collect();
        Ok(format!("Received: {}", hex::encode_spaced(&data)))
    }
}

fn arg<'a>(parts: &[&'a str], index: usize) -> Result<&'a str, Fault> {
    parts.get(index).copied().ok_or(Fault::MissingArgument)
}

fn int_arg(parts: &[&str], index: usize) -> Result<usize, Fault> {
    let raw = arg(parts, index)?;
    raw.parse()
        .map_err(|_| Fault::InvalidInteger(raw.to_string()))
}

fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}
