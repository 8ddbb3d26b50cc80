//! proxy-io Simulation Library
//!
//! This crate provides a virtual microcontroller for exercising the serial
//! multiplexer and the device clients without hardware. It includes:
//!
//! - **VirtualMcu**: the firmware's command table over an in-memory model of
//!   eight digital I/O pins, two relays and an SPI bus
//! - **run_virtual_mcu_task**: serves the line protocol over any async stream
//!
//! # Example
//!
//! ```rust
//! use pio_sim::VirtualMcu;
//!
//! let mut mcu = VirtualMcu::new();
//!
//! assert_eq!(mcu.handle_line("DIO_DIRECTION 3 OUT"), vec!["DIO_DIRECTION 3 digitalio.Direction.OUTPUT"]);
//! assert_eq!(mcu.handle_line("DIO_SET 3"), vec!["DIO_SET 3 True"]);
//! assert_eq!(mcu.handle_line("DIO_READ 3"), vec!["DIO_READ 3 True"]);
//! ```

pub mod mcu;
pub mod mcu_task;

pub use mcu::{Direction, VirtualMcu, VirtualMcuConfig};
pub use mcu_task::{run_virtual_mcu_task, spawn_virtual_link, VirtualLink, VirtualMcuCommand};
