//! proxy-io Protocol Library
//!
//! This crate provides the shared vocabulary of the line protocol spoken
//! between the host and the command-executing microcontroller:
//!
//! - **Verbs**: the command keywords understood by both ends
//! - **Services**: the logical device classes sharing one serial port
//! - **Requests**: `<VERB>[ <ARGS>]\r\n` line encoding
//! - **Line framing**: a streaming CR/LF line codec
//! - **Classification**: raw reply lines → structured [`Envelope`]
//!
//! # Example
//!
//! ```rust
//! use pio_protocol::{classify, ResponseKind, Verb};
//!
//! let envelope = classify(&["DIO_READ 3 True".to_string()]);
//! assert_eq!(envelope.kind, ResponseKind::Reply(Verb::DioRead));
//! assert_eq!(envelope.data, "3 True");
//! ```

pub mod classify;
pub mod envelope;
pub mod error;
pub mod hex;
pub mod line;
pub mod request;
pub mod service;
pub mod verb;

pub use classify::{classify, classify_with, MarkerPrecedence};
pub use envelope::{Envelope, Failure, ResponseKind};
pub use error::ParseError;
pub use line::LineCodec;
pub use request::{CommandRequest, Payload};
pub use service::ServiceId;
pub use verb::Verb;

/// Line terminator used in both directions
pub const LINE_TERMINATOR: &str = "\r\n";

/// Baud rate the microcontroller firmware listens on
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
