//! proxy-io Serial Multiplexer
//!
//! This crate lets several logical device services (digital I/O, relays, an
//! SPI bridge) share one serial link to a command-executing microcontroller.
//!
//! # Architecture
//!
//! - A [`TransportWorker`] task exclusively owns one connection and serves
//!   requests strictly in submission order, one transaction at a time
//! - The [`PortRegistry`] maps each port to its single live worker, creating
//!   workers lazily through a [`Connector`]
//! - A [`ServiceChannel`] is one client's handle: it submits requests through
//!   the worker and awaits the reply on its own private queue
//!
//! # Example
//!
//! ```rust,no_run
//! use pio_mux::{PortRegistry, SerialConfig, ServiceChannel, WorkerConfig};
//! use pio_protocol::{ServiceId, Verb};
//!
//! # async fn run() -> Result<(), pio_mux::MuxError> {
//! let registry = PortRegistry::serial(SerialConfig::default(), WorkerConfig::default());
//! let mut dio = ServiceChannel::open(&registry, "/dev/ttyACM0", ServiceId::DigitalIo)?;
//!
//! let envelope = dio.invoke(Verb::DioRead, "3").await?;
//! println!("{}", envelope);
//! dio.close().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod registry;
pub mod transport;
pub mod worker;

pub use channel::ServiceChannel;
pub use config::{ChannelConfig, SerialConfig, WorkerConfig};
pub use error::MuxError;
pub use registry::PortRegistry;
pub use transport::{BoxedTransport, Connector, SerialConnector, Transport};
pub use worker::{Reply, ReplyBody, ReplyReceiver, ReplySender, ServiceMessage, TransportWorker};
