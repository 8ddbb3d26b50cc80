//! Byte transports and the connector seam
//!
//! Workers are generic over the I/O type so that real serial ports and
//! in-memory `DuplexStream` links share one code path. The registry opens
//! ports through a [`Connector`], which tests replace with a closure handing
//! out duplex streams.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::config::SerialConfig;

/// Bidirectional byte stream a worker can own
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type-erased transport returned by connectors
pub type BoxedTransport = Box<dyn Transport>;

/// Opens the transport for a port identifier
pub trait Connector: Send + Sync {
    /// Open the named port
    fn connect(&self, port: &str) -> io::Result<BoxedTransport>;
}

impl<F> Connector for F
where
    F: Fn(&str) -> io::Result<BoxedTransport> + Send + Sync,
{
    fn connect(&self, port: &str) -> io::Result<BoxedTransport> {
        self(port)
    }
}

/// Connector for physical serial ports (8 data bits, no parity, 1 stop bit)
#[derive(Debug, Clone, Default)]
pub struct SerialConnector {
    config: SerialConfig,
}

impl SerialConnector {
    /// Create a serial connector with the given link parameters
    pub fn new(config: SerialConfig) -> Self {
        Self { config }
    }
}

impl Connector for SerialConnector {
    fn connect(&self, port: &str) -> io::Result<BoxedTransport> {
        let stream = tokio_serial::new(port, self.config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .timeout(Duration::from_millis(self.config.read_timeout_ms))
            .open_native_async()?;
        info!("Opened serial port {} at {} baud", port, self.config.baud_rate);
        Ok(Box::new(stream))
    }
}
