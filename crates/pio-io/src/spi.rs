//! SPI bridge client

use pio_mux::{PortRegistry, ServiceChannel};
use pio_protocol::{hex, Envelope, Failure, ServiceId, Verb};
use tracing::debug;

use crate::config::IoConfig;
use crate::error::IoError;

const RECEIVED_PREFIX: &str = "Received:";

/// SPI bus bridged by a proxy-io board
pub struct SpiIo {
    channel: ServiceChannel,
}

impl SpiIo {
    /// Open the SPI service on the configured port
    pub fn new(registry: &PortRegistry, config: &IoConfig) -> Result<Self, IoError> {
        config.validate()?;
        let channel = ServiceChannel::open(registry, config.interface.clone(), ServiceId::Spi)?;
        Ok(Self { channel })
    }

    /// Firmware version of the board
    pub async fn driver_version(&mut self) -> Result<String, IoError> {
        Ok(self.channel.driver_version().await?)
    }

    /// Write bytes to the bus (`SPI_SEND`)
    pub async fn send_message(&mut self, message: &[u8]) -> Result<Envelope, IoError> {
        let envelope = self.channel.invoke(Verb::SpiSend, message).await?;
        debug!("SPI send on {}: {}", self.channel.port(), envelope);
        Ok(envelope)
    }

    /// Clock `length` bytes in from the bus (`SPI_RECEIVE`)
    ///
    /// The length goes out as a single hex byte.
    pub async fn receive_message(&mut self, length: u8) -> Result<Vec<u8>, IoError> {
        let envelope = self.channel.invoke(Verb::SpiReceive, vec![length]).await?;
        let envelope = IoError::expect_reply(envelope, Verb::SpiReceive)?;
        debug!("SPI receive on {}: {}", self.channel.port(), envelope.data);

        let payload = envelope
            .data
            .strip_prefix(RECEIVED_PREFIX)
            .unwrap_or(&envelope.data);
        hex::decode(payload).map_err(|e| IoError::Device {
            failure: Failure::MalformedResponse,
            message: e.to_string(),
        })
    }

    /// Release the SPI service
    pub async fn close(self) {
        self.channel.close().await;
    }
}
