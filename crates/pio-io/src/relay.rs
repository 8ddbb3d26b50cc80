//! Relay client

use pio_mux::{PortRegistry, ServiceChannel};
use pio_protocol::{Envelope, Failure, Payload, ServiceId, Verb};

use crate::config::IoConfig;
use crate::error::IoError;
use crate::parse_level;

/// Relays of a proxy-io board
pub struct RelayIo {
    channel: ServiceChannel,
}

impl RelayIo {
    /// Open the relay service on the configured port
    pub fn new(registry: &PortRegistry, config: &IoConfig) -> Result<Self, IoError> {
        config.validate()?;
        let channel = ServiceChannel::open(registry, config.interface.clone(), ServiceId::Relay)?;
        Ok(Self { channel })
    }

    /// Firmware version of the board
    pub async fn driver_version(&mut self) -> Result<String, IoError> {
        Ok(self.channel.driver_version().await?)
    }

    /// Close (`RELAY_SET`) or open (`RELAY_CLEAR`) a relay
    pub async fn set_relay_closed(&mut self, relay: u8, closed: bool) -> Result<Envelope, IoError> {
        let verb = if closed { Verb::RelaySet } else { Verb::RelayClear };
        Ok(self.channel.invoke(verb, relay.to_string()).await?)
    }

    /// Whether a relay is closed
    pub async fn read_relay(&mut self, relay: u8) -> Result<bool, IoError> {
        let envelope = self.channel.invoke(Verb::RelayRead, relay.to_string()).await?;
        let envelope = IoError::expect_reply(envelope, Verb::RelayRead)?;
        parse_level(&envelope.data).ok_or(IoError::Device {
            failure: Failure::MalformedResponse,
            message: envelope.data,
        })
    }

    /// Relay table as reported by `RELAY_LIST`
    pub async fn info(&mut self) -> Result<Envelope, IoError> {
        Ok(self.channel.invoke(Verb::RelayList, Payload::none()).await?)
    }

    /// Release the relay service
    pub async fn close(self) {
        self.channel.close().await;
    }
}
