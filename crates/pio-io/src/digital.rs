//! Digital I/O client

use pio_mux::{PortRegistry, ServiceChannel};
use pio_protocol::{Envelope, Failure, Payload, ServiceId, Verb};
use tracing::{debug, info};

use crate::config::IoConfig;
use crate::error::IoError;
use crate::parse_level;

/// Digital I/O pins of a proxy-io board
pub struct DigitalIo {
    channel: ServiceChannel,
    config: IoConfig,
}

impl DigitalIo {
    /// Open the digital I/O service and apply the configured directions
    ///
    /// Configured inputs are switched to `IN` and outputs to `OUT`.
    pub async fn new(registry: &PortRegistry, config: IoConfig) -> Result<Self, IoError> {
        config.validate()?;
        let channel =
            ServiceChannel::open(registry, config.interface.clone(), ServiceId::DigitalIo)?;
        let mut dio = Self { channel, config };
        dio.apply_directions().await?;
        Ok(dio)
    }

    async fn apply_directions(&mut self) -> Result<(), IoError> {
        let inputs: Vec<u8> = self.config.inputs.values().copied().collect();
        let outputs: Vec<u8> = self.config.outputs.values().copied().collect();
        for pin in inputs {
            let reply = self.set_direction(pin, false).await?;
            info!("Configured input on {}: {}", self.config.interface, reply);
        }
        for pin in outputs {
            let reply = self.set_direction(pin, true).await?;
            info!("Configured output on {}: {}", self.config.interface, reply);
        }
        Ok(())
    }

    /// Configuration in use
    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    /// Firmware version of the board
    pub async fn driver_version(&mut self) -> Result<String, IoError> {
        Ok(self.channel.driver_version().await?)
    }

    /// Ports of the connected boards
    pub fn device_names(&self) -> Vec<String> {
        vec![self.config.interface.clone()]
    }

    /// Whether `name` is the connected board and its link is up
    pub fn check_for_device(&self, name: &str) -> bool {
        self.config.interface == name && self.channel.is_connected()
    }

    /// Pin table as reported by `DIO_LIST`
    pub async fn info(&mut self) -> Result<String, IoError> {
        let envelope = self.channel.invoke(Verb::DioList, Payload::none()).await?;
        let envelope = IoError::expect_reply(envelope, Verb::DioList)?;
        Ok(envelope.extension.unwrap_or_default())
    }

    /// Switch a pin between input and output, returning the board's reply
    pub async fn set_direction(&mut self, pin: u8, output: bool) -> Result<String, IoError> {
        let direction = if output { "OUT" } else { "IN" };
        let envelope = self
            .channel
            .invoke(Verb::DioDirection, format!("{} {}", pin, direction))
            .await?;
        Ok(IoError::expect_reply(envelope, Verb::DioDirection)?.data)
    }

    /// Read a pin by configured name or index
    pub async fn read_input(&mut self, name_or_pin: &str) -> Result<Envelope, IoError> {
        let pin = self.config.resolve_pin(name_or_pin)?;
        debug!("Reading {} (pin {})", name_or_pin, pin);
        Ok(self.channel.invoke(Verb::DioRead, pin.to_string()).await?)
    }

    /// Read a pin and decode its level
    pub async fn read_level(&mut self, name_or_pin: &str) -> Result<bool, IoError> {
        let envelope = IoError::expect_reply(self.read_input(name_or_pin).await?, Verb::DioRead)?;
        parse_level(&envelope.data).ok_or(IoError::Device {
            failure: Failure::MalformedResponse,
            message: envelope.data,
        })
    }

    /// Drive an output
    ///
    /// `true`, `set` and `high` (any case) set the pin; anything else clears it.
    pub async fn write_output(
        &mut self,
        name_or_pin: &str,
        state: &str,
    ) -> Result<Envelope, IoError> {
        let pin = self.config.resolve_pin(name_or_pin)?;
        let verb = match state.trim().to_uppercase().as_str() {
            "TRUE" | "SET" | "HIGH" => Verb::DioSet,
            _ => Verb::DioClear,
        };
        Ok(self.channel.invoke(verb, pin.to_string()).await?)
    }

    /// Encoders need timed pulse output the serial controller does not have
    pub fn force_encoder_output(&mut self, _encoder: &str, _state: i32) -> Result<(), IoError> {
        Err(IoError::Unsupported("encoder output"))
    }

    /// Encoders need timed pulse output the serial controller does not have
    pub fn create_encoder_pulses(&mut self, _encoder: &str, _pulses: i32) -> Result<(), IoError> {
        Err(IoError::Unsupported("encoder pulses"))
    }

    /// Release the digital I/O service
    pub async fn close(self) {
        self.channel.close().await;
    }
}
