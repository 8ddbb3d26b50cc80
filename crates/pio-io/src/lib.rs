//! proxy-io Device Clients
//!
//! Typed clients for the three services a proxy-io board offers. Each client
//! opens its own [`ServiceChannel`](pio_mux::ServiceChannel) on the shared
//! port named by its [`IoConfig`], so a digital I/O client, a relay client
//! and an SPI client can all drive the same board at once.
//!
//! # Example
//!
//! ```rust,no_run
//! use pio_io::{DigitalIo, IoConfig, RelayIo};
//! use pio_mux::WorkerConfig;
//!
//! # async fn run() -> Result<(), pio_io::IoError> {
//! let config = IoConfig::from_json(
//!     r#"{ "interface": "/dev/ttyACM0", "inputs": { "in0": 0 }, "outputs": { "out1": 1 } }"#,
//! )?;
//! let registry = config.serial_registry(WorkerConfig::default());
//!
//! let mut dio = DigitalIo::new(&registry, config.clone()).await?;
//! let mut relays = RelayIo::new(&registry, &config)?;
//!
//! dio.write_output("out1", "high").await?;
//! relays.set_relay_closed(0, true).await?;
//! println!("in0 is {}", dio.read_level("in0").await?);
//!
//! relays.close().await;
//! dio.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod digital;
pub mod error;
pub mod relay;
pub mod spi;

pub use config::IoConfig;
pub use digital::DigitalIo;
pub use error::IoError;
pub use relay::RelayIo;
pub use spi::SpiIo;

/// Parse the level word at the end of a `<pin> True|False` reply
pub(crate) fn parse_level(data: &str) -> Option<bool> {
    match data.split_whitespace().last()? {
        "True" | "true" | "1" => Some(true),
        "False" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("3 True"), Some(true));
        assert_eq!(parse_level("0 False"), Some(false));
        assert_eq!(parse_level("3 maybe"), None);
        assert_eq!(parse_level(""), None);
    }
}
