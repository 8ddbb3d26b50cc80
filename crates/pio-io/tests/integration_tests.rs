//! Integration tests for the device clients
//!
//! Every client runs against a virtual MCU behind an in-memory link, with all
//! three services sharing one port the way they share one USB serial device
//! on real hardware.

use std::io;
use std::sync::{Arc, Mutex};

use pio_io::{DigitalIo, IoConfig, IoError, RelayIo, SpiIo};
use pio_mux::{BoxedTransport, PortRegistry, WorkerConfig};
use pio_protocol::{Failure, ResponseKind, Verb};
use pio_sim::{spawn_virtual_link, VirtualMcu, VirtualMcuCommand};
use tokio::sync::{mpsc, oneshot};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub type Controls = Arc<Mutex<Vec<mpsc::Sender<VirtualMcuCommand>>>>;

    pub const BOARD: &str = r#"{
        "interface": "/dev/ttyACM0",
        "inputs": { "in0": 0, "in2": 2, "in4": 4, "in6": 6 },
        "outputs": { "out1": 1, "out3": 3, "out5": 5, "out7": 7 }
    }"#;

    pub fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 10,
            reply_ceiling_ms: 300,
            settle_ms: 30,
            shutdown_grace_ms: 500,
        }
    }

    /// Registry whose every port is a fresh virtual MCU
    pub fn virtual_registry() -> (PortRegistry, Controls) {
        let controls: Controls = Arc::new(Mutex::new(Vec::new()));
        let created = controls.clone();
        let connector = move |_port: &str| -> io::Result<BoxedTransport> {
            let link = spawn_virtual_link(VirtualMcu::new());
            created.lock().unwrap().push(link.control);
            Ok(Box::new(link.io))
        };
        (PortRegistry::new(connector, fast_config()), controls)
    }

    pub fn control(controls: &Controls) -> mpsc::Sender<VirtualMcuCommand> {
        controls.lock().unwrap()[0].clone()
    }

    /// Board state after every earlier control command has been applied
    pub async fn snapshot(controls: &Controls) -> VirtualMcu {
        let (tx, rx) = oneshot::channel();
        control(controls)
            .send(VirtualMcuCommand::Snapshot(tx))
            .await
            .unwrap();
        rx.await.unwrap()
    }
}

use helpers::*;

// ============================================================================
// Digital I/O
// ============================================================================

#[tokio::test]
async fn test_new_applies_directions() {
    let (registry, controls) = virtual_registry();
    let config = IoConfig::from_json(BOARD).unwrap();
    let dio = DigitalIo::new(&registry, config).await.unwrap();

    let board = snapshot(&controls).await;
    for pin in [0usize, 2, 4, 6] {
        assert_eq!(board.dio_direction(pin), Some(pio_sim::Direction::Input));
    }
    for pin in [1usize, 3, 5, 7] {
        assert_eq!(board.dio_direction(pin), Some(pio_sim::Direction::Output));
    }
    assert_eq!(board.received_commands().len(), 8);
    dio.close().await;
}

#[tokio::test]
async fn test_write_and_read_outputs() {
    let (registry, controls) = virtual_registry();
    let mut dio = DigitalIo::new(&registry, IoConfig::from_json(BOARD).unwrap())
        .await
        .unwrap();

    let env = dio.write_output("out3", "high").await.unwrap();
    assert_eq!(env.kind, ResponseKind::Reply(Verb::DioSet));
    assert_eq!(env.data, "3 True");
    assert!(dio.read_level("out3").await.unwrap());
    assert_eq!(snapshot(&controls).await.dio_value(3), Some(true));

    let env = dio.write_output("3", "low").await.unwrap();
    assert_eq!(env.kind, ResponseKind::Reply(Verb::DioClear));
    assert!(!dio.read_level("out3").await.unwrap());

    for state in ["TRUE", "set", "High"] {
        let env = dio.write_output("out5", state).await.unwrap();
        assert_eq!(env.verb(), Some(Verb::DioSet));
    }
    dio.close().await;
}

#[tokio::test]
async fn test_read_input_follows_board() {
    let (registry, controls) = virtual_registry();
    let mut dio = DigitalIo::new(&registry, IoConfig::from_json(BOARD).unwrap())
        .await
        .unwrap();

    let env = dio.read_input("in4").await.unwrap();
    assert_eq!(env.kind, ResponseKind::Reply(Verb::DioRead));
    assert_eq!(env.data, "4 False");

    control(&controls)
        .send(VirtualMcuCommand::SetInputLevel { pin: 4, level: true })
        .await
        .unwrap();
    snapshot(&controls).await;
    assert!(dio.read_level("in4").await.unwrap());
    dio.close().await;
}

#[tokio::test]
async fn test_writing_an_input_is_a_device_error() {
    let (registry, _) = virtual_registry();
    let mut dio = DigitalIo::new(&registry, IoConfig::from_json(BOARD).unwrap())
        .await
        .unwrap();

    let env = dio.write_output("in0", "set").await.unwrap();
    assert_eq!(env.kind, ResponseKind::Error);
    assert_eq!(env.data, "DIO_SET ERROR: Cannot set pin: 0");
    assert_eq!(env.failure, Some(Failure::ProtocolError));
    dio.close().await;
}

#[tokio::test]
async fn test_unknown_pin_name() {
    let (registry, _) = virtual_registry();
    let mut dio = DigitalIo::new(&registry, IoConfig::from_json(BOARD).unwrap())
        .await
        .unwrap();

    assert!(matches!(
        dio.read_input("out9").await,
        Err(IoError::UnknownPin(_))
    ));
    dio.close().await;
}

#[tokio::test]
async fn test_info_and_version() {
    let (registry, _) = virtual_registry();
    let mut dio = DigitalIo::new(&registry, IoConfig::from_json(BOARD).unwrap())
        .await
        .unwrap();

    let table = dio.info().await.unwrap();
    assert_eq!(table.lines().count(), 8);
    assert!(table.contains("    1 board.GP1 digitalio.Direction.OUTPUT False"));

    assert_eq!(dio.driver_version().await.unwrap(), "0.0.1");
    assert_eq!(dio.device_names(), vec!["/dev/ttyACM0".to_string()]);
    assert!(dio.check_for_device("/dev/ttyACM0"));
    assert!(!dio.check_for_device("COM4"));
    dio.close().await;
}

#[tokio::test]
async fn test_encoders_unsupported() {
    let (registry, _) = virtual_registry();
    let mut dio = DigitalIo::new(&registry, IoConfig::for_interface("COM4"))
        .await
        .unwrap();

    assert!(matches!(
        dio.force_encoder_output("enc0", 1),
        Err(IoError::Unsupported(_))
    ));
    assert!(matches!(
        dio.create_encoder_pulses("enc0", -5),
        Err(IoError::Unsupported(_))
    ));
    dio.close().await;
}

// ============================================================================
// Relays and SPI
// ============================================================================

#[tokio::test]
async fn test_relays() {
    let (registry, controls) = virtual_registry();
    let config = IoConfig::for_interface("COM4");
    let mut relays = RelayIo::new(&registry, &config).unwrap();

    let env = relays.set_relay_closed(1, true).await.unwrap();
    assert_eq!(env.kind, ResponseKind::Reply(Verb::RelaySet));
    assert_eq!(env.data, "1 True");
    assert!(relays.read_relay(1).await.unwrap());
    assert!(!relays.read_relay(0).await.unwrap());
    assert_eq!(snapshot(&controls).await.relay_closed(1), Some(true));

    let env = relays.info().await.unwrap();
    assert_eq!(env.kind, ResponseKind::Reply(Verb::RelayList));
    assert_eq!(
        env.extension.as_deref(),
        Some("    0 board.GP6 False\n    1 board.GP7 True")
    );

    relays.set_relay_closed(1, false).await.unwrap();
    assert!(!relays.read_relay(1).await.unwrap());

    let err = relays.read_relay(5).await.unwrap_err();
    assert!(matches!(
        err,
        IoError::Device {
            failure: Failure::ProtocolError,
            ..
        }
    ));
    relays.close().await;
}

#[tokio::test]
async fn test_spi_round_trip() {
    let (registry, controls) = virtual_registry();
    let config = IoConfig::for_interface("COM4");
    let mut spi = SpiIo::new(&registry, &config).unwrap();

    let env = spi.send_message(&[0xDE, 0xAD]).await.unwrap();
    assert_eq!(env.kind, ResponseKind::Reply(Verb::SpiSend));
    assert_eq!(env.data, "Sent: de ad");
    assert_eq!(snapshot(&controls).await.spi_sent(), &[vec![0xDEu8, 0xAD]]);

    control(&controls)
        .send(VirtualMcuCommand::QueueSpiRx(vec![0x01, 0x02, 0x03]))
        .await
        .unwrap();
    snapshot(&controls).await;
    assert_eq!(spi.receive_message(4).await.unwrap(), vec![0x01, 0x02, 0x03, 0x00]);
    assert!(spi.receive_message(0).await.unwrap().is_empty());
    spi.close().await;
}

// ============================================================================
// Sharing
// ============================================================================

#[tokio::test]
async fn test_three_clients_share_one_board() {
    let (registry, controls) = virtual_registry();
    let config = IoConfig::from_json(BOARD).unwrap();

    let mut dio = DigitalIo::new(&registry, config.clone()).await.unwrap();
    let mut relays = RelayIo::new(&registry, &config).unwrap();
    let mut spi = SpiIo::new(&registry, &config).unwrap();

    let (a, b, c) = tokio::join!(
        dio.write_output("out1", "set"),
        relays.set_relay_closed(0, true),
        spi.send_message(&[0x42]),
    );
    assert_eq!(a.unwrap().data, "1 True");
    assert_eq!(b.unwrap().data, "0 True");
    assert_eq!(c.unwrap().data, "Sent: 42");

    // One board was opened for all three services
    assert_eq!(controls.lock().unwrap().len(), 1);
    assert_eq!(registry.ports(), vec!["/dev/ttyACM0".to_string()]);

    relays.close().await;
    spi.close().await;
    assert!(registry.worker("/dev/ttyACM0").is_some());
    dio.close().await;
    assert!(registry.ports().is_empty());
}

#[tokio::test]
async fn test_silent_board_surfaces_timeout() {
    let (registry, controls) = virtual_registry();
    let config = IoConfig::for_interface("COM4");
    let mut relays = RelayIo::new(&registry, &config).unwrap();

    // Open the link before silencing the board
    relays.set_relay_closed(0, true).await.unwrap();
    control(&controls)
        .send(VirtualMcuCommand::SetSilent(true))
        .await
        .unwrap();
    snapshot(&controls).await;

    let env = relays.set_relay_closed(0, false).await.unwrap();
    assert_eq!(env.failure, Some(Failure::Timeout));
    assert!(matches!(
        relays.read_relay(0).await,
        Err(IoError::Device {
            failure: Failure::Timeout,
            ..
        })
    ));
    relays.close().await;
}
