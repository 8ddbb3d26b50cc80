//! proxy-io - send one command to a proxy-io board and print the reply
//!
//! The reply is printed as a JSON envelope. Any failure envelope (ERROR,
//! EXCEPTION, timeout or not-open) makes the process exit non-zero.

mod command;
mod settings;

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use pio_mux::{BoxedTransport, PortRegistry, SerialConnector, ServiceChannel};
use pio_sim::{spawn_virtual_link, VirtualMcu};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::Command;
use crate::settings::Settings;

/// Port name used for the virtual board
const SIMULATED_PORT: &str = "virtual";

#[derive(Debug, Parser)]
#[command(
    name = "proxy-io",
    version,
    about = "Drive a proxy-io board over its serial line",
    disable_help_subcommand = true
)]
struct Cli {
    /// Serial port of the board
    #[arg(long, short, env = "SERIAL_INTERFACE")]
    port: Option<String>,

    /// Talk to an in-process virtual board instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Log protocol traffic
    #[arg(long, short)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "proxy_io={level},pio_protocol={level},pio_mux={level},pio_sim={level},pio_io={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn registry(cli: &Cli, settings: &Settings) -> PortRegistry {
    if cli.simulate {
        let connector = |port: &str| -> io::Result<BoxedTransport> {
            info!("Opening virtual board as {}", port);
            Ok(Box::new(spawn_virtual_link(VirtualMcu::new()).io))
        };
        PortRegistry::new(connector, settings.worker.clone())
    } else {
        PortRegistry::new(
            SerialConnector::new(settings.serial.clone()),
            settings.worker.clone(),
        )
    }
}

fn resolve_port(cli: &Cli, settings: &Settings) -> Result<String> {
    if cli.simulate {
        return Ok(cli.port.clone().unwrap_or_else(|| SIMULATED_PORT.to_string()));
    }
    cli.port
        .clone()
        .or_else(|| settings.serial_port.clone())
        .context("No serial port given; pass --port, set SERIAL_INTERFACE, or save one in the settings file")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = Settings::load();
    if let Some(path) = Settings::settings_path() {
        debug!("Settings file: {}", path.display());
    }

    let invocation = match cli.command.invocation()? {
        Some(invocation) => invocation,
        None => {
            if let Some(port) = &cli.port {
                settings.serial_port = Some(port.clone());
            }
            if let Command::Settings { save: true } = cli.command {
                let path = settings.save().map_err(anyhow::Error::msg)?;
                info!("Saved settings to {}", path.display());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
            return Ok(ExitCode::SUCCESS);
        }
    };

    let port = resolve_port(&cli, &settings)?;
    let registry = registry(&cli, &settings);

    let mut channel = ServiceChannel::with_config(
        &registry,
        port.clone(),
        invocation.service,
        settings.channel.clone(),
    )
    .with_context(|| format!("Failed to open {}", port))?;

    let envelope = channel
        .invoke(invocation.verb, invocation.payload)
        .await
        .with_context(|| format!("{} failed on {}", invocation.verb, port))?;

    for line in channel.take_unsolicited() {
        info!("Unsolicited output from {}: {}", port, line);
    }
    channel.close().await;
    registry.shutdown_all().await;

    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if envelope.is_failure() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
