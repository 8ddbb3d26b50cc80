//! Virtual MCU actor task
//!
//! This module provides a pure async task that owns a VirtualMcu and serves
//! the line protocol over an async stream. The task uses a select! loop to:
//! - Read command lines from the stream, echo them and print the replies
//! - Handle control commands (silence, unsolicited output, pin stimulus)

use std::io;

use pio_protocol::{LineCodec, LINE_TERMINATOR};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::VirtualMcu;

/// Buffer size of the in-memory link
const LINK_BUFFER: usize = 4096;

/// Capacity of the control channel
const CONTROL_CAPACITY: usize = 16;

/// Commands that can be sent to a virtual MCU task
#[derive(Debug)]
pub enum VirtualMcuCommand {
    /// Keep echoing but stop printing replies
    SetSilent(bool),
    /// Print a line nobody asked for
    EmitUnsolicited(String),
    /// Drive the external level of an input pin
    SetInputLevel { pin: usize, level: bool },
    /// Queue bytes for SPI_RECEIVE
    QueueSpiRx(Vec<u8>),
    /// Send back a copy of the board state
    Snapshot(oneshot::Sender<VirtualMcu>),
    /// Shutdown the virtual MCU task
    Shutdown,
}

async fn write_line<S>(stream: &mut S, line: &str) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(line.as_bytes()).await?;
    stream.write_all(LINE_TERMINATOR.as_bytes()).await?;
    stream.flush().await
}

/// Run the virtual MCU actor task
///
/// Returns when the stream closes or a `Shutdown` command arrives. Dropping
/// every control sender leaves the board running.
pub async fn run_virtual_mcu_task<S>(
    mut stream: S,
    mut mcu: VirtualMcu,
    mut cmd_rx: mpsc::Receiver<VirtualMcuCommand>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];
    let mut silent = false;

    info!("Starting virtual MCU task (echo {})", mcu.echo());

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => match result {
                Ok(0) => {
                    debug!("Virtual MCU stream closed");
                    break;
                }
                Ok(n) => {
                    codec.push_bytes(&buf[..n]);
                    for line in codec.drain_lines() {
                        if mcu.echo() {
                            write_line(&mut stream, &line).await?;
                        }
                        let reply = mcu.handle_line(&line);
                        if silent {
                            debug!("Virtual MCU silent, dropping {} line(s)", reply.len());
                            continue;
                        }
                        for out in reply {
                            write_line(&mut stream, &out).await?;
                        }
                    }
                }
                Err(e) => {
                    warn!("Virtual MCU stream error: {}", e);
                    return Err(e);
                }
            },

            Some(cmd) = cmd_rx.recv() => match cmd {
                VirtualMcuCommand::SetSilent(enabled) => {
                    info!("Virtual MCU silent mode set to {}", enabled);
                    silent = enabled;
                }
                VirtualMcuCommand::EmitUnsolicited(line) => {
                    debug!("Virtual MCU emitting unsolicited: {}", line);
                    write_line(&mut stream, &line).await?;
                }
                VirtualMcuCommand::SetInputLevel { pin, level } => {
                    mcu.set_input_level(pin, level);
                }
                VirtualMcuCommand::QueueSpiRx(data) => {
                    mcu.queue_spi_rx(&data);
                }
                VirtualMcuCommand::Snapshot(reply_tx) => {
                    let _ = reply_tx.send(mcu.clone());
                }
                VirtualMcuCommand::Shutdown => {
                    info!("Virtual MCU task shutting down");
                    break;
                }
            },
        }
    }

    Ok(())
}

/// Host end of an in-memory link to a running virtual MCU
#[derive(Debug)]
pub struct VirtualLink {
    /// Stream to hand to a transport worker
    pub io: DuplexStream,
    /// Control channel of the virtual board
    pub control: mpsc::Sender<VirtualMcuCommand>,
    /// The board's task
    pub task: JoinHandle<io::Result<()>>,
}

/// Spawn a virtual MCU behind a `tokio::io::duplex` link
///
/// Must be called from within a Tokio runtime.
pub fn spawn_virtual_link(mcu: VirtualMcu) -> VirtualLink {
    let (host, device) = tokio::io::duplex(LINK_BUFFER);
    let (control, cmd_rx) = mpsc::channel(CONTROL_CAPACITY);
    let task = tokio::spawn(run_virtual_mcu_task(device, mcu, cmd_rx));
    VirtualLink {
        io: host,
        control,
        task,
    }
}
