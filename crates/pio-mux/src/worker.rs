//! Per-port transport worker
//!
//! Each open port gets exactly one worker task which owns the connection.
//! Requests from every registered service land on one FIFO queue, and the
//! worker runs them one at a time: write the command line, collect the reply
//! lines, route them to the requesting service. While idle it keeps draining
//! the link so that output nobody asked for is forwarded instead of being
//! mistaken for the next reply.
//!
//! The worker is generic over the I/O type. Real ports use `SerialStream`,
//! tests and simulations use `DuplexStream` from `tokio::io::duplex()`.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pio_protocol::{CommandRequest, LineCodec, ServiceId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::WorkerConfig;
use crate::error::MuxError;

/// Capacity of the unsolicited output broadcast
const UNSOLICITED_CAPACITY: usize = 64;

/// Pause after a transient read error before reading again
const TRANSIENT_BACKOFF: Duration = Duration::from_millis(10);

/// What a transaction produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyBody {
    /// Raw reply lines, echo already removed
    Lines(Vec<String>),
    /// Nothing arrived within the reply ceiling
    Timeout,
    /// The write failed or the link dropped; carries the I/O error text
    NotOpen(Option<String>),
}

/// Reply to one submitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Sequence number given at submission
    pub seq: u64,
    /// Transaction outcome
    pub body: ReplyBody,
}

/// Message delivered on a service's reply queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceMessage {
    /// Reply to a request this service submitted
    Reply(Reply),
    /// Lines that arrived while no transaction was running
    Unsolicited(Vec<String>),
}

/// Sending half of a service's reply queue
pub type ReplySender = mpsc::UnboundedSender<ServiceMessage>;

/// Receiving half of a service's reply queue
pub type ReplyReceiver = mpsc::UnboundedReceiver<ServiceMessage>;

#[derive(Debug)]
enum WorkerCommand {
    Register {
        service: ServiceId,
        reply_tx: ReplySender,
    },
    Deregister {
        service: ServiceId,
    },
    Submit {
        seq: u64,
        request: CommandRequest,
    },
    Shutdown,
}

/// Handle to the task that exclusively owns one port's connection
pub struct TransportWorker {
    port: String,
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    alive: Arc<AtomicBool>,
    services: Mutex<BTreeSet<ServiceId>>,
    unsolicited_tx: broadcast::Sender<String>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl TransportWorker {
    /// Spawn a worker task that owns `io`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<T>(port: impl Into<String>, io: T, config: WorkerConfig) -> Arc<Self>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let port = port.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (unsolicited_tx, _) = broadcast::channel(UNSOLICITED_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let shutdown_grace = config.shutdown_grace();

        let link = WorkerLink::new(port.clone(), io, config, unsolicited_tx.clone());
        let task = tokio::spawn(run_worker(link, cmd_rx, alive.clone()));

        Arc::new(Self {
            port,
            cmd_tx,
            alive,
            services: Mutex::new(BTreeSet::new()),
            unsolicited_tx,
            task: Mutex::new(Some(task)),
            shutdown_grace,
        })
    }

    /// Port this worker owns
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Whether the worker task is still running
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.cmd_tx.is_closed()
    }

    /// Services currently registered
    pub fn services(&self) -> Vec<ServiceId> {
        lock(&self.services).iter().copied().collect()
    }

    /// Register a service and the queue its replies go to
    pub fn register(&self, service: ServiceId, reply_tx: ReplySender) -> Result<(), MuxError> {
        if !self.is_alive() {
            return Err(self.stopped_error());
        }

        let mut services = lock(&self.services);
        if !services.insert(service) {
            return Err(MuxError::ServiceInUse {
                port: self.port.clone(),
                service,
            });
        }
        if self
            .cmd_tx
            .send(WorkerCommand::Register { service, reply_tx })
            .is_err()
        {
            services.remove(&service);
            return Err(self.stopped_error());
        }

        debug!("Registered service {} on {}", service, self.port);
        Ok(())
    }

    /// Remove a service. Returns false if it was not registered.
    ///
    /// Removing the last service stops the worker.
    pub fn deregister(&self, service: ServiceId) -> bool {
        let mut services = lock(&self.services);
        let removed = services.remove(&service);
        if removed {
            // A stopped worker has nothing left to route
            let _ = self.cmd_tx.send(WorkerCommand::Deregister { service });
            debug!("Deregistered service {} on {}", service, self.port);
            if services.is_empty() {
                self.shutdown();
            }
        }
        removed
    }

    /// Queue a request. Never blocks on the transport.
    pub fn submit(&self, seq: u64, request: CommandRequest) -> Result<(), MuxError> {
        request.validate()?;
        if !lock(&self.services).contains(&request.service) {
            return Err(MuxError::ServiceNotRegistered {
                port: self.port.clone(),
                service: request.service,
            });
        }
        if !self.is_alive() {
            return Err(self.stopped_error());
        }
        self.cmd_tx
            .send(WorkerCommand::Submit { seq, request })
            .map_err(|_| self.stopped_error())
    }

    /// Subscribe to every unsolicited line seen on this port
    pub fn subscribe_unsolicited(&self) -> broadcast::Receiver<String> {
        self.unsolicited_tx.subscribe()
    }

    /// Ask the worker to stop after the transaction in progress
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(WorkerCommand::Shutdown);
    }

    /// Wait for the worker task to exit, bounded by the shutdown grace
    ///
    /// Returns false if the task had to be aborted.
    pub async fn stopped(&self) -> bool {
        let handle = lock(&self.task).take();
        let Some(mut handle) = handle else {
            return !self.is_alive();
        };

        match timeout(self.shutdown_grace, &mut handle).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    "Transport worker on {} did not stop within {:?}, aborting",
                    self.port, self.shutdown_grace
                );
                handle.abort();
                false
            }
        }
    }

    fn stopped_error(&self) -> MuxError {
        MuxError::WorkerStopped {
            port: self.port.clone(),
        }
    }
}

impl fmt::Debug for TransportWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportWorker")
            .field("port", &self.port)
            .field("alive", &self.is_alive())
            .field("services", &self.services())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

fn is_echo(line: &str, command_line: &str) -> bool {
    line.trim_end() == command_line.trim_end()
}

/// The connection and buffers owned by the worker task
struct WorkerLink<T> {
    port: String,
    io: T,
    config: WorkerConfig,
    codec: LineCodec,
    buf: Vec<u8>,
    unsolicited_tx: broadcast::Sender<String>,
    closed: bool,
}

impl<T> WorkerLink<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn new(
        port: String,
        io: T,
        config: WorkerConfig,
        unsolicited_tx: broadcast::Sender<String>,
    ) -> Self {
        Self {
            port,
            io,
            config,
            codec: LineCodec::new(),
            buf: vec![0u8; 1024],
            unsolicited_tx,
            closed: false,
        }
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await
    }

    /// Everything buffered, including an unterminated tail
    fn take_buffered(&mut self) -> Vec<String> {
        let mut lines = self.codec.drain_lines();
        lines.extend(self.codec.take_partial());
        lines
    }

    fn publish_unsolicited(
        &self,
        routes: &HashMap<ServiceId, ReplySender>,
        last_service: Option<ServiceId>,
        lines: Vec<String>,
    ) {
        if lines.is_empty() {
            return;
        }
        for line in &lines {
            debug!("IN <- {} (unsolicited): {}", self.port, line);
            let _ = self.unsolicited_tx.send(line.clone());
        }
        match last_service.and_then(|s| routes.get(&s)) {
            Some(tx) => {
                let _ = tx.send(ServiceMessage::Unsolicited(lines));
            }
            None => debug!(
                "No recent service on {}, {} unsolicited line(s) broadcast only",
                self.port,
                lines.len()
            ),
        }
    }

    /// Run one request/reply exchange
    ///
    /// Waits up to the reply ceiling for the first reply line, then keeps
    /// reading until the link goes quiet for the settle gap. An `Err` means
    /// the link is unusable and the worker must stop.
    async fn transact(&mut self, request: &CommandRequest) -> io::Result<ReplyBody> {
        let command_line = request.command_line();
        debug!("OUT -> {}: {}", self.port, command_line);

        if let Err(e) = self.write(&request.encode()).await {
            warn!("Write to {} failed: {}", self.port, e);
            return Ok(ReplyBody::NotOpen(Some(e.to_string())));
        }

        let first_deadline = Instant::now() + self.config.reply_ceiling();
        let mut hard_deadline: Option<Instant> = None;
        let mut echo_checked = false;
        let mut lines = Vec::new();

        loop {
            let deadline = match hard_deadline {
                None => first_deadline,
                Some(cap) if Instant::now() >= cap => break,
                Some(cap) => cap.min(Instant::now() + self.config.settle()),
            };

            match timeout_at(deadline, self.io.read(&mut self.buf)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    self.closed = true;
                    break;
                }
                Ok(Ok(n)) => {
                    self.codec.push_bytes(&self.buf[..n]);
                    for line in self.codec.drain_lines() {
                        if !echo_checked {
                            echo_checked = true;
                            if is_echo(&line, &command_line) {
                                debug!("Dropping echo on {}", self.port);
                                continue;
                            }
                        }
                        debug!("IN <- {}: {}", self.port, line);
                        lines.push(line);
                    }
                    if !lines.is_empty() && hard_deadline.is_none() {
                        hard_deadline = Some(Instant::now() + self.config.reply_ceiling());
                    }
                }
                Ok(Err(e)) if is_transient(&e) => tokio::time::sleep(TRANSIENT_BACKOFF).await,
                Ok(Err(e)) => return Err(e),
            }
        }

        if let Some(tail) = self.codec.take_partial() {
            if echo_checked || !is_echo(&tail, &command_line) {
                lines.push(tail);
            }
        }

        if lines.is_empty() {
            if self.closed {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "transport closed by device",
                ));
            }
            debug!(
                "No reply on {} within {:?}",
                self.port,
                self.config.reply_ceiling()
            );
            return Ok(ReplyBody::Timeout);
        }
        Ok(ReplyBody::Lines(lines))
    }
}

fn deliver(
    routes: &HashMap<ServiceId, ReplySender>,
    port: &str,
    service: ServiceId,
    reply: Reply,
) {
    match routes.get(&service) {
        Some(tx) => {
            if tx.send(ServiceMessage::Reply(reply)).is_err() {
                debug!("Service {} on {} dropped its reply queue", service, port);
            }
        }
        None => warn!(
            "Reply {} for unregistered service {} on {} discarded",
            reply.seq, service, port
        ),
    }
}

async fn run_worker<T>(
    mut link: WorkerLink<T>,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    alive: Arc<AtomicBool>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    info!("Transport worker started on {}", link.port);

    let mut routes: HashMap<ServiceId, ReplySender> = HashMap::new();
    // Most recent requester; unsolicited lines are routed to it
    let mut last_service: Option<ServiceId> = None;
    let poll = link.config.poll_interval();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(WorkerCommand::Register { service, reply_tx }) => {
                    routes.insert(service, reply_tx);
                }
                Some(WorkerCommand::Deregister { service }) => {
                    routes.remove(&service);
                    if last_service == Some(service) {
                        last_service = None;
                    }
                }
                Some(WorkerCommand::Submit { seq, request }) => {
                    let stale = link.take_buffered();
                    link.publish_unsolicited(&routes, last_service, stale);

                    let service = request.service;
                    last_service = Some(service);

                    let (body, fatal) = match link.transact(&request).await {
                        Ok(body) => (body, None),
                        Err(e) => (ReplyBody::NotOpen(Some(e.to_string())), Some(e)),
                    };
                    deliver(&routes, &link.port, service, Reply { seq, body });

                    if let Some(e) = fatal {
                        warn!("Transport {} failed: {}", link.port, e);
                        break;
                    }
                    if link.closed {
                        info!("Transport {} closed by device", link.port);
                        break;
                    }
                }
                Some(WorkerCommand::Shutdown) => {
                    info!("Transport worker on {} shutting down", link.port);
                    break;
                }
                None => break,
            },
            result = timeout(poll, link.io.read(&mut link.buf)) => match result {
                Ok(Ok(0)) => {
                    info!("Transport {} reached end of stream", link.port);
                    break;
                }
                Ok(Ok(n)) => {
                    link.codec.push_bytes(&link.buf[..n]);
                    let lines = link.codec.drain_lines();
                    link.publish_unsolicited(&routes, last_service, lines);
                }
                Ok(Err(e)) if is_transient(&e) => {}
                Ok(Err(e)) => {
                    warn!("Read error on {}: {}", link.port, e);
                    break;
                }
                // Idle poll elapsed
                Err(_) => {}
            },
        }
    }

    alive.store(false, Ordering::SeqCst);
    info!("Transport worker stopped on {}", link.port);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pio_protocol::{Payload, Verb};

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            poll_interval_ms: 10,
            reply_ceiling_ms: 150,
            settle_ms: 30,
            shutdown_grace_ms: 500,
        }
    }

    #[test]
    fn test_echo_ignores_trailing_whitespace() {
        assert!(is_echo("DIO_SET 3 true  ", "DIO_SET 3 true"));
        assert!(!is_echo("DIO_SET 3 True", "DIO_SET 3 true"));
        assert!(!is_echo(" DIO_SET 3 true", "DIO_SET 3 true"));
    }

    #[tokio::test]
    async fn test_submit_requires_registration() {
        let (near, _far) = tokio::io::duplex(256);
        let worker = TransportWorker::spawn("virtual", near, fast_config());

        let request = CommandRequest::new(ServiceId::Relay, Verb::RelayRead, "0");
        assert!(matches!(
            worker.submit(1, request),
            Err(MuxError::ServiceNotRegistered { .. })
        ));

        worker.shutdown();
        assert!(worker.stopped().await);
        assert!(!worker.is_alive());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let (near, _far) = tokio::io::duplex(256);
        let worker = TransportWorker::spawn("virtual", near, fast_config());

        let (tx, _rx) = mpsc::unbounded_channel();
        worker.register(ServiceId::Spi, tx.clone()).unwrap();
        assert!(matches!(
            worker.register(ServiceId::Spi, tx),
            Err(MuxError::ServiceInUse { .. })
        ));
        assert_eq!(worker.services(), vec![ServiceId::Spi]);

        assert!(worker.deregister(ServiceId::Spi));
        assert!(!worker.deregister(ServiceId::Spi));
        worker.shutdown();
        worker.stopped().await;
    }

    #[tokio::test]
    async fn test_last_deregister_stops_worker() {
        let (near, _far) = tokio::io::duplex(256);
        let worker = TransportWorker::spawn("virtual", near, fast_config());

        let (tx, _rx) = mpsc::unbounded_channel();
        worker.register(ServiceId::DigitalIo, tx.clone()).unwrap();
        worker.register(ServiceId::Relay, tx).unwrap();

        assert!(worker.deregister(ServiceId::DigitalIo));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(worker.is_alive());

        assert!(worker.deregister(ServiceId::Relay));
        assert!(worker.stopped().await);
        assert!(!worker.is_alive());
    }

    #[tokio::test]
    async fn test_multi_line_request_rejected() {
        let (near, mut far) = tokio::io::duplex(256);
        let worker = TransportWorker::spawn("virtual", near, fast_config());
        let (tx, _rx) = mpsc::unbounded_channel();
        worker.register(ServiceId::DigitalIo, tx).unwrap();

        let request = CommandRequest::new(ServiceId::DigitalIo, Verb::DioRead, "1\r\nRELAY_SET 0");
        assert!(matches!(
            worker.submit(1, request),
            Err(MuxError::InvalidRequest(_))
        ));

        // Nothing reached the device
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_millis(50), far.read(&mut buf)).await;
        assert!(read.is_err());

        worker.shutdown();
        worker.stopped().await;
    }

    #[tokio::test]
    async fn test_silent_device_times_out() {
        let (near, _far) = tokio::io::duplex(256);
        let worker = TransportWorker::spawn("virtual", near, fast_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        worker.register(ServiceId::DigitalIo, tx).unwrap();

        worker
            .submit(7, CommandRequest::new(ServiceId::DigitalIo, Verb::Version, Payload::none()))
            .unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(
            msg,
            ServiceMessage::Reply(Reply {
                seq: 7,
                body: ReplyBody::Timeout
            })
        );
        worker.shutdown();
        worker.stopped().await;
    }

    #[tokio::test]
    async fn test_peer_hangup_stops_worker() {
        let (near, far) = tokio::io::duplex(256);
        let worker = TransportWorker::spawn("virtual", near, fast_config());
        drop(far);

        assert!(worker.stopped().await);
        assert!(!worker.is_alive());
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            worker.register(ServiceId::Relay, tx),
            Err(MuxError::WorkerStopped { .. })
        ));
    }
}
