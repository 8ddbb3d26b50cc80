//! Client-side handle for one service on one port

use std::collections::VecDeque;
use std::sync::Arc;

use pio_protocol::{
    classify_with, CommandRequest, Envelope, MarkerPrecedence, Payload, ServiceId, Verb,
};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::error::MuxError;
use crate::registry::PortRegistry;
use crate::worker::{ReplyBody, ReplyReceiver, ServiceMessage, TransportWorker};

/// A registered service on a shared port
///
/// `invoke` suspends only the calling task. Other services on the same port
/// keep submitting; their requests are served in arrival order by the
/// port's worker.
pub struct ServiceChannel {
    port: String,
    service: ServiceId,
    registry: PortRegistry,
    worker: Arc<TransportWorker>,
    reply_rx: ReplyReceiver,
    next_seq: u64,
    config: ChannelConfig,
    precedence: MarkerPrecedence,
    driver_version: Option<String>,
    unsolicited: VecDeque<String>,
    released: bool,
}

impl std::fmt::Debug for ServiceChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceChannel")
            .field("port", &self.port)
            .field("service", &self.service)
            .field("next_seq", &self.next_seq)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl ServiceChannel {
    /// Register `service` on `port` with the default channel configuration
    pub fn open(
        registry: &PortRegistry,
        port: impl Into<String>,
        service: ServiceId,
    ) -> Result<Self, MuxError> {
        Self::with_config(registry, port, service, ChannelConfig::default())
    }

    /// Register `service` on `port`
    pub fn with_config(
        registry: &PortRegistry,
        port: impl Into<String>,
        service: ServiceId,
        config: ChannelConfig,
    ) -> Result<Self, MuxError> {
        let port = port.into();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let worker = registry.acquire(&port, service, reply_tx)?;

        Ok(Self {
            port,
            service,
            registry: registry.clone(),
            worker,
            reply_rx,
            next_seq: 0,
            config,
            precedence: MarkerPrecedence::default(),
            driver_version: None,
            unsolicited: VecDeque::new(),
            released: false,
        })
    }

    /// Choose which marker wins when a reply carries both `ERROR:` and
    /// `EXCEPTION:`
    pub fn with_precedence(mut self, precedence: MarkerPrecedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Port this channel is registered on
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Service this channel speaks for
    pub fn service(&self) -> ServiceId {
        self.service
    }

    /// Whether the port's worker is still running
    pub fn is_connected(&self) -> bool {
        self.worker.is_alive()
    }

    /// Subscribe to every unsolicited line on this channel's port
    pub fn subscribe_unsolicited(&self) -> broadcast::Receiver<String> {
        self.worker.subscribe_unsolicited()
    }

    /// Send one command and wait for its classified reply
    ///
    /// Device-side failures come back as ERROR or EXCEPTION envelopes.
    /// `Err` is reserved for a worker that is no longer running and for a
    /// text payload containing CR or LF, which would put a second command
    /// on the wire.
    pub async fn invoke(
        &mut self,
        verb: Verb,
        payload: impl Into<Payload>,
    ) -> Result<Envelope, MuxError> {
        self.next_seq += 1;
        let seq = self.next_seq;
        let request = CommandRequest::new(self.service, verb, payload);
        debug!(
            "Service {} on {} invoking {}",
            self.service,
            self.port,
            request.command_line()
        );
        self.worker.submit(seq, request)?;

        let deadline = Instant::now() + self.config.response_timeout();
        let envelope = loop {
            match timeout_at(deadline, self.reply_rx.recv()).await {
                Err(_) => {
                    warn!(
                        "Service {} on {} gave up waiting for {} after {:?}",
                        self.service,
                        self.port,
                        verb,
                        self.config.response_timeout()
                    );
                    break Envelope::no_response();
                }
                Ok(None) => {
                    return Err(MuxError::WorkerStopped {
                        port: self.port.clone(),
                    })
                }
                Ok(Some(ServiceMessage::Unsolicited(lines))) => self.stash_unsolicited(lines),
                Ok(Some(ServiceMessage::Reply(reply))) if reply.seq != seq => {
                    debug!(
                        "Discarding late reply {} on {} (waiting for {})",
                        reply.seq, self.port, seq
                    );
                }
                Ok(Some(ServiceMessage::Reply(reply))) => break self.envelope_for(reply.body),
            }
        };

        if envelope.is_failure() {
            warn!(
                "{} on {} returned {}: {}",
                verb, self.port, envelope.kind, envelope.data
            );
        }
        Ok(envelope)
    }

    fn envelope_for(&self, body: ReplyBody) -> Envelope {
        match body {
            ReplyBody::Lines(lines) => classify_with(&lines[..], self.precedence),
            ReplyBody::Timeout => Envelope::timeout(),
            ReplyBody::NotOpen(detail) => Envelope::not_open(detail.as_deref()),
        }
    }

    /// Firmware version reported by `VERSION`
    ///
    /// The first successful answer is cached for the life of the channel.
    /// A failed query returns the failure text and is retried next time.
    pub async fn driver_version(&mut self) -> Result<String, MuxError> {
        if let Some(version) = &self.driver_version {
            return Ok(version.clone());
        }
        let envelope = self.invoke(Verb::Version, Payload::none()).await?;
        if envelope.verb() == Some(Verb::Version) {
            self.driver_version = Some(envelope.data.clone());
        }
        Ok(envelope.data)
    }

    /// Take the unsolicited lines received since the last call
    ///
    /// At most `unsolicited_limit` of the newest lines are kept. Lines stay
    /// queued until this or `invoke` runs, so a channel on a chatty port
    /// should drain them periodically.
    pub fn take_unsolicited(&mut self) -> Vec<String> {
        while let Ok(message) = self.reply_rx.try_recv() {
            match message {
                ServiceMessage::Unsolicited(lines) => self.stash_unsolicited(lines),
                ServiceMessage::Reply(reply) => {
                    debug!("Discarding late reply {} on {}", reply.seq, self.port);
                }
            }
        }
        self.unsolicited.drain(..).collect()
    }

    fn stash_unsolicited(&mut self, lines: Vec<String>) {
        debug!(
            "Service {} on {} holding {} unsolicited line(s)",
            self.service,
            self.port,
            lines.len()
        );
        self.unsolicited.extend(lines);

        let excess = self
            .unsolicited
            .len()
            .saturating_sub(self.config.unsolicited_limit);
        if excess > 0 {
            warn!(
                "Service {} on {} dropped {} unsolicited line(s) over the limit of {}",
                self.service, self.port, excess, self.config.unsolicited_limit
            );
            self.unsolicited.drain(..excess);
        }
    }

    /// Deregister the service, stopping the port's worker if it was the last
    pub async fn close(mut self) {
        self.released = true;
        if let Some(worker) = self.registry.release_from(&self.worker, self.service) {
            worker.stopped().await;
        }
        debug!("Closed service {} on {}", self.service, self.port);
    }
}

impl Drop for ServiceChannel {
    fn drop(&mut self) {
        if !self.released {
            // Signals the worker to stop without waiting for it
            let _ = self.registry.release_from(&self.worker, self.service);
        }
    }
}
