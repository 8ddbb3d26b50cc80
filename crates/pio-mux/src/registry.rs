//! Process-wide mapping from port identifier to its transport worker
//!
//! The registry guarantees at most one live worker per port. Workers are
//! created lazily on the first acquire and stopped when their last service
//! is released. A worker found dead on acquire is replaced with a fresh
//! connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pio_protocol::ServiceId;
use tracing::{info, warn};

use crate::config::{SerialConfig, WorkerConfig};
use crate::error::MuxError;
use crate::transport::{Connector, SerialConnector};
use crate::worker::{ReplySender, TransportWorker};

struct RegistryInner {
    connector: Box<dyn Connector>,
    config: WorkerConfig,
    ports: Mutex<HashMap<String, Arc<TransportWorker>>>,
}

/// Shared port registry
///
/// Cloning is cheap; clones share the same workers.
#[derive(Clone)]
pub struct PortRegistry {
    inner: Arc<RegistryInner>,
}

impl PortRegistry {
    /// Create a registry that opens ports through `connector`
    pub fn new(connector: impl Connector + 'static, config: WorkerConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                connector: Box::new(connector),
                config,
                ports: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Create a registry for physical serial ports
    pub fn serial(serial: SerialConfig, config: WorkerConfig) -> Self {
        Self::new(SerialConnector::new(serial), config)
    }

    /// Worker configuration used for new workers
    pub fn worker_config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Register `service` on `port`, spawning the worker if needed
    ///
    /// Must be called from within a Tokio runtime.
    pub fn acquire(
        &self,
        port: &str,
        service: ServiceId,
        reply_tx: ReplySender,
    ) -> Result<Arc<TransportWorker>, MuxError> {
        let mut ports = self.lock();

        if let Some(existing) = ports.get(port) {
            if !existing.is_alive() {
                warn!("Transport worker for {} is dead, replacing it", port);
                ports.remove(port);
            }
        }

        let worker = match ports.get(port) {
            Some(worker) => worker.clone(),
            None => {
                let io = self
                    .inner
                    .connector
                    .connect(port)
                    .map_err(|source| MuxError::Open {
                        port: port.to_string(),
                        source,
                    })?;
                let worker = TransportWorker::spawn(port, io, self.inner.config.clone());
                info!("Created transport worker for {}", port);
                ports.insert(port.to_string(), worker.clone());
                worker
            }
        };

        worker.register(service, reply_tx)?;
        Ok(worker)
    }

    /// Deregister `service` from `port`
    ///
    /// When no services remain the worker is told to stop and removed from
    /// the registry. The removed worker is returned so the caller can await
    /// its exit.
    pub fn release(&self, port: &str, service: ServiceId) -> Option<Arc<TransportWorker>> {
        let worker = self.lock().get(port).cloned()?;
        self.release_from(&worker, service)
    }

    /// Deregister `service` from a specific worker
    ///
    /// Does nothing to the registry entry if it has since been replaced by a
    /// different worker.
    pub fn release_from(
        &self,
        worker: &Arc<TransportWorker>,
        service: ServiceId,
    ) -> Option<Arc<TransportWorker>> {
        let mut ports = self.lock();
        worker.deregister(service);

        if !worker.services().is_empty() {
            return None;
        }
        worker.shutdown();

        match ports.get(worker.port()) {
            Some(current) if Arc::ptr_eq(current, worker) => {
                info!("Last service left {}, stopping its worker", worker.port());
                ports.remove(worker.port())
            }
            _ => Some(worker.clone()),
        }
    }

    /// The live worker for `port`, if any
    pub fn worker(&self, port: &str) -> Option<Arc<TransportWorker>> {
        self.lock().get(port).filter(|w| w.is_alive()).cloned()
    }

    /// Ports with a registered worker
    pub fn ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = self.lock().keys().cloned().collect();
        ports.sort();
        ports
    }

    /// Stop every worker and wait for them to exit
    pub async fn shutdown_all(&self) {
        let workers: Vec<Arc<TransportWorker>> =
            self.lock().drain().map(|(_, worker)| worker).collect();
        for worker in &workers {
            worker.shutdown();
        }
        for worker in workers {
            worker.stopped().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<TransportWorker>>> {
        self.inner
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BoxedTransport;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn counting_registry() -> (PortRegistry, Arc<AtomicUsize>) {
        let opened = Arc::new(AtomicUsize::new(0));
        let counter = opened.clone();
        let connector = move |_port: &str| -> io::Result<BoxedTransport> {
            counter.fetch_add(1, Ordering::SeqCst);
            let (near, far) = tokio::io::duplex(256);
            // Keep the device end open for the lifetime of the test runtime
            tokio::spawn(async move {
                let _far = far;
                std::future::pending::<()>().await;
            });
            Ok(Box::new(near))
        };
        (PortRegistry::new(connector, WorkerConfig::default()), opened)
    }

    #[tokio::test]
    async fn test_one_worker_per_port() {
        let (registry, opened) = counting_registry();
        let (tx, _rx) = mpsc::unbounded_channel();

        let a = registry.acquire("COM1", ServiceId::DigitalIo, tx.clone()).unwrap();
        let b = registry.acquire("COM1", ServiceId::Relay, tx.clone()).unwrap();
        let c = registry.acquire("COM2", ServiceId::Relay, tx).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        assert_eq!(registry.ports(), vec!["COM1".to_string(), "COM2".to_string()]);

        registry.shutdown_all().await;
        assert!(registry.ports().is_empty());
    }

    #[tokio::test]
    async fn test_release_last_service_stops_worker() {
        let (registry, _) = counting_registry();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.acquire("COM1", ServiceId::DigitalIo, tx.clone()).unwrap();
        registry.acquire("COM1", ServiceId::Spi, tx).unwrap();

        assert!(registry.release("COM1", ServiceId::DigitalIo).is_none());
        assert!(registry.worker("COM1").is_some());

        let worker = registry.release("COM1", ServiceId::Spi).unwrap();
        assert!(worker.stopped().await);
        assert!(registry.worker("COM1").is_none());
        assert!(registry.ports().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_service_rejected() {
        let (registry, _) = counting_registry();
        let (tx, _rx) = mpsc::unbounded_channel();

        registry.acquire("COM1", ServiceId::Relay, tx.clone()).unwrap();
        let err = registry.acquire("COM1", ServiceId::Relay, tx).unwrap_err();
        assert!(matches!(err, MuxError::ServiceInUse { .. }));
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let connector = |port: &str| -> io::Result<BoxedTransport> {
            Err(io::Error::new(io::ErrorKind::NotFound, format!("{} missing", port)))
        };
        let registry = PortRegistry::new(connector, WorkerConfig::default());
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = registry.acquire("COM9", ServiceId::Spi, tx).unwrap_err();
        assert!(matches!(err, MuxError::Open { ref port, .. } if port == "COM9"));
        assert!(registry.ports().is_empty());
    }
}
