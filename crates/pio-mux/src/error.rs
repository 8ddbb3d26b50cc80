//! Error types for the multiplexer

use pio_protocol::{ParseError, ServiceId};
use thiserror::Error;

/// Errors that can occur in the multiplexer
///
/// Expected device-side failures (timeouts, `ERROR:` replies, a rejected
/// write) are reported as envelopes, not as errors. These variants cover
/// misuse of the API and workers that are no longer running.
#[derive(Debug, Error)]
pub enum MuxError {
    /// Service already registered on this port
    #[error("service {service} already registered on {port}")]
    ServiceInUse {
        /// Port identifier
        port: String,
        /// Service that was registered twice
        service: ServiceId,
    },

    /// Request submitted for a service that is not registered
    #[error("service {service} not registered on {port}")]
    ServiceNotRegistered {
        /// Port identifier
        port: String,
        /// Unregistered service
        service: ServiceId,
    },

    /// Request could not be sent as a single command line
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ParseError),

    /// The port's transport worker is no longer running
    #[error("transport worker for {port} has stopped")]
    WorkerStopped {
        /// Port identifier
        port: String,
    },

    /// The connector could not open the port
    #[error("failed to open {port}: {source}")]
    Open {
        /// Port identifier
        port: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
