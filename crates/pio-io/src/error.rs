//! Error types for the device clients

use pio_mux::MuxError;
use pio_protocol::{Envelope, Failure, Verb};
use thiserror::Error;

/// Errors returned by the device clients
#[derive(Debug, Error)]
pub enum IoError {
    /// The multiplexer refused the request
    #[error(transparent)]
    Mux(#[from] MuxError),

    /// The I/O configuration is unusable
    #[error("invalid I/O configuration: {0}")]
    Config(String),

    /// A pin name that is neither configured nor a pin index
    #[error("unknown pin: {0}")]
    UnknownPin(String),

    /// The board answered with something the operation cannot accept
    #[error("device reported {failure:?}: {message}")]
    Device {
        /// Failure class of the envelope
        failure: Failure,
        /// Envelope data
        message: String,
    },

    /// Operation the serial controller cannot perform
    #[error("unsupported by the serial controller: {0}")]
    Unsupported(&'static str),
}

impl IoError {
    /// Accept an envelope only if it is a normal reply to `verb`
    pub fn expect_reply(envelope: Envelope, verb: Verb) -> Result<Envelope, IoError> {
        match (envelope.failure, envelope.verb()) {
            (None, Some(v)) if v == verb => Ok(envelope),
            (Some(failure), _) => Err(IoError::Device {
                failure,
                message: envelope.data,
            }),
            _ => Err(IoError::Device {
                failure: Failure::MalformedResponse,
                message: format!("expected {} reply, got {}", verb, envelope.kind),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expect_reply() {
        let ok = Envelope::reply(Verb::DioRead, "3 True");
        assert!(IoError::expect_reply(ok, Verb::DioRead).is_ok());

        let wrong = Envelope::reply(Verb::Version, "0.0.1");
        assert!(matches!(
            IoError::expect_reply(wrong, Verb::DioRead),
            Err(IoError::Device {
                failure: Failure::MalformedResponse,
                ..
            })
        ));

        let timeout = Envelope::timeout();
        assert!(matches!(
            IoError::expect_reply(timeout, Verb::DioRead),
            Err(IoError::Device {
                failure: Failure::Timeout,
                ..
            })
        ));
    }
}
