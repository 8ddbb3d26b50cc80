//! Error types for protocol parsing and encoding

use thiserror::Error;

/// Errors that can occur while parsing protocol text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Verb keyword not part of the protocol
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// Service name not recognised
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// Hex payload contained a non-hex character
    #[error("invalid hex digit in {0:?}")]
    InvalidHex(String),

    /// Text payload would span more than one command line
    #[error("line break in payload: {0:?}")]
    LineBreak(String),

    /// Direction token was neither an input nor an output spelling
    #[error("invalid direction: {0}")]
    InvalidDirection(String),
}
