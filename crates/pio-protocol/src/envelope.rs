//! Classified response envelopes

use std::fmt;

use crate::verb::Verb;

/// Data carried by the synthetic reply for a silent transport
pub const TIMEOUT_TEXT: &str = "TIMEOUT";

/// Data carried by the synthetic reply for a failed write
pub const NOT_OPEN_TEXT: &str = "ERROR: port not open";

/// Data carried when no reply lines were available at all
pub const NO_RESPONSE_TEXT: &str = "no response";

/// Kind of a classified reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResponseKind {
    /// Well-formed reply to the given verb
    Reply(Verb),
    /// Remote or local error
    Error,
    /// Remote exception while running the command
    Exception,
}

impl fmt::Display for ResponseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseKind::Reply(verb) => write!(f, "{}", verb),
            ResponseKind::Error => f.write_str("ERROR"),
            ResponseKind::Exception => f.write_str("EXCEPTION"),
        }
    }
}

/// Why an envelope is not a normal reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Failure {
    /// No reply lines reached the caller
    NoResponse,
    /// The transport rejected the write
    ConnectionNotOpen,
    /// The device stayed silent past the worker's reply ceiling
    Timeout,
    /// The device replied `ERROR:`
    ProtocolError,
    /// The device replied `EXCEPTION:`
    RemoteException,
    /// The first reply token was not a known verb
    MalformedResponse,
}

/// Structured result handed back to a caller after a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Envelope {
    /// Classification of the reply
    pub kind: ResponseKind,
    /// Primary data (remaining tokens of the first line, or the error text)
    pub data: String,
    /// Second and subsequent reply lines joined by `\n`
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub extension: Option<String>,
    /// Failure classification for ERROR and EXCEPTION envelopes
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub failure: Option<Failure>,
}

impl Envelope {
    /// A normal reply
    pub fn reply(verb: Verb, data: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Reply(verb),
            data: data.into(),
            extension: None,
            failure: None,
        }
    }

    /// An ERROR envelope with the given failure class
    pub fn error(failure: Failure, data: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Error,
            data: data.into(),
            extension: None,
            failure: Some(failure),
        }
    }

    /// An EXCEPTION envelope
    pub fn exception(data: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Exception,
            data: data.into(),
            extension: None,
            failure: Some(Failure::RemoteException),
        }
    }

    /// Synthetic envelope for an empty or missing reply
    pub fn no_response() -> Self {
        Self::error(Failure::NoResponse, NO_RESPONSE_TEXT)
    }

    /// Synthetic envelope for a silent transport
    pub fn timeout() -> Self {
        Self::error(Failure::Timeout, TIMEOUT_TEXT)
    }

    /// Synthetic envelope for a failed write
    pub fn not_open(detail: Option<&str>) -> Self {
        match detail {
            Some(d) => Self::error(Failure::ConnectionNotOpen, format!("{} ({})", NOT_OPEN_TEXT, d)),
            None => Self::error(Failure::ConnectionNotOpen, NOT_OPEN_TEXT),
        }
    }

    /// Attach extension lines
    pub fn with_extension(mut self, extension: Option<String>) -> Self {
        self.extension = extension;
        self
    }

    /// The verb this envelope answers, if it is a normal reply
    pub fn verb(&self) -> Option<Verb> {
        match self.kind {
            ResponseKind::Reply(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this is an ERROR or EXCEPTION envelope
    pub fn is_failure(&self) -> bool {
        !matches!(self.kind, ResponseKind::Reply(_))
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.data.is_empty() {
            write!(f, " {}", self.data)?;
        }
        if let Some(ext) = &self.extension {
            write!(f, "\n{}", ext)?;
        }
        Ok(())
    }
}
