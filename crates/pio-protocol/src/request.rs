//! Command requests and their line encoding

use crate::error::ParseError;
use crate::hex;
use crate::service::ServiceId;
use crate::verb::Verb;
use crate::LINE_TERMINATOR;

/// Argument payload of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Free text arguments, sent verbatim (`3 OUT`)
    Text(String),
    /// Raw bytes, sent as colon-separated hex pairs (`de:ad`)
    Bytes(Vec<u8>),
}

impl Payload {
    /// Empty argument list
    pub fn none() -> Self {
        Payload::Text(String::new())
    }

    /// Render the payload as it appears on the wire
    pub fn to_wire(&self) -> String {
        match self {
            Payload::Text(s) => s.trim().to_string(),
            Payload::Bytes(b) => hex::encode(b),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::none()
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(b: Vec<u8>) -> Self {
        Payload::Bytes(b)
    }
}

impl From<&[u8]> for Payload {
    fn from(b: &[u8]) -> Self {
        Payload::Bytes(b.to_vec())
    }
}

/// A request submitted by one service to the transport worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    /// Service issuing the request
    pub service: ServiceId,
    /// Command keyword
    pub verb: Verb,
    /// Arguments
    pub payload: Payload,
}

impl CommandRequest {
    /// Create a new request
    pub fn new(service: ServiceId, verb: Verb, payload: impl Into<Payload>) -> Self {
        Self {
            service,
            verb,
            payload: payload.into(),
        }
    }

    /// The command line without its terminator: `<VERB>[ <ARGS>]`
    pub fn command_line(&self) -> String {
        let args = self.payload.to_wire();
        if args.is_empty() {
            self.verb.as_str().to_string()
        } else {
            format!("{} {}", self.verb, args)
        }
    }

    /// Check that the request encodes to exactly one command line
    pub fn validate(&self) -> Result<(), ParseError> {
        match &self.payload {
            Payload::Text(s) if s.contains(['\r', '\n']) => {
                Err(ParseError::LineBreak(s.clone()))
            }
            _ => Ok(()),
        }
    }

    /// The full line written to the transport
    pub fn encode(&self) -> Vec<u8> {
        let mut line = self.command_line();
        line.push_str(LINE_TERMINATOR);
        line.into_bytes()
    }
}
