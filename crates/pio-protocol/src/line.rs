//! Streaming CR/LF line codec
//!
//! Serial reads arrive in arbitrary chunks. The codec buffers bytes and
//! yields complete lines with the `\r\n` (or bare `\n`) terminator removed.
//! Leading whitespace is preserved because multi-line replies indent their
//! table rows.

/// Longest line kept before the buffer is force-flushed
const MAX_LINE_LEN: usize = 4096;

/// Streaming line codec
#[derive(Debug, Default)]
pub struct LineCodec {
    buffer: Vec<u8>,
}

impl LineCodec {
    /// Create a new line codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Push raw bytes into the codec buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract the next complete line, if any
    pub fn next_line(&mut self) -> Option<String> {
        match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                Some(Self::decode(&raw[..raw.len() - 1]))
            }
            None if self.buffer.len() > MAX_LINE_LEN => {
                tracing::warn!(
                    "Line exceeded {} bytes without terminator, flushing",
                    MAX_LINE_LEN
                );
                let raw = std::mem::take(&mut self.buffer);
                Some(Self::decode(&raw))
            }
            None => None,
        }
    }

    /// Drain every complete line currently buffered
    pub fn drain_lines(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_line()).collect()
    }

    /// Take the unterminated remainder as a final line, if non-empty
    pub fn take_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        Some(Self::decode(&raw))
    }

    /// Whether any bytes are buffered
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn decode(raw: &[u8]) -> String {
        let line = String::from_utf8_lossy(raw);
        line.trim_end_matches('\r').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crlf_lines() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"VERSION 0.0.1\r\nHELP\r\n");
        assert_eq!(codec.next_line().as_deref(), Some("VERSION 0.0.1"));
        assert_eq!(codec.next_line().as_deref(), Some("HELP"));
        assert_eq!(codec.next_line(), None);
    }

    #[test]
    fn test_split_chunks() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"DIO_RE");
        assert_eq!(codec.next_line(), None);
        codec.push_bytes(b"AD 3 True\r");
        assert_eq!(codec.next_line(), None);
        codec.push_bytes(b"\n");
        assert_eq!(codec.next_line().as_deref(), Some("DIO_READ 3 True"));
    }

    #[test]
    fn test_preserves_indentation() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"RELAY_LIST \r\n    0 GP6 False\r\n");
        assert_eq!(
            codec.drain_lines(),
            vec!["RELAY_LIST ".to_string(), "    0 GP6 False".to_string()]
        );
    }

    #[test]
    fn test_bare_lf_and_partial() {
        let mut codec = LineCodec::new();
        codec.push_bytes(b"one\ntwo");
        assert_eq!(codec.drain_lines(), vec!["one".to_string()]);
        assert!(codec.has_pending());
        assert_eq!(codec.take_partial().as_deref(), Some("two"));
        assert!(!codec.has_pending());
    }

    #[test]
    fn test_overlong_line_is_flushed() {
        let mut codec = LineCodec::new();
        codec.push_bytes(&vec![b'x'; MAX_LINE_LEN + 1]);
        let line = codec.next_line().unwrap();
        assert_eq!(line.len(), MAX_LINE_LEN + 1);
        assert!(!codec.has_pending());
    }
}
