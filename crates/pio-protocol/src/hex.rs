//! Hex byte encoding used for SPI payloads
//!
//! The host sends bytes as colon-separated lowercase pairs (`de:ad`). The
//! firmware reports bytes space-separated (`de ad`). Decoding accepts either
//! separator and left-pads any odd-length group with a `0`.

use crate::error::ParseError;

/// Encode bytes as colon-separated lowercase hex pairs: `[0xDE, 0xAD]` → `de:ad`
pub fn encode(data: &[u8]) -> String {
    join(data, ':')
}

/// Encode bytes as space-separated lowercase hex pairs: `[0xDE, 0xAD]` → `de ad`
pub fn encode_spaced(data: &[u8]) -> String {
    join(data, ' ')
}

fn join(data: &[u8], sep: char) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}

/// Decode a hex string with `:` or space separators
pub fn decode(text: &str) -> Result<Vec<u8>, ParseError> {
    let mut digits = String::with_capacity(text.len());
    for group in text.split([':', ' ']).filter(|g| !g.is_empty()) {
        if group.len() % 2 == 1 {
            digits.push('0');
        }
        digits.push_str(group);
    }

    let bytes = digits.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks(2) {
        let hi = nibble(pair[0]).ok_or_else(|| ParseError::InvalidHex(text.to_string()))?;
        let lo = nibble(pair[1]).ok_or_else(|| ParseError::InvalidHex(text.to_string()))?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode() {
        assert_eq!(encode(&[0xDE, 0xAD]), "de:ad");
        assert_eq!(encode_spaced(&[0xDE, 0xAD]), "de ad");
        assert_eq!(encode(&[0x05]), "05");
        assert_eq!(encode(&[]), "");
    }

    #[test]
    fn test_decode_separators() {
        assert_eq!(decode("de:ad").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(decode("de ad").unwrap(), vec![0xDE, 0xAD]);
        assert_eq!(decode("DEAD").unwrap(), vec![0xDE, 0xAD]);
    }

    #[test]
    fn test_decode_pads_odd_groups() {
        assert_eq!(decode("a").unwrap(), vec![0x0A]);
        assert_eq!(decode("1:ff:2").unwrap(), vec![0x01, 0xFF, 0x02]);
        assert_eq!(decode("abc").unwrap(), vec![0x0A, 0xBC]);
    }

    #[test]
    fn test_decode_rejects_non_hex() {
        assert!(matches!(decode("zz"), Err(ParseError::InvalidHex(_))));
    }

    proptest! {
        #[test]
        fn decode_inverts_both_encodings(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            prop_assert_eq!(decode(&encode(&data)).unwrap(), data.clone());
            prop_assert_eq!(decode(&encode_spaced(&data)).unwrap(), data);
        }
    }
}
