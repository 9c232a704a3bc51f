//! Persisted record formats.
//! Counters: text, `"<uplink> <downlink>"`. Keys: 4 bytes LE length + bincode body + SHA-256.

use crate::integrity::{self, CHECKSUM_LEN};
use crate::session::SessionKeys;

const LEN_SIZE: usize = 4;
const MAX_KEY_RECORD_LEN: u32 = 4 * 1024;

/// Encode the counter record. Single line, no trailing newline.
pub fn encode_counters(uplink: u32, downlink: u32) -> String {
    format!("{} {}", uplink, downlink)
}

/// Decode the counter record. Last non-empty line wins; it must hold exactly two u32 values.
pub fn decode_counters(text: &str) -> Result<(u32, u32), RecordError> {
    let line = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or(RecordError::Empty)?;
    let mut fields = line.split_whitespace();
    let uplink = parse_counter(fields.next())?;
    let downlink = parse_counter(fields.next())?;
    if let Some(extra) = fields.next() {
        return Err(RecordError::Trailing(extra.to_string()));
    }
    Ok((uplink, downlink))
}

fn parse_counter(field: Option<&str>) -> Result<u32, RecordError> {
    let field = field.ok_or(RecordError::MissingField)?;
    field
        .parse::<u32>()
        .map_err(|_| RecordError::BadCounter(field.to_string()))
}

/// Encode the key record: length prefix, bincode body, checksum over the body.
pub fn encode_keys(keys: &SessionKeys) -> Result<Vec<u8>, RecordError> {
    let body = bincode::serialize(keys).map_err(RecordError::Encode)?;
    let len = body.len() as u32;
    if len > MAX_KEY_RECORD_LEN {
        return Err(RecordError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + body.len() + CHECKSUM_LEN);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(&integrity::checksum(&body));
    Ok(out)
}

/// Decode a key record written by `encode_keys`. Any truncation or checksum mismatch is an error.
pub fn decode_keys(bytes: &[u8]) -> Result<SessionKeys, RecordError> {
    if bytes.len() < LEN_SIZE {
        return Err(RecordError::Truncated);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if len > MAX_KEY_RECORD_LEN {
        return Err(RecordError::TooLarge);
    }
    let body_end = LEN_SIZE + len as usize;
    if bytes.len() != body_end + CHECKSUM_LEN {
        return Err(RecordError::Truncated);
    }
    let body = &bytes[LEN_SIZE..body_end];
    let mut expected = [0u8; CHECKSUM_LEN];
    expected.copy_from_slice(&bytes[body_end..]);
    if !integrity::verify(body, &expected) {
        return Err(RecordError::ChecksumMismatch);
    }
    bincode::deserialize(body).map_err(RecordError::Decode)
}

/// Error encoding or decoding a persisted record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record is empty")]
    Empty,
    #[error("record is missing a counter")]
    MissingField,
    #[error("invalid counter value {0:?}")]
    BadCounter(String),
    #[error("unexpected trailing field {0:?}")]
    Trailing(String),
    #[error("record truncated")]
    Truncated,
    #[error("record too large")]
    TooLarge,
    #[error("record checksum mismatch")]
    ChecksumMismatch,
    #[error("encode error: {0}")]
    Encode(bincode::Error),
    #[error("decode error: {0}")]
    Decode(bincode::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_keys;

    #[test]
    fn counters_text_format() {
        assert_eq!(encode_counters(12, 3), "12 3");
        assert_eq!(decode_counters("12 3").unwrap(), (12, 3));
        assert_eq!(decode_counters("12 3\n").unwrap(), (12, 3));
        assert_eq!(decode_counters(" 12\t3 \n").unwrap(), (12, 3));
    }

    #[test]
    fn counters_last_line_wins() {
        assert_eq!(decode_counters("1 1\n7 2\n\n").unwrap(), (7, 2));
    }

    #[test]
    fn counters_reject_garbage() {
        assert!(matches!(decode_counters(""), Err(RecordError::Empty)));
        assert!(matches!(decode_counters("  \n"), Err(RecordError::Empty)));
        assert!(matches!(decode_counters("12"), Err(RecordError::MissingField)));
        assert!(matches!(
            decode_counters("12 x"),
            Err(RecordError::BadCounter(_))
        ));
        assert!(matches!(
            decode_counters("-1 3"),
            Err(RecordError::BadCounter(_))
        ));
        assert!(matches!(
            decode_counters("4294967296 0"),
            Err(RecordError::BadCounter(_))
        ));
        assert!(matches!(
            decode_counters("1 2 3"),
            Err(RecordError::Trailing(_))
        ));
    }

    #[test]
    fn key_record_roundtrip() {
        let bytes = encode_keys(&test_keys()).unwrap();
        assert_eq!(decode_keys(&bytes).unwrap(), test_keys());
    }

    #[test]
    fn key_record_detects_bit_flip() {
        let mut bytes = encode_keys(&test_keys()).unwrap();
        bytes[LEN_SIZE + 3] ^= 0x01;
        assert!(matches!(
            decode_keys(&bytes),
            Err(RecordError::ChecksumMismatch)
        ));
    }

    #[test]
    fn key_record_detects_truncation() {
        let bytes = encode_keys(&test_keys()).unwrap();
        assert!(matches!(decode_keys(&bytes[..2]), Err(RecordError::Truncated)));
        assert!(matches!(
            decode_keys(&bytes[..bytes.len() - 1]),
            Err(RecordError::Truncated)
        ));
    }
}
