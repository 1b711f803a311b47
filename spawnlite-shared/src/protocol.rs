//! Wire framing for helper exchanges.
//!
//! A message is a 16-bit big-endian byte count followed by that many bytes of
//! payload; the payload is the NUL-terminated concatenation of the message's
//! string fields. Passed descriptors travel separately, as ancillary data on
//! a one-byte carrier message (see the channel module in the core crate).
//!
//! Framing is pure so both the supervisor and Rust-side helper
//! implementations can share it.

use crate::errors::{SpawnliteError, SpawnliteResult};

/// Size of the frame header on the wire.
pub const HEADER_BYTES: usize = 2;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD_BYTES: usize = u16::MAX as usize;

/// Frame a message from its string fields.
///
/// Fields may be empty. A field containing a NUL byte cannot be represented
/// on the wire and is rejected, as is a message whose payload exceeds
/// [`MAX_PAYLOAD_BYTES`].
pub fn encode_message(fields: &[&str]) -> SpawnliteResult<Vec<u8>> {
    let payload_len: usize = fields.iter().map(|f| f.len() + 1).sum();
    if payload_len > MAX_PAYLOAD_BYTES {
        return Err(SpawnliteError::Transport(format!(
            "message payload of {payload_len} bytes exceeds the {MAX_PAYLOAD_BYTES}-byte frame limit"
        )));
    }

    let mut frame = Vec::with_capacity(HEADER_BYTES + payload_len);
    frame.extend_from_slice(&(payload_len as u16).to_be_bytes());
    for field in fields {
        if field.as_bytes().contains(&0) {
            return Err(SpawnliteError::Transport(format!(
                "message field {field:?} contains a NUL byte"
            )));
        }
        frame.extend_from_slice(field.as_bytes());
        frame.push(0);
    }
    Ok(frame)
}

/// Payload size announced by a frame header.
pub fn payload_len(header: [u8; HEADER_BYTES]) -> usize {
    u16::from_be_bytes(header) as usize
}

/// Split a frame payload back into its string fields.
///
/// Every field must be NUL-terminated; trailing bytes after the last
/// terminator mean the peer framed the message wrong.
pub fn decode_fields(payload: &[u8]) -> SpawnliteResult<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = payload;
    while let Some(pos) = rest.iter().position(|b| *b == 0) {
        let field = String::from_utf8(rest[..pos].to_vec()).map_err(|_| {
            SpawnliteError::Transport("message field is not valid UTF-8".into())
        })?;
        fields.push(field);
        rest = &rest[pos + 1..];
    }
    if !rest.is_empty() {
        return Err(SpawnliteError::Transport(
            "message payload ends in an unterminated field".into(),
        ));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let frame = encode_message(&["spawn_application", "/srv/app", "", ""]).unwrap();
        let header = [frame[0], frame[1]];
        assert_eq!(payload_len(header), frame.len() - HEADER_BYTES);

        let fields = decode_fields(&frame[HEADER_BYTES..]).unwrap();
        assert_eq!(fields, vec!["spawn_application", "/srv/app", "", ""]);
    }

    #[test]
    fn empty_message_is_valid() {
        let frame = encode_message(&[]).unwrap();
        assert_eq!(frame, vec![0, 0]);
        assert_eq!(decode_fields(&[]).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn header_is_big_endian() {
        let frame = encode_message(&["ab"]).unwrap();
        // "ab\0" is 3 payload bytes
        assert_eq!(&frame[..HEADER_BYTES], &[0, 3]);
    }

    #[test]
    fn nul_in_field_is_rejected() {
        let err = encode_message(&["bad\0field"]).unwrap_err();
        assert!(err.to_string().contains("NUL"));
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let big = "x".repeat(MAX_PAYLOAD_BYTES);
        let err = encode_message(&[&big]).unwrap_err();
        assert!(err.to_string().contains("frame limit"));
    }

    #[test]
    fn unterminated_payload_is_rejected() {
        let err = decode_fields(b"pid\0dangling").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let err = decode_fields(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }
}
