//! Frame encoding: the outermost wire envelope.
//!
//! A frame is a 4-byte big-endian command id followed by the content
//! bytes, verbatim. There is no length field — the transport is
//! message-oriented (one WebSocket binary message per frame), so framing
//! is already handled below us.
//!
//! The two functions here are exact inverses: for every id and content,
//! `decode(&encode(id, content))` yields the same id and a byte-identical
//! content slice.

use crate::ProtocolError;
use crate::types::CommandId;

/// Size of the fixed frame header: the command id.
pub const HEADER_SIZE: usize = 4;

/// Encodes a command id and opaque content into a frame.
pub fn encode(id: CommandId, content: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + content.len());
    bytes.extend_from_slice(&id.0.to_be_bytes());
    bytes.extend_from_slice(content);
    bytes
}

/// Decodes a frame into its command id and raw content slice.
///
/// Content interpretation is deferred to the handler registered for the
/// id, so an unrecognized id never requires decoding unknown content.
///
/// # Errors
/// Returns [`ProtocolError::Truncated`] if the frame is shorter than the
/// header.
pub fn decode(frame: &[u8]) -> Result<(CommandId, &[u8]), ProtocolError> {
    if frame.len() < HEADER_SIZE {
        return Err(ProtocolError::Truncated(frame.len()));
    }
    let id = u32::from_be_bytes(
        frame[..HEADER_SIZE].try_into().expect("4-byte slice"),
    );
    Ok((CommandId(id), &frame[HEADER_SIZE..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_is_exact_inverse_of_encode() {
        // The core codec property: id and content survive a round trip
        // byte-for-byte, for arbitrary (non-JSON) content too.
        let cases: &[(u32, &[u8])] = &[
            (0, b""),
            (1, b"\x00"),
            (42, b"{\"nick\":\"alice\"}"),
            (u32::MAX, &[0xff, 0x00, 0x7f, 0x80]),
        ];
        for &(raw_id, content) in cases {
            let frame = encode(CommandId(raw_id), content);
            let (id, decoded) = decode(&frame).expect("should decode");
            assert_eq!(id, CommandId(raw_id));
            assert_eq!(decoded, content);
        }
    }

    #[test]
    fn test_decode_empty_content_yields_empty_slice() {
        let frame = encode(CommandId(7), b"");
        let (id, content) = decode(&frame).expect("should decode");
        assert_eq!(id, CommandId(7));
        assert!(content.is_empty());
    }

    #[test]
    fn test_decode_short_frame_returns_truncated() {
        for len in 0..HEADER_SIZE {
            let buf = vec![0u8; len];
            let result = decode(&buf);
            assert!(
                matches!(result, Err(ProtocolError::Truncated(n)) if n == len),
                "frame of {len} bytes should be truncated"
            );
        }
    }

    #[test]
    fn test_encode_id_is_big_endian_prefix() {
        let frame = encode(CommandId(0x0102_0304), b"x");
        assert_eq!(&frame[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&frame[4..], b"x");
    }
}
