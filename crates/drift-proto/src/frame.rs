//! Frame encoding: 4-byte big-endian length prefix + bincode payload.
//!
//! The transport reads the prefix from the stream itself, then hands the
//! payload bytes to [`decode_payload`]. [`encode_frame`] produces the whole
//! frame in one buffer so it can be written with a single call.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::messages::Message;

/// Length of the frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Upper bound on the payload of a single frame (64 MiB). A 1 MiB chunk plus
/// envelope fits comfortably; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

/// Frame encode/decode failures.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload serialization failed.
    #[error("encode error: {0}")]
    Encode(#[source] bincode::Error),
    /// Payload deserialization failed.
    #[error("decode error: {0}")]
    Decode(#[source] bincode::Error),
    /// Frame length exceeds [`MAX_FRAME_LEN`].
    #[error("frame of {0} bytes exceeds limit")]
    TooLarge(u64),
}

/// Encodes a message into one frame: big-endian length prefix followed by
/// the bincode payload.
pub fn encode_frame(message: &Message) -> Result<Bytes, FrameError> {
    let payload = bincode::serialize(message).map_err(FrameError::Encode)?;
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(FrameError::TooLarge(payload.len() as u64));
    }
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(&payload);
    Ok(buf.freeze())
}

/// Decodes the payload bytes of one frame (prefix already stripped).
pub fn decode_payload(payload: &[u8]) -> Result<Message, FrameError> {
    bincode::deserialize(payload).map_err(FrameError::Decode)
}

#[cfg(test)]
mod tests {
    use drift_core::{FileHash, PeerId};

    use super::*;
    use crate::messages::MessagePayload;

    fn sample_message() -> Message {
        Message::new(
            PeerId::from("ab12cd34"),
            MessagePayload::FileResponse {
                file_hash: FileHash::from_hex("deadbeef"),
                chunk_id: 2,
                success: true,
                data: Some(vec![1, 2, 3, 4, 5]),
                total_chunks: Some(9),
                error: None,
            },
        )
    }

    #[test]
    fn test_roundtrip() {
        let msg = sample_message();
        let frame = encode_frame(&msg).unwrap();

        let len = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - FRAME_HEADER_LEN);

        let decoded = decode_payload(&frame[FRAME_HEADER_LEN..]).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_prefix_is_big_endian() {
        let msg = Message::new(PeerId::from("ab12cd34"), MessagePayload::Ping);
        let frame = encode_frame(&msg).unwrap();
        let payload_len = frame.len() - FRAME_HEADER_LEN;
        // Small payload: the length lives entirely in the last prefix byte.
        assert_eq!(&frame[..3], &[0, 0, 0]);
        assert_eq!(frame[3] as usize, payload_len);
    }

    #[test]
    fn test_garbage_payload_rejected() {
        assert!(matches!(
            decode_payload(&[0xff; 16]),
            Err(FrameError::Decode(_))
        ));
    }
}
