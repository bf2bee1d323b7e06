//! Frame encoder.
//!
//! Encoding is infallible: a [`Frame`] can only be built with a payload that
//! fits the length byte, so every frame has a valid wire form.  Decoding is
//! incremental and lives in [`crate::protocol::decoder`].

use crate::protocol::frame::{Frame, MAX_FRAME_LEN, SYNC1, SYNC2};

/// Encodes `frame` into a new byte vector.
///
/// # Examples
///
/// ```rust
/// use seriallink_core::{encode_frame, Command, Frame};
///
/// let frame = Frame::new(Command::LightColor, &[0x34, 0x12]).unwrap();
/// assert_eq!(encode_frame(&frame), vec![b'*', b'~', 0x01, 0x02, 0x34, 0x12]);
/// ```
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_FRAME_LEN);
    encode_frame_into(frame, &mut buf);
    buf
}

/// Appends the encoded form of `frame` to `buf`.
pub fn encode_frame_into(frame: &Frame, buf: &mut Vec<u8>) {
    buf.reserve(frame.encoded_len());
    buf.push(SYNC1);
    buf.push(SYNC2);
    buf.push(frame.command() as u8);
    buf.push(frame.len() as u8);
    buf.extend_from_slice(frame.payload());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::Command;

    #[test]
    fn test_encode_tempo_frame_layout() {
        // Arrange
        let frame = Frame::new(Command::Tempo, &[0x10, 0x20, 0x30, 0x40]).unwrap();

        // Act
        let bytes = encode_frame(&frame);

        // Assert
        assert_eq!(bytes, vec![0x2A, 0x7E, 0x02, 0x04, 0x10, 0x20, 0x30, 0x40]);
    }

    #[test]
    fn test_encode_empty_payload_is_header_only() {
        let frame = Frame::new(Command::ChargingAlarmLevel, &[]).unwrap();
        assert_eq!(encode_frame(&frame), vec![0x2A, 0x7E, 0x03, 0x00]);
    }

    #[test]
    fn test_encode_into_appends_after_existing_bytes() {
        // Arrange
        let mut buf = vec![0xEE];
        let frame = Frame::new(Command::LightColor, &[1, 2]).unwrap();

        // Act
        encode_frame_into(&frame, &mut buf);
        encode_frame_into(&frame, &mut buf);

        // Assert
        assert_eq!(buf.len(), 1 + 2 * frame.encoded_len());
        assert_eq!(buf[0], 0xEE);
        assert_eq!(&buf[1..3], &[SYNC1, SYNC2]);
        assert_eq!(&buf[7..9], &[SYNC1, SYNC2]);
    }
}
