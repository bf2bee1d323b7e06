//! Frame and command types for the SerialLink packet protocol.
//!
//! Wire format:
//! ```text
//! [SYNC1:1][SYNC2:1][command:1][length:1][payload:length]
//! ```
//! `SYNC1` is `'*'` (0x2A) and `SYNC2` is `'~'` (0x7E).  Multi-byte payload
//! fields are little-endian.  The payload is at most [`MAX_PAYLOAD_LEN`]
//! bytes.  There is no checksum field.

use thiserror::Error;

/// First start-of-frame sentinel.
pub const SYNC1: u8 = b'*';

/// Second start-of-frame sentinel.
pub const SYNC2: u8 = b'~';

/// Largest payload a frame may carry.
pub const MAX_PAYLOAD_LEN: usize = 4;

/// Bytes preceding the payload: two sync bytes, command, length.
pub const HEADER_SIZE: usize = 4;

/// Largest encoded frame on the wire.
pub const MAX_FRAME_LEN: usize = HEADER_SIZE + MAX_PAYLOAD_LEN;

/// Errors raised when building or interpreting frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The command byte is not a recognized value (0 is reserved).
    #[error("unknown command: 0x{0:02X}")]
    UnknownCommand(u8),

    /// The payload exceeds [`MAX_PAYLOAD_LEN`].
    #[error("payload too large: {len} bytes (maximum {MAX_PAYLOAD_LEN})")]
    PayloadTooLarge { len: usize },
}

/// Commands understood by the device.
///
/// Value 0 is reserved as "none" and never appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// 16-bit light colour, 2-byte payload.
    LightColor = 0x01,
    /// Tempo as fixed-point `u32` (four decimal places), 4-byte payload.
    Tempo = 0x02,
    /// Charging alarm level: alarm index byte then level byte.
    ChargingAlarmLevel = 0x03,
}

impl Command {
    /// Every valid command in tag order.
    pub const ALL: [Command; 3] = [
        Command::LightColor,
        Command::Tempo,
        Command::ChargingAlarmLevel,
    ];

    /// The exact payload width this command carries.
    ///
    /// The decoder accepts any length up to [`MAX_PAYLOAD_LEN`]; frames whose
    /// length differs from this value are rejected when applied.
    pub const fn payload_len(self) -> usize {
        match self {
            Command::LightColor => 2,
            Command::Tempo => 4,
            Command::ChargingAlarmLevel => 2,
        }
    }

    /// Returns `true` if `byte` is a valid command tag.
    pub fn is_valid_tag(byte: u8) -> bool {
        Command::try_from(byte).is_ok()
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Command::LightColor),
            0x02 => Ok(Command::Tempo),
            0x03 => Ok(Command::ChargingAlarmLevel),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

/// One complete protocol unit: a command plus its payload.
///
/// A `Frame` only ever exists fully formed; partially received frames live
/// inside the [`crate::FrameDecoder`] until their last byte arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    len: u8,
    data: [u8; MAX_PAYLOAD_LEN],
}

impl Frame {
    /// Builds a frame from a command and payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if `payload` is longer than
    /// [`MAX_PAYLOAD_LEN`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seriallink_core::{Command, Frame};
    ///
    /// let frame = Frame::new(Command::LightColor, &[0x34, 0x12]).unwrap();
    /// assert_eq!(frame.payload(), &[0x34, 0x12]);
    /// ```
    pub fn new(command: Command, payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge { len: payload.len() });
        }
        let mut data = [0u8; MAX_PAYLOAD_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            command,
            len: payload.len() as u8,
            data,
        })
    }

    /// Builds a frame from a fixed-size payload that is known to fit.
    pub(crate) fn from_array<const N: usize>(command: Command, payload: [u8; N]) -> Self {
        debug_assert!(N <= MAX_PAYLOAD_LEN);
        let mut data = [0u8; MAX_PAYLOAD_LEN];
        let len = N.min(MAX_PAYLOAD_LEN);
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            command,
            len: len as u8,
            data,
        }
    }

    /// The command tag.
    pub fn command(&self) -> Command {
        self.command
    }

    /// The payload bytes, exactly as long as the frame's length field.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Returns `true` for a zero-length payload.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of this frame once encoded.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_try_from_accepts_every_valid_tag() {
        for command in Command::ALL {
            assert_eq!(Command::try_from(command as u8), Ok(command));
        }
    }

    #[test]
    fn test_command_zero_is_reserved() {
        assert_eq!(Command::try_from(0), Err(ProtocolError::UnknownCommand(0)));
        assert!(!Command::is_valid_tag(0));
    }

    #[test]
    fn test_command_past_end_of_list_is_rejected() {
        assert!(Command::try_from(0x04).is_err());
        assert!(Command::try_from(0xFF).is_err());
    }

    #[test]
    fn test_payload_widths_fit_in_max_payload() {
        for command in Command::ALL {
            assert!(command.payload_len() <= MAX_PAYLOAD_LEN);
        }
    }

    #[test]
    fn test_frame_new_rejects_oversized_payload() {
        // Arrange
        let payload = [0u8; MAX_PAYLOAD_LEN + 1];

        // Act
        let result = Frame::new(Command::Tempo, &payload);

        // Assert
        assert_eq!(result, Err(ProtocolError::PayloadTooLarge { len: 5 }));
    }

    #[test]
    fn test_frame_with_empty_payload() {
        let frame = Frame::new(Command::LightColor, &[]).unwrap();
        assert!(frame.is_empty());
        assert_eq!(frame.payload(), &[] as &[u8]);
        assert_eq!(frame.encoded_len(), HEADER_SIZE);
    }

    #[test]
    fn test_frames_with_same_payload_compare_equal() {
        let a = Frame::new(Command::Tempo, &[1, 2]).unwrap();
        let b = Frame::new(Command::Tempo, &[1, 2]).unwrap();
        assert_eq!(a, b);
    }
}
