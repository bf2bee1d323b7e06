//! Typed device commands and the last-known device state.
//!
//! Every command has a fixed payload layout (little-endian):
//!
//! | Command              | Payload                               |
//! |----------------------|---------------------------------------|
//! | `LightColor`         | `u16` colour                          |
//! | `Tempo`              | `u32` tempo × 10 000                  |
//! | `ChargingAlarmLevel` | `u8` alarm index, `u8` level          |
//!
//! Tempo travels as a fixed-point integer so neither end has to agree on a
//! floating-point representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::frame::{Command, Frame};

/// Number of charging alarms the device tracks.
pub const ALARM_COUNT: usize = 2;

/// Tempo is sent with this many decimal places.
pub const TEMPO_DECIMAL_PLACES: i32 = 4;

/// Tempo the device assumes before it reports one.
pub const DEFAULT_TEMPO: f32 = 60.0;

const TEMPO_SCALE: f64 = 10_000.0;

/// Why a well-framed packet could not be applied to the device state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// The length byte does not match the command's payload width.
    #[error("{command:?} expects {expected} payload bytes, frame carried {actual}")]
    LengthMismatch {
        command: Command,
        expected: usize,
        actual: usize,
    },

    /// A charging alarm index outside `0..ALARM_COUNT`.
    #[error("charging alarm index {0} out of range")]
    AlarmIndexOutOfRange(u8),
}

/// A typed value travelling in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DeviceCommand {
    LightColor(u16),
    Tempo(f32),
    ChargingAlarmLevel { alarm: u8, level: u8 },
}

/// A value that changed in [`DeviceState`]; same shape as the command that
/// carried it.
pub type StateChange = DeviceCommand;

impl DeviceCommand {
    /// The wire command tag.
    pub fn command(&self) -> Command {
        match self {
            DeviceCommand::LightColor(_) => Command::LightColor,
            DeviceCommand::Tempo(_) => Command::Tempo,
            DeviceCommand::ChargingAlarmLevel { .. } => Command::ChargingAlarmLevel,
        }
    }

    /// Serializes the value into a frame.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seriallink_core::{encode_frame, DeviceCommand};
    ///
    /// let frame = DeviceCommand::LightColor(0x1234).to_frame();
    /// assert_eq!(encode_frame(&frame), vec![b'*', b'~', 1, 2, 0x34, 0x12]);
    /// ```
    pub fn to_frame(&self) -> Frame {
        match *self {
            DeviceCommand::LightColor(color) => {
                Frame::from_array(Command::LightColor, color.to_le_bytes())
            }
            DeviceCommand::Tempo(tempo) => {
                Frame::from_array(Command::Tempo, tempo_to_wire(tempo).to_le_bytes())
            }
            DeviceCommand::ChargingAlarmLevel { alarm, level } => {
                Frame::from_array(Command::ChargingAlarmLevel, [alarm, level])
            }
        }
    }

    /// Interprets a decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError::LengthMismatch`] when the payload width is wrong
    /// for the command and [`ApplyError::AlarmIndexOutOfRange`] for an
    /// unknown alarm.
    pub fn from_frame(frame: &Frame) -> Result<Self, ApplyError> {
        let command = frame.command();
        let p = frame.payload();
        if p.len() != command.payload_len() {
            return Err(ApplyError::LengthMismatch {
                command,
                expected: command.payload_len(),
                actual: p.len(),
            });
        }
        match command {
            Command::LightColor => Ok(DeviceCommand::LightColor(u16::from_le_bytes([p[0], p[1]]))),
            Command::Tempo => {
                let raw = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
                Ok(DeviceCommand::Tempo(tempo_from_wire(raw)))
            }
            Command::ChargingAlarmLevel => {
                if p[0] as usize >= ALARM_COUNT {
                    return Err(ApplyError::AlarmIndexOutOfRange(p[0]));
                }
                Ok(DeviceCommand::ChargingAlarmLevel {
                    alarm: p[0],
                    level: p[1],
                })
            }
        }
    }
}

/// Converts a tempo to its fixed-point wire value.  Negative and NaN tempos
/// saturate to 0.
pub fn tempo_to_wire(tempo: f32) -> u32 {
    (f64::from(tempo) * TEMPO_SCALE).round() as u32
}

/// Converts a fixed-point wire value back to a tempo.
pub fn tempo_from_wire(raw: u32) -> f32 {
    (f64::from(raw) / TEMPO_SCALE) as f32
}

/// Last-known values reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub light_color: u16,
    pub tempo: f32,
    pub alarm_levels: [u8; ALARM_COUNT],
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            light_color: 0,
            tempo: DEFAULT_TEMPO,
            alarm_levels: [0; ALARM_COUNT],
        }
    }
}

impl DeviceState {
    /// Applies a decoded frame and returns the value that changed.
    ///
    /// # Errors
    ///
    /// Propagates [`DeviceCommand::from_frame`] errors; the state is left
    /// untouched in that case.
    pub fn apply(&mut self, frame: &Frame) -> Result<StateChange, ApplyError> {
        let change = DeviceCommand::from_frame(frame)?;
        match change {
            DeviceCommand::LightColor(color) => self.light_color = color,
            DeviceCommand::Tempo(tempo) => self.tempo = tempo,
            DeviceCommand::ChargingAlarmLevel { alarm, level } => {
                self.alarm_levels[alarm as usize] = level;
            }
        }
        Ok(change)
    }

    /// Level of charging alarm `alarm`, or `None` for an unknown index.
    pub fn alarm_level(&self, alarm: usize) -> Option<u8> {
        self.alarm_levels.get(alarm).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::codec::encode_frame;
    use crate::protocol::decoder::FrameDecoder;

    fn loopback(cmd: DeviceCommand) -> DeviceCommand {
        let bytes = encode_frame(&cmd.to_frame());
        let frames = FrameDecoder::new().decode(&bytes);
        assert_eq!(frames.len(), 1, "exactly one frame must come back");
        DeviceCommand::from_frame(&frames[0]).expect("frame must apply")
    }

    #[test]
    fn test_light_color_serializes_little_endian() {
        // Arrange / Act
        let frame = DeviceCommand::LightColor(0x1234).to_frame();

        // Assert
        assert_eq!(frame.command(), Command::LightColor);
        assert_eq!(frame.payload(), &[0x34, 0x12]);
    }

    #[test]
    fn test_light_color_loopback_returns_original_value() {
        assert_eq!(
            loopback(DeviceCommand::LightColor(0x1234)),
            DeviceCommand::LightColor(0x1234)
        );
    }

    #[test]
    fn test_tempo_uses_four_decimal_places() {
        let frame = DeviceCommand::Tempo(120.5).to_frame();
        assert_eq!(frame.payload(), &1_205_000u32.to_le_bytes());
    }

    #[test]
    fn test_tempo_loopback_preserves_four_decimals() {
        assert_eq!(loopback(DeviceCommand::Tempo(98.1234)), DeviceCommand::Tempo(98.1234));
    }

    #[test]
    fn test_negative_tempo_saturates_to_zero() {
        assert_eq!(tempo_to_wire(-3.0), 0);
        assert_eq!(tempo_to_wire(f32::NAN), 0);
    }

    #[test]
    fn test_alarm_level_loopback() {
        let cmd = DeviceCommand::ChargingAlarmLevel { alarm: 1, level: 75 };
        assert_eq!(loopback(cmd), cmd);
    }

    #[test]
    fn test_apply_updates_only_the_addressed_field() {
        // Arrange
        let mut state = DeviceState::default();
        let frame = DeviceCommand::ChargingAlarmLevel { alarm: 1, level: 42 }.to_frame();

        // Act
        let change = state.apply(&frame).unwrap();

        // Assert
        assert_eq!(change, DeviceCommand::ChargingAlarmLevel { alarm: 1, level: 42 });
        assert_eq!(state.alarm_levels, [0, 42]);
        assert_eq!(state.light_color, 0);
        assert_eq!(state.tempo, DEFAULT_TEMPO);
    }

    #[test]
    fn test_apply_rejects_length_mismatch() {
        // Arrange – tempo needs 4 bytes; this frame carries 2.
        let mut state = DeviceState::default();
        let frame = Frame::new(Command::Tempo, &[1, 0]).unwrap();

        // Act
        let result = state.apply(&frame);

        // Assert
        assert_eq!(
            result,
            Err(ApplyError::LengthMismatch {
                command: Command::Tempo,
                expected: 4,
                actual: 2,
            })
        );
        assert_eq!(state, DeviceState::default());
    }

    #[test]
    fn test_apply_rejects_unknown_alarm_index() {
        let mut state = DeviceState::default();
        let frame = Frame::new(Command::ChargingAlarmLevel, &[2, 10]).unwrap();

        assert_eq!(state.apply(&frame), Err(ApplyError::AlarmIndexOutOfRange(2)));
        assert_eq!(state.alarm_levels, [0, 0]);
    }

    #[test]
    fn test_alarm_level_getter_bounds() {
        let state = DeviceState::default();
        assert_eq!(state.alarm_level(0), Some(0));
        assert_eq!(state.alarm_level(ALARM_COUNT), None);
    }
}
