//! Serial line settings and port identity.
//!
//! `PortConfig` is applied as a whole when a port is opened.  A platform
//! backend that cannot express some setting must refuse the open rather than
//! apply part of the configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default line speed, matching the device firmware.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Reasons a configuration is rejected before any port is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortConfigError {
    #[error("baud rate must be greater than zero")]
    ZeroBaudRate,

    #[error("1.5 stop bits requires 5 data bits, got {0}")]
    OneAndHalfStopBits(u8),
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}

impl DataBits {
    /// The bit count as a number.
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity bit mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    #[default]
    One,
    OnePointFive,
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    #[default]
    None,
    Hardware,
    XonXoff,
}

/// Complete serial line configuration.
///
/// Every field has a serde default so a config file may set only the fields
/// it cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub data_bits: DataBits,
    #[serde(default)]
    pub parity: Parity,
    #[serde(default)]
    pub stop_bits: StopBits,
    #[serde(default)]
    pub flow_control: FlowControl,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for PortConfig {
    /// 9600 baud, 8 data bits, no parity, 1 stop bit, no flow control.
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::default(),
            parity: Parity::default(),
            stop_bits: StopBits::default(),
            flow_control: FlowControl::default(),
        }
    }
}

impl PortConfig {
    /// Convenience constructor for an 8-N-1 configuration at `baud_rate`.
    pub fn with_baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    /// Checks the combination is one a UART can run.
    ///
    /// # Errors
    ///
    /// Returns [`PortConfigError`] for a zero baud rate or for 1.5 stop bits
    /// combined with anything other than 5 data bits.
    pub fn validate(&self) -> Result<(), PortConfigError> {
        if self.baud_rate == 0 {
            return Err(PortConfigError::ZeroBaudRate);
        }
        if self.stop_bits == StopBits::OnePointFive && self.data_bits != DataBits::Five {
            return Err(PortConfigError::OneAndHalfStopBits(self.data_bits.bits()));
        }
        Ok(())
    }

    /// Short `9600 8-N-1` style description for logs.
    pub fn summary(&self) -> String {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        format!("{} {}-{}-{}", self.baud_rate, self.data_bits.bits(), parity, stop)
    }
}

/// A port as reported by enumeration: a human-readable label and the path
/// used to open it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortIdentity {
    pub label: String,
    pub path: String,
}

impl PortIdentity {
    pub fn new(label: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
        }
    }
}
