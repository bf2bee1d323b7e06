//! The serial port seam between the transport and the operating system.
//!
//! The application layer only ever talks to a port through these two traits.
//! Concrete implementations live in `infrastructure::serial_port`:
//!
//! - `NativePortBackend` – real hardware through the `serialport` crate.
//! - `MockPortBackend`   – an in-memory port used by tests and the demo.
//!
//! # Why `&self` everywhere? (for beginners)
//!
//! Two worker threads use the same open port at once: one reads, one writes.
//! The port is shared as an `Arc<dyn PortHandle>`, which only hands out
//! shared references.  Each implementation therefore guards its own mutable
//! state internally (a mutex per direction, atomic flags for open/cancel),
//! and every method takes `&self`.

use std::collections::BTreeMap;
use std::sync::Arc;

use seriallink_core::{PortConfig, PortConfigError};
use thiserror::Error;

/// Error type for port operations.
#[derive(Debug, Error)]
pub enum PortError {
    /// The device could not be opened.  `reason` is diagnostic text only.
    #[error("failed to open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// The configuration failed validation before the device was touched.
    #[error("invalid port configuration: {0}")]
    InvalidConfig(#[from] PortConfigError),

    /// The configuration is valid but this platform's driver cannot apply it.
    #[error("unsupported port configuration: {0}")]
    UnsupportedConfig(String),

    /// An I/O error on an open port.
    #[error("port I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The port has been closed or the device has gone away.
    #[error("port is closed")]
    Closed,
}

/// Result of a single read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// `n` bytes (at least one) were written to the front of the buffer.
    Data(usize),
    /// Nothing arrived before the read timeout, or the read was cancelled.
    WouldBlock,
    /// The port is closed or the line failed; no further reads will succeed.
    Closed,
}

/// An open serial port.
///
/// Implementations must tolerate one thread calling [`read_once`] while
/// another calls [`write_once`], and any thread calling [`close`] or
/// [`cancel`] at any time.
///
/// [`read_once`]: PortHandle::read_once
/// [`write_once`]: PortHandle::write_once
/// [`close`]: PortHandle::close
/// [`cancel`]: PortHandle::cancel
#[cfg_attr(test, mockall::automock)]
pub trait PortHandle: Send + Sync {
    /// Waits up to the port's read timeout for bytes and copies them into
    /// `buf`.
    fn read_once(&self, buf: &mut [u8]) -> ReadOutcome;

    /// Writes a prefix of `bytes` and returns its length.
    ///
    /// `Ok(0)` means the driver accepted nothing before its timeout; the
    /// caller retries.
    ///
    /// # Errors
    ///
    /// [`PortError::Closed`] once the port is closed, [`PortError::Io`] for
    /// driver failures.
    fn write_once(&self, bytes: &[u8]) -> Result<usize, PortError>;

    /// Asks an in-flight blocking read or write to return early.  Best
    /// effort: an implementation may simply let its timeout expire.
    fn cancel(&self);

    /// Releases the device.  Idempotent; unblocks [`PortHandle::read_once`].
    fn close(&self);

    /// `false` once [`PortHandle::close`] has run or the device vanished.
    fn is_open(&self) -> bool;
}

/// Opens and enumerates ports on one platform.
pub trait PortBackend: Send + Sync {
    /// Lists the ports currently present as label → path.
    ///
    /// Never fails: an OS error yields an empty map.
    fn enumerate(&self) -> BTreeMap<String, String>;

    /// Opens `path` exclusively and applies `config` in one step.
    ///
    /// # Errors
    ///
    /// Any [`PortError`]; nothing is left open on failure.
    fn open(&self, path: &str, config: &PortConfig) -> Result<Arc<dyn PortHandle>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_failed_message_includes_path_and_reason() {
        let err = PortError::OpenFailed {
            path: "/dev/ttyUSB0".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to open /dev/ttyUSB0: permission denied"
        );
    }

    #[test]
    fn test_port_config_error_converts_into_port_error() {
        // Arrange
        let config = PortConfig::with_baud_rate(0);

        // Act
        let err: PortError = config.validate().unwrap_err().into();

        // Assert
        assert!(matches!(err, PortError::InvalidConfig(PortConfigError::ZeroBaudRate)));
    }

    #[test]
    fn test_mock_handle_reports_scripted_read() {
        // Arrange
        let mut mock = MockPortHandle::new();
        mock.expect_read_once().returning(|buf| {
            buf[..2].copy_from_slice(&[0xAA, 0xBB]);
            ReadOutcome::Data(2)
        });

        // Act
        let mut buf = [0u8; 8];
        let outcome = mock.read_once(&mut buf);

        // Assert
        assert_eq!(outcome, ReadOutcome::Data(2));
        assert_eq!(&buf[..2], &[0xAA, 0xBB]);
    }
}
