//! seriallink-host library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does seriallink-host do? (for beginners)
//!
//! `seriallink-core` knows how to turn bytes into frames and frames into
//! device values, but it never touches a real port.  This crate adds
//! everything that does:
//!
//! 1. Opens a serial port through the operating system (`serialport` on
//!    Windows, Linux and macOS) with the configured baud rate and framing.
//! 2. Runs one background thread that reads the port into a buffer and one
//!    that writes queued bytes out of another buffer.
//! 3. Drives a [`DeviceSession`](application::session::DeviceSession) state
//!    machine that opens the port, retries after failures, decodes incoming
//!    frames into device state, and encodes outgoing values.
//! 4. Loads settings from a TOML file and exposes JSON-friendly snapshots a
//!    UI can poll.

/// Application layer: port traits, I/O workers, and the device session.
pub mod application;

/// Infrastructure layer: OS serial ports, mock ports, config storage, and UI
/// bridge.
pub mod infrastructure;
