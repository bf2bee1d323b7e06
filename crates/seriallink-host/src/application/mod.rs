//! Application layer for the host side of the serial link.
//!
//! # What lives here?
//!
//! - **`port`** – The `PortHandle` / `PortBackend` traits every serial port
//!   implementation satisfies, plus `PortError`.  The rest of this layer is
//!   written against these traits only, so tests can swap in a mock port.
//!
//! - **`workers`** – The receive and transmit threads that shuttle bytes
//!   between an open port and its two `RingBuffer`s.
//!
//! - **`session`** – `DeviceSession`, the open/retry/close state machine that
//!   owns the port and workers, decodes incoming frames into device state,
//!   and encodes outgoing setter calls.

pub mod port;
pub mod session;
pub mod workers;
