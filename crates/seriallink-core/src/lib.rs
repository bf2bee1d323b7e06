//! # seriallink-core
//!
//! Shared library for SerialLink containing the thread-safe byte buffer,
//! the packet framing codec, and the typed device state model.
//!
//! This crate is used by the host transport and by anything that needs to
//! speak the device protocol.  It has zero dependencies on OS APIs, serial
//! port drivers, or threads of its own.
//!
//! # Architecture overview (for beginners)
//!
//! SerialLink connects an application to a small device (an Arduino-class
//! board, say) over a serial port.  Bytes arrive one at a time with no
//! built-in boundaries, so both ends agree on a tiny packet format:
//!
//! ```text
//! ['*']['~'][command:1][length:1][payload:length]
//! ```
//!
//! This crate (`seriallink-core`) is the shared foundation.  It defines:
//!
//! - **`buffer`** – The [`RingBuffer`]: a FIFO of bytes guarded by its own
//!   lock, used on both the receive path and the transmit path.
//!
//! - **`protocol`** – How bytes travel over the wire.  [`Frame`]s are encoded
//!   into the packet format above and recovered from a raw byte stream by the
//!   [`FrameDecoder`] state machine.
//!
//! - **`domain`** – Pure device logic with no OS dependencies: the serial
//!   [`PortConfig`], the typed [`DeviceCommand`]s an application can send, and
//!   the [`DeviceState`] updated from frames the device sends back.

pub mod buffer;
pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `seriallink_core::FrameDecoder` instead of the full module path.
pub use buffer::ring::RingBuffer;
pub use domain::device_state::{ApplyError, DeviceCommand, DeviceState, StateChange};
pub use domain::port_config::{
    DataBits, FlowControl, Parity, PortConfig, PortConfigError, PortIdentity, StopBits,
};
pub use protocol::codec::{encode_frame, encode_frame_into};
pub use protocol::decoder::{DecoderState, DecoderStats, FrameDecoder};
pub use protocol::frame::{Command, Frame, ProtocolError};
