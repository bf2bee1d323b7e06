//! Domain layer: pure device and port logic with no OS dependencies.
//!
//! # Sub-modules
//!
//! - **`port_config`** – The serial line settings (baud rate, data bits,
//!   parity, stop bits, flow control) applied when a port is opened, and the
//!   label/path pair that identifies a port.
//!
//! - **`device_state`** – The typed commands an application sends to the
//!   device and the last-known values the device reported back.

pub mod device_state;
pub mod port_config;

pub use device_state::{ApplyError, DeviceCommand, DeviceState, StateChange};
pub use port_config::{
    DataBits, FlowControl, Parity, PortConfig, PortConfigError, PortIdentity, StopBits,
};
