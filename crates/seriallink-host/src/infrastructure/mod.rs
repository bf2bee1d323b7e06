//! Infrastructure layer for the host application.
//!
//! Contains OS-facing adapters: serial port drivers, the port-list monitor,
//! config file storage, and the UI bridge.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `seriallink_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`serial_port`** – `PortBackend` implementations.  The native backend
//!   (the `serialport` crate) is selected at compile time with
//!   `#[cfg(target_os)]`.  A `MockPortBackend` is also provided for tests.
//!
//! - **`port_monitor`** – Background thread that re-enumerates ports once a
//!   second and flags when the list changes, so a UI can refresh its device
//!   menu.
//!
//! - **`storage`** – TOML config file persistence.
//!
//! - **`ui_bridge`** – Serializable snapshots of session state for a UI.

pub mod port_monitor;
pub mod serial_port;
pub mod storage;
pub mod ui_bridge;
