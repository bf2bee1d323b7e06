//! `PortBackend` implementations.
//!
//! The hardware backend is compiled on the platforms the `serialport` crate
//! supports (`#[cfg(target_os = ...)]`).  A `MockPortBackend` is always
//! available for tests and hardware-free runs.

use std::sync::Arc;

use crate::application::port::PortBackend;

pub mod mock;

#[cfg(any(target_os = "windows", target_os = "linux", target_os = "macos"))]
pub mod native;

/// The backend for real hardware on this platform.
#[cfg(any(target_os = "windows", target_os = "linux", target_os = "macos"))]
pub fn default_backend() -> Arc<dyn PortBackend> {
    Arc::new(native::NativePortBackend::new())
}

/// The backend for real hardware on this platform.
///
/// No native driver is compiled here, so this is an empty mock backend.
#[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
pub fn default_backend() -> Arc<dyn PortBackend> {
    tracing::warn!("no native serial driver on this platform; using an empty mock backend");
    Arc::new(mock::MockPortBackend::new())
}
