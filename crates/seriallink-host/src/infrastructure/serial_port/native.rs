//! Hardware serial ports through the `serialport` crate.
//!
//! # Two handles, one device
//!
//! `serialport` hands back a `Box<dyn SerialPort>` that needs `&mut self` for
//! both reading and writing.  Sharing one box behind one mutex would make the
//! writer wait for every 100 ms read timeout.  Instead the port is opened
//! once and `try_clone`d, giving the receive worker and the transmit worker
//! a handle each, each behind its own mutex.
//!
//! # Timeouts
//!
//! Both handles use a 100 ms timeout.  A read that times out becomes
//! [`ReadOutcome::WouldBlock`] and a write that times out becomes `Ok(0)`,
//! so neither worker ever blocks for longer than that.  `cancel` only raises
//! a flag that the next read observes; the timeout does the rest.
//!
//! # Labels
//!
//! | Platform | Path                     | Label            |
//! |----------|--------------------------|------------------|
//! | Windows  | `COM3`                   | `COM3`           |
//! | Linux    | `/dev/ttyUSB0`           | `ttyUSB0`        |
//! | macOS    | `/dev/cu.usbserial-1410` | `usbserial-1410` |
//!
//! On macOS only the `/dev/cu.*` call-out devices are listed; the matching
//! `/dev/tty.*` devices wait for carrier detect when opened.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serialport::SerialPort;
use seriallink_core::{DataBits, FlowControl, Parity, PortConfig, StopBits};
use tracing::{debug, info, warn};

use crate::application::port::{PortBackend, PortError, PortHandle, ReadOutcome};

/// Read and write timeout applied to both handles.
pub const IO_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens real serial ports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePortBackend;

impl NativePortBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PortBackend for NativePortBackend {
    fn enumerate(&self) -> BTreeMap<String, String> {
        match serialport::available_ports() {
            Ok(ports) => label_ports(
                ports
                    .into_iter()
                    .map(|p| p.port_name)
                    .filter(|name| is_listed(name)),
            ),
            Err(e) => {
                warn!(error = %e, "serial port enumeration failed");
                BTreeMap::new()
            }
        }
    }

    fn open(&self, path: &str, config: &PortConfig) -> Result<Arc<dyn PortHandle>, PortError> {
        config.validate()?;
        let builder = serialport::new(path, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .parity(to_serialport_parity(config.parity)?)
            .stop_bits(to_serialport_stop_bits(config.stop_bits)?)
            .flow_control(to_serialport_flow_control(config.flow_control))
            .timeout(IO_TIMEOUT);

        let open_failed = |e: serialport::Error| PortError::OpenFailed {
            path: path.to_string(),
            reason: e.to_string(),
        };
        let reader = builder.open().map_err(open_failed)?;
        let writer = reader.try_clone().map_err(open_failed)?;

        info!(%path, config = %config.summary(), "serial port opened");
        Ok(Arc::new(NativePort::new(path, reader, writer)))
    }
}

/// One open hardware port.
pub struct NativePort {
    path: String,
    reader: Mutex<Option<Box<dyn SerialPort>>>,
    writer: Mutex<Option<Box<dyn SerialPort>>>,
    open: AtomicBool,
    cancelled: AtomicBool,
}

impl NativePort {
    fn new(path: &str, reader: Box<dyn SerialPort>, writer: Box<dyn SerialPort>) -> Self {
        Self {
            path: path.to_string(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PortHandle for NativePort {
    fn read_once(&self, buf: &mut [u8]) -> ReadOutcome {
        if !self.open.load(Ordering::Acquire) {
            return ReadOutcome::Closed;
        }
        if self.cancelled.swap(false, Ordering::AcqRel) {
            return ReadOutcome::WouldBlock;
        }

        let mut reader = lock(&self.reader);
        let Some(port) = reader.as_mut() else {
            return ReadOutcome::Closed;
        };
        match port.read(buf) {
            Ok(0) => ReadOutcome::WouldBlock,
            Ok(n) => ReadOutcome::Data(n),
            Err(e) if is_timeout(&e) => ReadOutcome::WouldBlock,
            Err(e) => {
                debug!(path = %self.path, error = %e, "serial read failed");
                ReadOutcome::Closed
            }
        }
    }

    fn write_once(&self, bytes: &[u8]) -> Result<usize, PortError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(PortError::Closed);
        }
        let mut writer = lock(&self.writer);
        let port = writer.as_mut().ok_or(PortError::Closed)?;
        match port.write(bytes) {
            Ok(n) => Ok(n),
            Err(e) if is_timeout(&e) => Ok(0),
            Err(e) => Err(PortError::Io(e)),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    fn close(&self) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        // The reader lock is held for at most one read timeout.
        lock(&self.writer).take();
        lock(&self.reader).take();
        info!(path = %self.path, "serial port closed");
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

// ── Conversion functions ──────────────────────────────────────────────────────

fn to_serialport_data_bits(bits: DataBits) -> serialport::DataBits {
    match bits {
        DataBits::Five => serialport::DataBits::Five,
        DataBits::Six => serialport::DataBits::Six,
        DataBits::Seven => serialport::DataBits::Seven,
        DataBits::Eight => serialport::DataBits::Eight,
    }
}

fn to_serialport_parity(parity: Parity) -> Result<serialport::Parity, PortError> {
    match parity {
        Parity::None => Ok(serialport::Parity::None),
        Parity::Odd => Ok(serialport::Parity::Odd),
        Parity::Even => Ok(serialport::Parity::Even),
        Parity::Mark | Parity::Space => Err(PortError::UnsupportedConfig(format!(
            "{parity:?} parity is not supported by this driver"
        ))),
    }
}

fn to_serialport_stop_bits(stop_bits: StopBits) -> Result<serialport::StopBits, PortError> {
    match stop_bits {
        StopBits::One => Ok(serialport::StopBits::One),
        StopBits::Two => Ok(serialport::StopBits::Two),
        StopBits::OnePointFive => Err(PortError::UnsupportedConfig(
            "1.5 stop bits are not supported by this driver".to_string(),
        )),
    }
}

fn to_serialport_flow_control(flow: FlowControl) -> serialport::FlowControl {
    match flow {
        FlowControl::None => serialport::FlowControl::None,
        FlowControl::Hardware => serialport::FlowControl::Hardware,
        FlowControl::XonXoff => serialport::FlowControl::Software,
    }
}

// ── Labels ────────────────────────────────────────────────────────────────────

/// Builds the label → path map, keeping labels unique.
fn label_ports(paths: impl IntoIterator<Item = String>) -> BTreeMap<String, String> {
    let mut ports = BTreeMap::new();
    for path in paths {
        let mut label = port_label(&path);
        if ports.contains_key(&label) {
            label = format!("{label} ({path})");
        }
        ports.insert(label, path);
    }
    ports
}

#[cfg(target_os = "windows")]
fn port_label(path: &str) -> String {
    path.trim_start_matches(r"\\.\").to_string()
}

#[cfg(target_os = "linux")]
fn port_label(path: &str) -> String {
    std::path::Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(target_os = "macos")]
fn port_label(path: &str) -> String {
    path.strip_prefix("/dev/cu.")
        .or_else(|| path.strip_prefix("/dev/tty."))
        .unwrap_or(path)
        .to_string()
}

fn is_listed(path: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        !path.starts_with("/dev/tty.")
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = path;
        true
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
