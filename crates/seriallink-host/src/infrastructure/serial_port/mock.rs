//! In-memory serial ports for tests and hardware-free demos.
//!
//! # Why a mock port?
//!
//! A real serial port needs a device on the other end, and what that device
//! sends cannot be scripted from Rust test code.  `MockPort` replaces the OS
//! calls with two byte queues:
//!
//! - `incoming` – bytes the "device" sends; `read_once` drains them.
//! - `written`  – every byte the host wrote, in order, for assertions.
//!
//! In loopback mode every written byte is also pushed onto `incoming`, so a
//! setter's frame comes straight back through the decoder, like a device
//! that echoes what it receives.
//!
//! # Failure injection
//!
//! - [`MockPortBackend::fail_next_opens`] makes the next `n` opens fail.
//! - [`MockPort::fail_next_reads`] makes the next `n` reads report a closed
//!   line.
//! - [`MockPort::unplug`] makes every later read and write fail, like a USB
//!   adapter being pulled out.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use seriallink_core::PortConfig;

use crate::application::port::{PortBackend, PortError, PortHandle, ReadOutcome};

/// A scripted port.  Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct MockPort {
    path: String,
    config: PortConfig,
    loopback: bool,
    incoming: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    open: AtomicBool,
    unplugged: AtomicBool,
    read_failures: AtomicU32,
    close_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl MockPort {
    /// Creates an open port.
    pub fn new(path: impl Into<String>, config: PortConfig, loopback: bool) -> Self {
        Self {
            path: path.into(),
            config,
            loopback,
            open: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The configuration the port was opened with.
    pub fn config(&self) -> PortConfig {
        self.config
    }

    /// Queues bytes as if the device had sent them.
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.incoming).extend(bytes.iter().copied());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    /// Makes the next `n` reads return [`ReadOutcome::Closed`].
    pub fn fail_next_reads(&self, n: u32) {
        self.read_failures.store(n, Ordering::SeqCst);
    }

    /// Simulates the device disappearing.
    pub fn unplug(&self) {
        self.unplugged.store(true, Ordering::SeqCst);
    }

    /// How many times `close` has been called.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// How many times `cancel` has been called.
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    fn usable(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.unplugged.load(Ordering::SeqCst)
    }
}

impl PortHandle for MockPort {
    fn read_once(&self, buf: &mut [u8]) -> ReadOutcome {
        if !self.usable() {
            return ReadOutcome::Closed;
        }
        let failing = self
            .read_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return ReadOutcome::Closed;
        }

        let mut incoming = lock(&self.incoming);
        let n = buf.len().min(incoming.len());
        if n == 0 {
            return ReadOutcome::WouldBlock;
        }
        for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
            *slot = byte;
        }
        ReadOutcome::Data(n)
    }

    fn write_once(&self, bytes: &[u8]) -> Result<usize, PortError> {
        if !self.usable() {
            return Err(PortError::Closed);
        }
        lock(&self.written).extend_from_slice(bytes);
        if self.loopback {
            self.inject(bytes);
        }
        Ok(bytes.len())
    }

    fn cancel(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }

    fn is_open(&self) -> bool {
        self.usable()
    }
}

/// A backend whose port list and open results are scripted.
#[derive(Debug, Default)]
pub struct MockPortBackend {
    ports: Mutex<BTreeMap<String, String>>,
    loopback: bool,
    open_failures: AtomicU32,
    open_attempts: AtomicUsize,
    last_port: Mutex<Option<Arc<MockPort>>>,
}

impl MockPortBackend {
    /// A backend with no ports.
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend listing `ports` as (label, path) pairs.
    pub fn with_ports<I, L, P>(ports: I) -> Self
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        let backend = Self::new();
        backend.set_ports(ports);
        backend
    }

    /// Ports opened from now on echo everything written to them.
    pub fn loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Replaces the listed ports.
    pub fn set_ports<I, L, P>(&self, ports: I)
    where
        I: IntoIterator<Item = (L, P)>,
        L: Into<String>,
        P: Into<String>,
    {
        *lock(&self.ports) = ports
            .into_iter()
            .map(|(label, path)| (label.into(), path.into()))
            .collect();
    }

    /// Makes the next `n` calls to `open` fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.open_failures.store(n, Ordering::SeqCst);
    }

    /// Number of `open` calls so far.
    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    /// The most recently opened port.
    pub fn last_port(&self) -> Option<Arc<MockPort>> {
        lock(&self.last_port).clone()
    }
}

impl PortBackend for MockPortBackend {
    fn enumerate(&self) -> BTreeMap<String, String> {
        lock(&self.ports).clone()
    }

    fn open(&self, path: &str, config: &PortConfig) -> Result<Arc<dyn PortHandle>, PortError> {
        self.open_attempts.fetch_add(1, Ordering::SeqCst);
        config.validate()?;

        if !lock(&self.ports).values().any(|p| p == path) {
            return Err(PortError::OpenFailed {
                path: path.to_string(),
                reason: "no such port".to_string(),
            });
        }
        let failing = self
            .open_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PortError::OpenFailed {
                path: path.to_string(),
                reason: "scripted open failure".to_string(),
            });
        }

        let port = Arc::new(MockPort::new(path, *config, self.loopback));
        *lock(&self.last_port) = Some(Arc::clone(&port));
        Ok(port)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
