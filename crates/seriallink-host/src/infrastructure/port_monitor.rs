//! Port-list monitor.
//!
//! Serial adapters come and go (USB cables get unplugged), and the OS gives
//! no portable notification when that happens.  The monitor runs a small
//! background thread that re-enumerates the ports every scan interval and
//! remembers the latest list.  A UI polls [`PortListMonitor::has_list_changed`]
//! cheaply and only fetches the list when it did.
//!
//! # Scan interval
//!
//! Enumeration is an OS call that can take tens of milliseconds, so the
//! default interval is one second.  The thread waits on a wake signal
//! between scans, which lets `Drop` stop it immediately instead of waiting
//! out the interval.

use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::application::port::PortBackend;
use crate::application::workers::WakeSignal;

/// Default time between enumerations.
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Thread name shown in debuggers and log output.
pub const THREAD_NAME: &str = "seriallink-ports";

#[derive(Debug, Default)]
struct Shared {
    ports: Mutex<BTreeMap<String, String>>,
    changed: AtomicBool,
    stop: AtomicBool,
    wake: WakeSignal,
}

/// Keeps an up-to-date label → path map of the available ports.
#[derive(Debug)]
pub struct PortListMonitor {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PortListMonitor {
    /// Starts scanning.  The first scan runs immediately on the monitor
    /// thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(backend: Arc<dyn PortBackend>, interval: Duration) -> io::Result<Self> {
        let shared = Arc::new(Shared::default());
        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name(THREAD_NAME.to_string())
                .spawn(move || scan_loop(&*backend, &shared, interval))?
        };
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// `true` if the list differs from the one last returned by
    /// [`PortListMonitor::port_list`].
    pub fn has_list_changed(&self) -> bool {
        self.shared.changed.load(Ordering::Acquire)
    }

    /// The latest list.  Clears the changed flag.
    pub fn port_list(&self) -> BTreeMap<String, String> {
        self.shared.changed.store(false, Ordering::Release);
        lock(&self.shared.ports).clone()
    }

    /// Asks for a scan now instead of at the end of the interval.
    pub fn rescan(&self) {
        self.shared.wake.notify();
    }
}

impl Drop for PortListMonitor {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.wake.notify();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("port monitor thread panicked");
            }
        }
    }
}

fn scan_loop(backend: &dyn PortBackend, shared: &Shared, interval: Duration) {
    while !shared.stop.load(Ordering::Acquire) {
        let latest = backend.enumerate();
        {
            let mut ports = lock(&shared.ports);
            if *ports != latest {
                debug!(count = latest.len(), "serial port list changed");
                *ports = latest;
                shared.changed.store(true, Ordering::Release);
            }
        }
        shared.wake.wait_timeout(interval);
    }
    debug!("port monitor exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
