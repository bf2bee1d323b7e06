//! Background I/O threads that move bytes between a port and its buffers.
//!
//! # Why two threads? (for beginners)
//!
//! Reading a serial port blocks until bytes arrive or a timeout expires.  If
//! the application did that on its own thread it would freeze whenever the
//! device was quiet.  Instead, one dedicated thread per direction does the
//! blocking work:
//!
//! ```text
//!  port ──read_once──► ReceiveWorker ──append──► rx RingBuffer ──► poll()/decoder
//!  setters ──append──► tx RingBuffer ──► TransmitWorker ──write_once──► port
//! ```
//!
//! Both workers report trouble through a [`LinkEvent`] channel and stop when
//! their stop flag is raised.
//!
//! # Stopping a worker
//!
//! `std::thread::JoinHandle::join` cannot time out, so each thread holds the
//! sending half of an "exited" channel and drops it on the way out.  The
//! owner waits on the receiving half with a deadline; if the thread is stuck
//! inside a driver call the owner cancels the port's pending I/O and waits
//! once more before joining.

pub mod receive;
pub mod transmit;

pub use receive::ReceiveWorker;
pub use transmit::TransmitWorker;

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::application::port::PortHandle;

/// Which worker raised an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Receive,
    Transmit,
}

/// Notifications from a worker to the session that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// New bytes were appended to the receive buffer.  Raised once per
    /// batch; the consumer re-arms it by clearing the pending flag.
    DataAvailable,
    /// The line failed and the worker has exited.
    LineClosed { direction: Direction, reason: String },
}

/// Binary wake-up flag with a bounded wait.
///
/// A `notify` that happens before `wait_timeout` is not lost: the flag stays
/// set until a waiter consumes it.
#[derive(Debug, Default)]
pub struct WakeSignal {
    woken: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes one waiter.
    pub fn notify(&self) {
        let mut woken = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        *woken = true;
        self.cond.notify_one();
    }

    /// Waits until notified or `timeout` elapses, then clears the flag.
    ///
    /// Returns `true` if the wait ended because of a notification.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.woken.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut woken, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |woken| !*woken)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *woken, false)
    }
}

/// A named OS thread with a stop flag and a join that can time out.
#[derive(Debug)]
pub(crate) struct WorkerThread {
    name: &'static str,
    stop: Arc<AtomicBool>,
    exited: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Spawns `body` on a thread called `name`.  `body` must return soon
    /// after `stop` becomes `true`.
    pub(crate) fn spawn<F>(name: &'static str, stop: Arc<AtomicBool>, body: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_tx, exited) = mpsc::channel::<()>();
        let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
            // Dropped when `body` returns or unwinds.
            let _exit = exit_tx;
            body();
        })?;
        debug!(thread = name, "worker started");
        Ok(Self {
            name,
            stop,
            exited,
            handle: Some(handle),
        })
    }

    /// `true` once the thread body has returned.
    pub(crate) fn is_finished(&self) -> bool {
        match self.exited.try_recv() {
            Err(mpsc::TryRecvError::Empty) => self.handle.is_none(),
            _ => true,
        }
    }

    /// Raises the stop flag without waiting.
    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stops the thread and joins it.
    ///
    /// Waits up to `timeout`; on expiry calls [`PortHandle::cancel`] and waits
    /// once more.  A thread that still has not exited is detached.  Returns
    /// `true` if the thread was joined.  Calling this twice is harmless.
    pub(crate) fn stop_and_join(
        &mut self,
        port: &dyn PortHandle,
        wake: impl Fn(),
        timeout: Duration,
    ) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        self.request_stop();
        wake();

        let mut exited = wait_exit(&self.exited, timeout);
        if !exited {
            debug!(thread = self.name, "worker slow to stop, cancelling port I/O");
            port.cancel();
            wake();
            exited = wait_exit(&self.exited, timeout);
        }

        if exited {
            if handle.join().is_err() {
                warn!(thread = self.name, "worker panicked");
            }
            debug!(thread = self.name, "worker joined");
            true
        } else {
            warn!(thread = self.name, ?timeout, "worker did not stop; detaching");
            false
        }
    }
}

impl Drop for WorkerThread {
    // A worker dropped without `stop_and_join` is told to stop and detached.
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.request_stop();
        }
    }
}

fn wait_exit(exited: &Receiver<()>, timeout: Duration) -> bool {
    !matches!(exited.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}
