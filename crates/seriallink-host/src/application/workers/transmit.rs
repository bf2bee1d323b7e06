//! Transmit worker: transmit buffer → port.
//!
//! The loop sleeps on a [`WakeSignal`] until a setter queues bytes, then
//! writes them in chunks of at most `write_chunk` bytes.  Bytes are removed
//! from the buffer only after the driver has accepted them, so a short write
//! leaves the remainder at the head of the queue for the next attempt and
//! transmit order is strictly FIFO.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use seriallink_core::RingBuffer;
use tracing::{debug, warn};

use super::{Direction, LinkEvent, WakeSignal, WorkerThread};
use crate::application::port::{PortError, PortHandle};

/// Upper bound on a wait with no wake; guards against a lost notification.
pub const WAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// Consecutive failed writes after which the line is declared closed.
pub const MAX_CONSECUTIVE_WRITE_ERRORS: u32 = 3;

/// Pause after a failed or zero-length write.
const RETRY_PAUSE: Duration = Duration::from_millis(10);

/// Thread name shown in debuggers and log output.
pub const THREAD_NAME: &str = "seriallink-tx";

/// Owns the transmit thread for one open port.
#[derive(Debug)]
pub struct TransmitWorker {
    thread: WorkerThread,
    buffer: Arc<RingBuffer>,
    wake: Arc<WakeSignal>,
}

impl TransmitWorker {
    /// Starts draining `buffer` to `port`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(
        port: Arc<dyn PortHandle>,
        buffer: Arc<RingBuffer>,
        events: Sender<LinkEvent>,
        write_chunk: usize,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(WakeSignal::new());
        let thread = {
            let stop = Arc::clone(&stop);
            let buffer = Arc::clone(&buffer);
            let wake = Arc::clone(&wake);
            WorkerThread::spawn(THREAD_NAME, Arc::clone(&stop), move || {
                transmit_loop(&*port, &buffer, &wake, &events, &stop, write_chunk.max(1));
            })?
        };
        Ok(Self {
            thread,
            buffer,
            wake,
        })
    }

    /// The buffer this worker drains.
    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    /// The signal that wakes this worker after bytes are queued.
    pub fn wake_signal(&self) -> &Arc<WakeSignal> {
        &self.wake
    }

    /// Queues `bytes` and wakes the worker.
    pub fn enqueue(&self, bytes: &[u8]) {
        self.buffer.append(bytes);
        self.wake.notify();
    }

    /// `false` once the loop has exited.
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    pub(crate) fn request_stop(&self) {
        self.thread.request_stop();
        self.wake.notify();
    }

    /// Stops the loop and joins the thread; see
    /// [`WorkerThread::stop_and_join`].
    pub fn stop(&mut self, port: &dyn PortHandle, timeout: Duration) -> bool {
        let wake = Arc::clone(&self.wake);
        self.thread.stop_and_join(port, move || wake.notify(), timeout)
    }
}

fn transmit_loop(
    port: &dyn PortHandle,
    buffer: &RingBuffer,
    wake: &WakeSignal,
    events: &Sender<LinkEvent>,
    stop: &AtomicBool,
    write_chunk: usize,
) {
    let mut failures = 0u32;

    while !stop.load(Ordering::Acquire) {
        if buffer.is_empty() {
            wake.wait_timeout(WAKE_TIMEOUT);
            continue;
        }

        let pending = buffer.peek(write_chunk);
        match port.write_once(&pending) {
            Ok(0) => thread::sleep(RETRY_PAUSE),
            Ok(n) => {
                buffer.discard(n.min(pending.len()));
                failures = 0;
            }
            Err(PortError::Closed) => {
                report_closed(events, stop, "port closed".to_string());
                break;
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, attempt = failures, "serial write failed");
                if failures >= MAX_CONSECUTIVE_WRITE_ERRORS {
                    report_closed(events, stop, e.to_string());
                    break;
                }
                thread::sleep(RETRY_PAUSE);
            }
        }
    }
    debug!("transmit loop exited");
}

fn report_closed(events: &Sender<LinkEvent>, stop: &AtomicBool, reason: String) {
    if stop.load(Ordering::Acquire) {
        return;
    }
    warn!(%reason, "serial line closed while writing");
    let _ = events.send(LinkEvent::LineClosed {
        direction: Direction::Transmit,
        reason,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::port::MockPortHandle;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Instant;

    fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn test_short_writes_keep_remaining_bytes_in_order() {
        // Arrange – the driver accepts at most two bytes per call.
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&written);
        let mut port = MockPortHandle::new();
        port.expect_write_once().returning(move |bytes| {
            let n = bytes.len().min(2);
            sink.lock().unwrap().extend_from_slice(&bytes[..n]);
            Ok(n)
        });
        port.expect_cancel().returning(|| ());
        let port: Arc<dyn PortHandle> = Arc::new(port);
        let (tx, _rx) = mpsc::channel();
        let mut worker =
            TransmitWorker::spawn(Arc::clone(&port), Arc::new(RingBuffer::new()), tx, 128)
                .unwrap();

        // Act
        worker.enqueue(&[1, 2, 3, 4, 5]);
        worker.enqueue(&[6, 7]);
        assert!(wait_until(Duration::from_secs(2), || worker.buffer().is_empty()));
        assert!(worker.stop(&*port, Duration::from_millis(500)));

        // Assert
        assert_eq!(*written.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_writes_never_exceed_chunk_size() {
        // Arrange
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&sizes);
        let mut port = MockPortHandle::new();
        port.expect_write_once().returning(move |bytes| {
            seen.lock().unwrap().push(bytes.len());
            Ok(bytes.len())
        });
        port.expect_cancel().returning(|| ());
        let port: Arc<dyn PortHandle> = Arc::new(port);
        let (tx, _rx) = mpsc::channel();
        let mut worker =
            TransmitWorker::spawn(Arc::clone(&port), Arc::new(RingBuffer::new()), tx, 4).unwrap();

        // Act
        worker.enqueue(&[0u8; 10]);
        assert!(wait_until(Duration::from_secs(2), || worker.buffer().is_empty()));
        worker.stop(&*port, Duration::from_millis(500));

        // Assert
        assert_eq!(*sizes.lock().unwrap(), vec![4, 4, 2]);
    }

    #[test]
    fn test_three_consecutive_errors_close_the_line() {
        // Arrange
        let mut port = MockPortHandle::new();
        port.expect_write_once()
            .times(MAX_CONSECUTIVE_WRITE_ERRORS as usize)
            .returning(|_| Err(PortError::Io(io::Error::new(io::ErrorKind::Other, "unplugged"))));
        let port: Arc<dyn PortHandle> = Arc::new(port);
        let (tx, rx) = mpsc::channel();
        let worker =
            TransmitWorker::spawn(Arc::clone(&port), Arc::new(RingBuffer::new()), tx, 128)
                .unwrap();

        // Act
        worker.enqueue(&[1, 2, 3]);
        let event = rx.recv_timeout(Duration::from_secs(2)).unwrap();

        // Assert
        assert!(matches!(
            event,
            LinkEvent::LineClosed {
                direction: Direction::Transmit,
                ..
            }
        ));
        assert!(wait_until(Duration::from_secs(2), || !worker.is_running()));
        // Nothing was accepted, so nothing was discarded.
        assert_eq!(worker.buffer().len(), 3);
    }

    #[test]
    fn test_idle_worker_stops_promptly() {
        // Arrange
        let port: Arc<dyn PortHandle> = Arc::new(MockPortHandle::new());
        let (tx, _rx) = mpsc::channel();
        let mut worker =
            TransmitWorker::spawn(Arc::clone(&port), Arc::new(RingBuffer::new()), tx, 128)
                .unwrap();

        // Act
        let start = Instant::now();
        let joined = worker.stop(&*port, Duration::from_millis(500));

        // Assert – the wake signal interrupts the 100 ms idle wait.
        assert!(joined);
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
