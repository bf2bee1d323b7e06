//! Receive worker: port → receive buffer.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use seriallink_core::RingBuffer;
use tracing::{debug, warn};

use super::{Direction, LinkEvent, WorkerThread};
use crate::application::port::{PortHandle, ReadOutcome};

/// Nap between reads that returned nothing.
pub const IDLE_SLEEP: Duration = Duration::from_millis(1);

/// Thread name shown in debuggers and log output.
pub const THREAD_NAME: &str = "seriallink-rx";

/// Owns the receive thread for one open port.
#[derive(Debug)]
pub struct ReceiveWorker {
    thread: WorkerThread,
    buffer: Arc<RingBuffer>,
}

impl ReceiveWorker {
    /// Starts reading `port` into `buffer`.
    ///
    /// `data_pending` coalesces notifications: a [`LinkEvent::DataAvailable`]
    /// is sent only when the flag flips from `false` to `true`.  The consumer
    /// clears it before draining the buffer.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(
        port: Arc<dyn PortHandle>,
        buffer: Arc<RingBuffer>,
        events: Sender<LinkEvent>,
        data_pending: Arc<AtomicBool>,
        read_chunk: usize,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            let buffer = Arc::clone(&buffer);
            WorkerThread::spawn(THREAD_NAME, Arc::clone(&stop), move || {
                receive_loop(&*port, &buffer, &events, &data_pending, &stop, read_chunk.max(1));
            })?
        };
        Ok(Self { thread, buffer })
    }

    /// The buffer this worker appends to.
    pub fn buffer(&self) -> &Arc<RingBuffer> {
        &self.buffer
    }

    /// `false` once the loop has exited.
    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }

    pub(crate) fn request_stop(&self) {
        self.thread.request_stop();
    }

    /// Stops the loop and joins the thread; see
    /// [`WorkerThread::stop_and_join`].
    pub fn stop(&mut self, port: &dyn PortHandle, timeout: Duration) -> bool {
        self.thread.stop_and_join(port, || {}, timeout)
    }
}

fn receive_loop(
    port: &dyn PortHandle,
    buffer: &RingBuffer,
    events: &Sender<LinkEvent>,
    data_pending: &AtomicBool,
    stop: &AtomicBool,
    read_chunk: usize,
) {
    let mut scratch = vec![0u8; read_chunk];

    while !stop.load(Ordering::Acquire) {
        match port.read_once(&mut scratch) {
            ReadOutcome::Data(n) if n > 0 => {
                buffer.append(&scratch[..n.min(read_chunk)]);
                if !data_pending.swap(true, Ordering::AcqRel) {
                    // The session may already be gone during teardown.
                    let _ = events.send(LinkEvent::DataAvailable);
                }
            }
            ReadOutcome::Data(_) | ReadOutcome::WouldBlock => thread::sleep(IDLE_SLEEP),
            ReadOutcome::Closed => {
                if !stop.load(Ordering::Acquire) {
                    warn!("serial line closed while reading");
                    let _ = events.send(LinkEvent::LineClosed {
                        direction: Direction::Receive,
                        reason: "read failed".to_string(),
                    });
                }
                break;
            }
        }
    }
    debug!("receive loop exited");
}
