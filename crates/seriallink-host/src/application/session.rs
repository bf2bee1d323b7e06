//! Device session: the lifecycle of one serial connection.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!            request_open()                 open ok
//!   Idle ─────────────────────► Opening ───────────────► Connected
//!    ▲                           ▲   │ open failed          │  │
//!    │                   retry   │   ▼                      │  │ line lost
//!    │                 delay ────┴─ Faulted ◄───────────────┘  │
//!    │                                                         │ request_close()
//!    └──────────────────────── ClosingRequested ◄──────────────┘
//! ```
//!
//! The session does no work on its own: the caller invokes [`DeviceSession::poll`]
//! from a timer (1 ms is typical).  Each poll advances the state machine by
//! at most one step and, while connected, drains the receive buffer through
//! the frame decoder and applies the frames to the [`DeviceState`].
//!
//! Setters never touch the port directly.  They encode a frame, append it to
//! the transmit buffer and wake the transmit worker.
//!
//! # Locks
//!
//! `link` is held for the whole of a poll step, including a port open and a
//! worker join.  Everything a UI thread reads (`phase`, `state`, `stats`)
//! and everything a setter writes (`outbound`) lives behind its own short
//! lock, so getters and setters never wait for a poll step.  `link` is
//! always taken first when more than one lock is needed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use seriallink_core::{
    domain::device_state::ALARM_COUNT, encode_frame_into, protocol::frame::MAX_FRAME_LEN,
    DeviceCommand, DeviceState, Frame, FrameDecoder, PortConfig, RingBuffer, StateChange,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::port::{PortBackend, PortHandle};
use crate::application::workers::{
    Direction, LinkEvent, ReceiveWorker, TransmitWorker, WakeSignal,
};

/// Default wait before re-trying a failed open.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default cadence at which callers are expected to call `poll`.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default bytes per `read_once`.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Default bytes per `write_once`.
pub const DEFAULT_WRITE_CHUNK: usize = 128;

/// Default time a worker gets to exit before its port I/O is cancelled.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Tunables for a [`DeviceSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub port_config: PortConfig,
    pub retry_delay: Duration,
    pub read_chunk: usize,
    pub write_chunk: usize,
    pub join_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            port_config: PortConfig::default(),
            retry_delay: DEFAULT_RETRY_DELAY,
            read_chunk: DEFAULT_READ_CHUNK,
            write_chunk: DEFAULT_WRITE_CHUNK,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
        }
    }
}

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No port open and none requested.
    Idle,
    /// An open has been requested and will be attempted on the next poll.
    Opening,
    /// Port open, workers running.
    Connected,
    /// A close was requested; the next poll tears the link down.
    ClosingRequested,
    /// The last open failed or the line was lost; waiting to retry.
    Faulted,
}

/// Change notifications delivered to [`DeviceSession::subscribe`]rs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConnectionChanged(ConnectionState),
    StateChanged(StateChange),
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Frames that were decoded and applied.
    pub frames_decoded: u64,
    /// Decoder resynchronisations caused by malformed bytes.
    pub framing_resets: u64,
    /// Well-framed packets rejected by [`DeviceState::apply`].
    pub frames_rejected: u64,
    /// Bytes drained from the receive buffer.
    pub bytes_received: u64,
    /// Bytes queued for transmission by setters.
    pub bytes_queued: u64,
    /// Calls to `PortBackend::open`, successful or not.
    pub open_attempts: u64,
}

/// Everything that exists only while a port is open.
struct Link {
    port: Arc<dyn PortHandle>,
    rx: ReceiveWorker,
    tx: TransmitWorker,
    events: Receiver<LinkEvent>,
    data_pending: Arc<AtomicBool>,
}

impl Link {
    fn start(port: Arc<dyn PortHandle>, settings: &SessionSettings) -> std::io::Result<Self> {
        let (events_tx, events) = mpsc::channel();
        let data_pending = Arc::new(AtomicBool::new(false));
        let rx = ReceiveWorker::spawn(
            Arc::clone(&port),
            Arc::new(RingBuffer::new()),
            events_tx.clone(),
            Arc::clone(&data_pending),
            settings.read_chunk,
        )?;
        let tx = match TransmitWorker::spawn(
            Arc::clone(&port),
            Arc::new(RingBuffer::new()),
            events_tx,
            settings.write_chunk,
        ) {
            Ok(tx) => tx,
            Err(e) => {
                let mut rx = rx;
                rx.stop(&*port, settings.join_timeout);
                return Err(e);
            }
        };
        Ok(Self {
            port,
            rx,
            tx,
            events,
            data_pending,
        })
    }

    /// Stops both workers, then closes the port.
    fn shutdown(mut self, join_timeout: Duration) {
        self.rx.request_stop();
        self.tx.request_stop();
        self.rx.stop(&*self.port, join_timeout);
        self.tx.stop(&*self.port, join_timeout);
        self.port.close();
    }
}

/// The parts of a link a setter needs.
struct Outbound {
    buffer: Arc<RingBuffer>,
    wake: Arc<WakeSignal>,
}

struct LinkSlot {
    link: Option<Link>,
    retry_at: Option<Instant>,
    decoder: FrameDecoder,
    frames: Vec<Frame>,
}

/// One device on one serial port.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use seriallink_host::application::session::{ConnectionState, DeviceSession};
/// use seriallink_host::infrastructure::serial_port::mock::MockPortBackend;
///
/// let backend = Arc::new(MockPortBackend::with_ports([("loop", "mock://loop")]).loopback());
/// let session = DeviceSession::new(backend);
/// session.set_path("mock://loop");
/// session.request_open();
/// session.poll();
/// assert_eq!(session.connection_state(), ConnectionState::Connected);
/// session.shutdown();
/// ```
pub struct DeviceSession {
    id: Uuid,
    backend: Arc<dyn PortBackend>,
    settings: SessionSettings,
    open_requested: AtomicBool,
    path: Mutex<Option<String>>,
    link: Mutex<LinkSlot>,
    phase: Mutex<ConnectionState>,
    state: Mutex<DeviceState>,
    outbound: Mutex<Option<Outbound>>,
    subscribers: Mutex<Vec<Sender<SessionEvent>>>,
    stats: Mutex<SessionStats>,
}

impl DeviceSession {
    /// Creates an idle session with default settings.
    pub fn new(backend: Arc<dyn PortBackend>) -> Self {
        Self::with_settings(backend, SessionSettings::default())
    }

    /// Creates an idle session.
    pub fn with_settings(backend: Arc<dyn PortBackend>, settings: SessionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            settings,
            open_requested: AtomicBool::new(false),
            path: Mutex::new(None),
            link: Mutex::new(LinkSlot {
                link: None,
                retry_at: None,
                decoder: FrameDecoder::new(),
                frames: Vec::new(),
            }),
            phase: Mutex::new(ConnectionState::Idle),
            state: Mutex::new(DeviceState::default()),
            outbound: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    /// Identifier used in log output.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The port path the next open will use.
    pub fn path(&self) -> Option<String> {
        lock(&self.path).clone()
    }

    /// Sets the port path.
    ///
    /// If a different port is currently open it is closed on the next poll
    /// and, while an open is still requested, the new path is opened after.
    pub fn set_path(&self, path: impl Into<String>) {
        let path = path.into();
        let changed = {
            let mut current = lock(&self.path);
            let changed = current.as_deref() != Some(path.as_str());
            *current = Some(path);
            changed
        };
        if changed && self.connection_state() == ConnectionState::Connected {
            self.transition(ConnectionState::ClosingRequested);
        }
    }

    /// Asks for the port to be opened.  The open happens on the next poll and
    /// is retried until it succeeds or [`request_close`] is called.
    ///
    /// [`request_close`]: DeviceSession::request_close
    pub fn request_open(&self) {
        self.open_requested.store(true, Ordering::Release);
        let mut phase = lock(&self.phase);
        if *phase == ConnectionState::Idle {
            *phase = ConnectionState::Opening;
            drop(phase);
            self.announce(ConnectionState::Opening);
        }
    }

    /// Asks for the port to be closed.  Idempotent.
    pub fn request_close(&self) {
        self.open_requested.store(false, Ordering::Release);
        let next = match self.connection_state() {
            ConnectionState::Connected => ConnectionState::ClosingRequested,
            ConnectionState::Opening | ConnectionState::Faulted => ConnectionState::Idle,
            ConnectionState::Idle | ConnectionState::ClosingRequested => return,
        };
        self.transition(next);
    }

    /// Closes the port synchronously and returns to `Idle`.
    pub fn shutdown(&self) {
        self.open_requested.store(false, Ordering::Release);
        let mut slot = lock(&self.link);
        self.teardown(&mut slot);
        self.transition(ConnectionState::Idle);
    }

    /// Advances the session by one step.
    pub fn poll(&self) {
        let mut slot = lock(&self.link);
        let wants_open = self.open_requested.load(Ordering::Acquire);

        match self.connection_state() {
            ConnectionState::Idle => {
                if wants_open {
                    self.transition(ConnectionState::Opening);
                    self.attempt_open(&mut slot);
                }
            }
            // Only entered from `request_open`; a failed attempt moves on to
            // `Faulted`, which owns the retry timer.
            ConnectionState::Opening => {
                if wants_open {
                    self.attempt_open(&mut slot);
                } else {
                    self.transition(ConnectionState::Idle);
                }
            }
            ConnectionState::Connected => {
                if wants_open {
                    self.service(&mut slot);
                } else {
                    self.teardown(&mut slot);
                    self.transition(ConnectionState::Idle);
                }
            }
            ConnectionState::ClosingRequested => {
                self.teardown(&mut slot);
                self.transition(ConnectionState::Idle);
            }
            ConnectionState::Faulted => {
                if !wants_open {
                    self.transition(ConnectionState::Idle);
                } else if retry_due(&slot) {
                    self.transition(ConnectionState::Opening);
                    self.attempt_open(&mut slot);
                }
            }
        }
    }

    /// Registers a listener.  Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn connection_state(&self) -> ConnectionState {
        *lock(&self.phase)
    }

    pub fn stats(&self) -> SessionStats {
        *lock(&self.stats)
    }

    // ── Setters ──────────────────────────────────────────────────────────────

    /// Sends a light colour.  Returns `false` (and does nothing) unless
    /// connected.
    pub fn set_light_color(&self, color: u16) -> bool {
        self.send(DeviceCommand::LightColor(color))
    }

    /// Sends a tempo.  Returns `false` (and does nothing) unless connected.
    pub fn set_tempo(&self, tempo: f32) -> bool {
        self.send(DeviceCommand::Tempo(tempo))
    }

    /// Sends the level for one charging alarm.  Returns `false` unless
    /// connected and `alarm` is a valid index.
    pub fn set_charging_alarm_level(&self, alarm: u8, level: u8) -> bool {
        if usize::from(alarm) >= ALARM_COUNT {
            debug!(alarm, "ignoring charging alarm index out of range");
            return false;
        }
        self.send(DeviceCommand::ChargingAlarmLevel { alarm, level })
    }

    // ── Getters ──────────────────────────────────────────────────────────────

    /// Last light colour reported by the device.
    pub fn light_color(&self) -> u16 {
        lock(&self.state).light_color
    }

    /// Last tempo reported by the device.
    pub fn tempo(&self) -> f32 {
        lock(&self.state).tempo
    }

    /// Last level reported for charging alarm `alarm`.
    pub fn alarm_level(&self, alarm: usize) -> Option<u8> {
        lock(&self.state).alarm_level(alarm)
    }

    /// Snapshot of every device value.
    pub fn device_state(&self) -> DeviceState {
        *lock(&self.state)
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn send(&self, command: DeviceCommand) -> bool {
        let outbound = lock(&self.outbound);
        let Some(out) = outbound.as_ref() else {
            debug!(?command, "not connected, dropping command");
            return false;
        };
        let mut bytes = Vec::with_capacity(MAX_FRAME_LEN);
        encode_frame_into(&command.to_frame(), &mut bytes);
        out.buffer.append(&bytes);
        out.wake.notify();
        drop(outbound);

        lock(&self.stats).bytes_queued += bytes.len() as u64;
        true
    }

    fn attempt_open(&self, slot: &mut LinkSlot) {
        let Some(path) = self.path() else {
            debug!(session = %self.id, "no port path set");
            self.fault(slot);
            return;
        };

        lock(&self.stats).open_attempts += 1;
        let port = match self.backend.open(&path, &self.settings.port_config) {
            Ok(port) => port,
            Err(e) => {
                warn!(session = %self.id, %path, error = %e, "open failed");
                self.fault(slot);
                return;
            }
        };

        match Link::start(Arc::clone(&port), &self.settings) {
            Ok(link) => {
                *lock(&self.outbound) = Some(Outbound {
                    buffer: Arc::clone(link.tx.buffer()),
                    wake: Arc::clone(link.tx.wake_signal()),
                });
                slot.decoder.reset();
                slot.link = Some(link);
                slot.retry_at = None;
                info!(
                    session = %self.id,
                    %path,
                    config = %self.settings.port_config.summary(),
                    "serial port connected"
                );
                self.transition(ConnectionState::Connected);
            }
            Err(e) => {
                warn!(session = %self.id, error = %e, "could not start I/O threads");
                port.close();
                self.fault(slot);
            }
        }
    }

    /// Drains events and received bytes while connected.
    fn service(&self, slot: &mut LinkSlot) {
        let (rx_buffer, check) = match slot.link.as_ref() {
            Some(link) => (Arc::clone(link.rx.buffer()), check_link(link)),
            None => {
                self.fault(slot);
                return;
            }
        };

        // Bytes left behind by a lost line are still decoded.
        if check.data_ready || check.lost.is_some() {
            let LinkSlot {
                decoder, frames, ..
            } = &mut *slot;
            frames.clear();
            let received = decoder.decode_from(&rx_buffer, frames);
            let decoder_stats = decoder.stats();
            self.apply_frames(frames, received, decoder_stats.resets);
        }

        if let Some((direction, reason)) = check.lost {
            warn!(session = %self.id, ?direction, %reason, "serial line lost");
            self.teardown(slot);
            self.fault(slot);
        }
    }

    fn apply_frames(&self, frames: &[Frame], received: usize, resets: u64) {
        let mut applied = Vec::with_capacity(frames.len());
        let mut rejected = 0u64;
        {
            let mut state = lock(&self.state);
            for frame in frames {
                match state.apply(frame) {
                    Ok(change) => applied.push(change),
                    Err(e) => {
                        debug!(session = %self.id, error = %e, "rejected frame");
                        rejected += 1;
                    }
                }
            }
        }
        {
            let mut stats = lock(&self.stats);
            stats.bytes_received += received as u64;
            stats.frames_decoded += applied.len() as u64;
            stats.frames_rejected += rejected;
            stats.framing_resets = resets;
        }
        for change in applied {
            self.emit(SessionEvent::StateChanged(change));
        }
    }

    fn teardown(&self, slot: &mut LinkSlot) {
        lock(&self.outbound).take();
        if let Some(link) = slot.link.take() {
            link.shutdown(self.settings.join_timeout);
            info!(session = %self.id, "serial port closed");
        }
    }

    fn fault(&self, slot: &mut LinkSlot) {
        slot.retry_at = Some(Instant::now() + self.settings.retry_delay);
        self.transition(ConnectionState::Faulted);
    }

    fn transition(&self, next: ConnectionState) {
        let changed = {
            let mut phase = lock(&self.phase);
            std::mem::replace(&mut *phase, next) != next
        };
        if changed {
            self.announce(next);
        }
    }

    fn announce(&self, next: ConnectionState) {
        debug!(session = %self.id, state = ?next, "connection state changed");
        self.emit(SessionEvent::ConnectionChanged(next));
    }

    fn emit(&self, event: SessionEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// What one poll learned from a link's events.
#[derive(Debug, Default)]
struct LinkCheck {
    /// The receive worker appended bytes since the last drain.
    data_ready: bool,
    /// Why the line was lost, if it was.
    lost: Option<(Direction, String)>,
}

/// Consumes pending link events.  A `DataAvailable` re-arms the receive
/// worker's notification; the buffer is drained only when one was seen or
/// the line was lost.
fn check_link(link: &Link) -> LinkCheck {
    let mut check = LinkCheck::default();
    for event in link.events.try_iter() {
        match event {
            LinkEvent::DataAvailable => check.data_ready = true,
            LinkEvent::LineClosed { direction, reason } => check.lost = Some((direction, reason)),
        }
    }
    if check.data_ready {
        // Cleared before the drain so bytes appended during it raise a new
        // notification.
        link.data_pending.store(false, Ordering::Release);
    }

    if check.lost.is_none() {
        check.lost = link_health(link);
    }
    check
}

fn link_health(link: &Link) -> Option<(Direction, String)> {
    if !link.port.is_open() {
        Some((Direction::Receive, "port reported closed".to_string()))
    } else if !link.rx.is_running() {
        Some((Direction::Receive, "receive worker exited".to_string()))
    } else if !link.tx.is_running() {
        Some((Direction::Transmit, "transmit worker exited".to_string()))
    } else {
        None
    }
}

fn retry_due(slot: &LinkSlot) -> bool {
    slot.retry_at.map_or(true, |at| Instant::now() >= at)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
