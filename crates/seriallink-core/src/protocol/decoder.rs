//! Incremental frame decoder.
//!
//! # How the decoder finds packets in a byte stream (for beginners)
//!
//! A serial line is just a stream of bytes.  If the application starts
//! listening halfway through a packet, or a byte is corrupted, the receiver
//! must be able to find the start of the *next* good packet.  The two sync
//! bytes (`'*'` then `'~'`) mark that start.  The decoder is a small state
//! machine that looks at one byte at a time:
//!
//! ```text
//! AwaitSync1 --'*'--> AwaitSync2 --'~'--> AwaitCommand --tag--> AwaitLength
//!     ^                   |                   |                    |
//!     |               other byte          bad tag            len > max
//!     +-------------------+-------------------+--------------------+
//!     ^                                                            |
//!     +------ frame emitted <---- AwaitPayload <---- len 1..=max --+
//!                                  (len 0 emits at once)
//! ```
//!
//! Any malformed byte sends the machine back to `AwaitSync1` and is consumed
//! by the reset, never re-examined as a new start byte.  That includes a
//! second `'*'` while waiting for `'~'`: `"**~"` is not a packet start, and
//! the decoder only resynchronises on the next `'*'` after it.
//!
//! # Error detection seam
//!
//! The protocol carries no checksum.  A check field would be appended after
//! the payload (not counted in the length byte) and verified by an extra
//! state between `AwaitPayload` and the point where the frame is emitted.

use tracing::trace;

use crate::buffer::RingBuffer;
use crate::protocol::frame::{Command, Frame, MAX_PAYLOAD_LEN, SYNC1, SYNC2};

/// How many bytes [`FrameDecoder::decode_from`] drains per lock acquisition.
const DRAIN_CHUNK: usize = 256;

/// Position of the decoder within the packet format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitSync1,
    AwaitSync2,
    AwaitCommand,
    AwaitLength,
    AwaitPayload,
}

/// Running counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Complete frames emitted.
    pub frames: u64,
    /// Resets caused by a malformed sync, command, or length byte.
    pub resets: u64,
}

/// Turns a raw byte stream into [`Frame`]s.
///
/// Holds no buffering beyond the frame currently being received.
///
/// # Examples
///
/// ```rust
/// use seriallink_core::{Command, FrameDecoder};
///
/// let mut decoder = FrameDecoder::new();
/// let frames = decoder.decode(&[0x2A, 0x7E, 0x02, 0x02, 0x01, 0x00]);
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].command(), Command::Tempo);
/// assert_eq!(frames[0].payload(), &[0x01, 0x00]);
/// ```
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecoderState,
    command: Option<Command>,
    expected: usize,
    received: usize,
    payload: [u8; MAX_PAYLOAD_LEN],
    stats: DecoderStats,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates a decoder waiting for the first sync byte.
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitSync1,
            command: None,
            expected: 0,
            received: 0,
            payload: [0u8; MAX_PAYLOAD_LEN],
            stats: DecoderStats::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Counters accumulated since construction.
    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Abandons any partially received frame.  Counters are kept.
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitSync1;
        self.command = None;
        self.expected = 0;
        self.received = 0;
    }

    /// Feeds one byte, returning a frame if this byte completed one.
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecoderState::AwaitSync1 => {
                if byte == SYNC1 {
                    self.state = DecoderState::AwaitSync2;
                }
                None
            }
            DecoderState::AwaitSync2 => {
                if byte == SYNC2 {
                    self.state = DecoderState::AwaitCommand;
                } else {
                    self.malformed("sync2", byte);
                }
                None
            }
            DecoderState::AwaitCommand => {
                match Command::try_from(byte) {
                    Ok(command) => {
                        self.command = Some(command);
                        self.state = DecoderState::AwaitLength;
                    }
                    Err(_) => self.malformed("command", byte),
                }
                None
            }
            DecoderState::AwaitLength => {
                let len = byte as usize;
                if len > MAX_PAYLOAD_LEN {
                    self.malformed("length", byte);
                    return None;
                }
                self.expected = len;
                self.received = 0;
                if len == 0 {
                    return self.emit();
                }
                self.state = DecoderState::AwaitPayload;
                None
            }
            DecoderState::AwaitPayload => {
                self.payload[self.received] = byte;
                self.received += 1;
                if self.received == self.expected {
                    self.emit()
                } else {
                    None
                }
            }
        }
    }

    /// Feeds `bytes` in order, appending every completed frame to `out`.
    ///
    /// Returns the number of frames appended.
    pub fn decode_into(&mut self, bytes: &[u8], out: &mut Vec<Frame>) -> usize {
        let before = out.len();
        out.extend(bytes.iter().filter_map(|&b| self.push_byte(b)));
        out.len() - before
    }

    /// Feeds `bytes` in order and returns the completed frames.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut out = Vec::new();
        self.decode_into(bytes, &mut out);
        out
    }

    /// Drains every byte currently in `buffer` through the decoder.
    ///
    /// Returns the number of bytes consumed from the buffer.
    pub fn decode_from(&mut self, buffer: &RingBuffer, out: &mut Vec<Frame>) -> usize {
        let mut chunk = [0u8; DRAIN_CHUNK];
        let mut total = 0;
        loop {
            let n = buffer.consume_into(&mut chunk);
            if n == 0 {
                return total;
            }
            self.decode_into(&chunk[..n], out);
            total += n;
        }
    }

    fn emit(&mut self) -> Option<Frame> {
        let frame = self
            .command
            .and_then(|command| Frame::new(command, &self.payload[..self.expected]).ok());
        self.reset();
        if frame.is_some() {
            self.stats.frames += 1;
        }
        frame
    }

    fn malformed(&mut self, field: &'static str, byte: u8) {
        trace!(field, byte, "framing error, resynchronizing");
        self.stats.resets += 1;
        self.reset();
    }
}
