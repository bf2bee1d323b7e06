//! Mutex-guarded growable byte FIFO.
//!
//! # Why a buffer between the port and the parser? (for beginners)
//!
//! A serial port delivers bytes whenever the device sends them, not when the
//! application happens to be ready.  A background thread therefore reads the
//! port continuously and parks the bytes here; the application drains them
//! later at its own pace.  The transmit path works the same way in reverse:
//! setters append encoded packets and a writer thread drains them to the port.
//!
//! # Locking
//!
//! The lock lives *inside* the buffer.  Every operation takes it for the
//! whole read-modify-write, so no caller can observe a byte count that a
//! concurrent `append` has only half updated, and no call site can forget to
//! lock.  Operations never block on anything except that lock.
//!
//! Storage is a `VecDeque<u8>`: appending is amortized O(1) and removing `k`
//! bytes from the front is O(k).  Capacity is unbounded.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A FIFO of bytes that producers append to and consumers drain from.
///
/// Shared between threads behind an `Arc`.
///
/// # Examples
///
/// ```rust
/// use seriallink_core::RingBuffer;
///
/// let buffer = RingBuffer::new();
/// buffer.append(b"hello");
/// assert_eq!(buffer.consume(2), b"he");
/// assert_eq!(buffer.len(), 3);
/// ```
#[derive(Debug, Default)]
pub struct RingBuffer {
    inner: Mutex<VecDeque<u8>>,
}

impl RingBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Appends `bytes` at the tail.  Always succeeds.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.lock().extend(bytes.iter().copied());
    }

    /// Removes and returns up to `max_n` bytes from the head.
    ///
    /// Returns fewer bytes if fewer are buffered and an empty vector if the
    /// buffer is empty.
    pub fn consume(&self, max_n: usize) -> Vec<u8> {
        let mut guard = self.lock();
        let n = max_n.min(guard.len());
        guard.drain(..n).collect()
    }

    /// Removes up to `dest.len()` bytes from the head into `dest`.
    ///
    /// Returns the number of bytes written to `dest`.
    pub fn consume_into(&self, dest: &mut [u8]) -> usize {
        let mut guard = self.lock();
        let n = dest.len().min(guard.len());
        for (slot, byte) in dest.iter_mut().zip(guard.drain(..n)) {
            *slot = byte;
        }
        n
    }

    /// Copies up to `max_n` bytes from the head without removing them.
    pub fn peek(&self, max_n: usize) -> Vec<u8> {
        let guard = self.lock();
        guard.iter().take(max_n).copied().collect()
    }

    /// Removes up to `n` bytes from the head, returning how many were removed.
    pub fn discard(&self, n: usize) -> usize {
        let mut guard = self.lock();
        let n = n.min(guard.len());
        guard.drain(..n);
        n
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every buffered byte.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while holding the lock cannot leave the deque half-modified in
    // a way that breaks its invariants, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_buffer_is_empty() {
        // Arrange / Act
        let buffer = RingBuffer::new();

        // Assert
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_consume_returns_bytes_in_append_order() {
        // Arrange
        let buffer = RingBuffer::new();
        buffer.append(&[1, 2, 3]);
        buffer.append(&[4, 5]);

        // Act
        let out = buffer.consume(10);

        // Assert
        assert_eq!(out, vec![1, 2, 3, 4, 5]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_consume_returns_at_most_max_n_bytes() {
        let buffer = RingBuffer::new();
        buffer.append(&[9, 8, 7, 6]);

        assert_eq!(buffer.consume(3), vec![9, 8, 7]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_consume_on_empty_buffer_returns_empty_vec() {
        let buffer = RingBuffer::new();
        assert!(buffer.consume(16).is_empty());
    }

    #[test]
    fn test_consume_zero_leaves_buffer_untouched() {
        let buffer = RingBuffer::new();
        buffer.append(&[1]);

        assert!(buffer.consume(0).is_empty());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_append_empty_slice_is_noop() {
        let buffer = RingBuffer::new();
        buffer.append(&[]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_consume_into_fills_destination_prefix() {
        // Arrange
        let buffer = RingBuffer::new();
        buffer.append(&[10, 20]);
        let mut dest = [0u8; 4];

        // Act
        let n = buffer.consume_into(&mut dest);

        // Assert
        assert_eq!(n, 2);
        assert_eq!(dest, [10, 20, 0, 0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_peek_does_not_remove_bytes() {
        let buffer = RingBuffer::new();
        buffer.append(&[1, 2, 3]);

        assert_eq!(buffer.peek(2), vec![1, 2]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_discard_removes_only_requested_prefix() {
        // Arrange
        let buffer = RingBuffer::new();
        buffer.append(&[1, 2, 3, 4]);

        // Act
        let removed = buffer.discard(3);

        // Assert
        assert_eq!(removed, 3);
        assert_eq!(buffer.consume(10), vec![4]);
    }

    #[test]
    fn test_discard_more_than_buffered_is_clamped() {
        let buffer = RingBuffer::new();
        buffer.append(&[1, 2]);

        assert_eq!(buffer.discard(100), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_empties_buffer() {
        let buffer = RingBuffer::with_capacity(8);
        buffer.append(&[1, 2, 3]);
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_producer_and_consumer_preserve_order() {
        // Arrange
        let buffer = Arc::new(RingBuffer::new());
        let producer_buffer = Arc::clone(&buffer);

        // Act – the producer appends 0..=255 repeatedly while we drain.
        let producer = thread::spawn(move || {
            for round in 0..20u32 {
                let chunk: Vec<u8> = (0..=255u8).collect();
                producer_buffer.append(&chunk);
                if round % 4 == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut received = Vec::new();
        while received.len() < 20 * 256 {
            received.extend(buffer.consume(97));
        }
        producer.join().unwrap();

        // Assert – every byte arrives exactly once and in order.
        for (i, byte) in received.iter().enumerate() {
            assert_eq!(*byte, (i % 256) as u8, "byte {i} out of order");
        }
        assert!(buffer.is_empty());
    }
}
