//! Concurrency tests for `RingBuffer`.
//!
//! A producer thread and a consumer thread hammer one buffer with
//! interleaved `append` / `consume` calls.  Whatever the interleaving, the
//! byte accounting must balance:
//!
//! ```text
//! total appended == total consumed + bytes still buffered
//! ```
//!
//! and, because there is exactly one producer and one consumer, the consumed
//! bytes must come out in the order they went in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use seriallink_core::RingBuffer;

const OPERATIONS: usize = 10_000;

#[test]
fn test_interleaved_append_consume_never_loses_or_duplicates_bytes() {
    // Arrange
    let buffer = Arc::new(RingBuffer::new());
    let producer_done = Arc::new(AtomicBool::new(false));

    let producer = {
        let buffer = Arc::clone(&buffer);
        let done = Arc::clone(&producer_done);
        thread::spawn(move || {
            let mut next: u32 = 0;
            let mut appended = 0usize;
            for i in 0..OPERATIONS {
                let len = i % 7 + 1;
                let chunk: Vec<u8> = (0..len)
                    .map(|_| {
                        let b = (next % 251) as u8;
                        next += 1;
                        b
                    })
                    .collect();
                buffer.append(&chunk);
                appended += len;
            }
            done.store(true, Ordering::Release);
            appended
        })
    };

    let consumer = {
        let buffer = Arc::clone(&buffer);
        let done = Arc::clone(&producer_done);
        thread::spawn(move || {
            let mut consumed = Vec::new();
            for i in 0..OPERATIONS {
                consumed.extend(buffer.consume(i % 5 + 1));
            }
            // Keep draining until the producer has finished and nothing is left.
            loop {
                let finished = done.load(Ordering::Acquire);
                let chunk = buffer.consume(64);
                if chunk.is_empty() && finished {
                    break;
                }
                consumed.extend(chunk);
            }
            consumed
        })
    };

    // Act
    let appended = producer.join().unwrap();
    let consumed = consumer.join().unwrap();

    // Assert
    assert_eq!(appended, consumed.len() + buffer.len());
    for (i, byte) in consumed.iter().enumerate() {
        assert_eq!(*byte, (i % 251) as u8, "byte {i} lost, duplicated, or reordered");
    }
}

#[test]
fn test_len_is_never_observed_mid_append() {
    // Arrange – appends are always 8 bytes and consumes always take 8, so
    // any observed length must be a multiple of 8.
    let buffer = Arc::new(RingBuffer::new());
    let writer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for _ in 0..OPERATIONS {
                buffer.append(&[0xAB; 8]);
            }
        })
    };
    let reader = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for _ in 0..OPERATIONS {
                let len = buffer.len();
                assert_eq!(len % 8, 0, "observed partial length {len}");
                let taken = buffer.consume(8).len();
                assert!(taken == 0 || taken == 8);
            }
        })
    };

    // Act / Assert
    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(buffer.len() % 8, 0);
}
