//! Thread-safe byte buffers shared between a transport worker and its consumer.

pub mod ring;

pub use ring::RingBuffer;
