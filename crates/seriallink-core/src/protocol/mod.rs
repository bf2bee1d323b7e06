//! Protocol module containing the frame types, the encoder, and the decoder.

pub mod codec;
pub mod decoder;
pub mod frame;

pub use codec::{encode_frame, encode_frame_into};
pub use decoder::{DecoderState, DecoderStats, FrameDecoder};
pub use frame::*;
