//! Protocol module containing the message catalogue and both codecs.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{
    decode_frame, decode_signal, encode_frame, encode_frame_now, encode_signal, CodecError,
    DecodedFrame, Envelope,
};
pub use messages::*;
pub use sequence::{SequenceCounter, SequenceGuard};
