//! Response Streaming
//!
//! Both ends of the chat response body.
//!
//! ```text
//! server:  CompletionStream ──encode_stream──▶ bytes ──▶ HTTP body
//! client:  HTTP body ──▶ StreamDecoder ──▶ Reassembler ──▶ Conversation
//! ```
//!
//! The same [`WireFormat`] must be used on both ends. Round-tripping any
//! delta sequence through the encoder and decoder, under any chunking of the
//! bytes in between, yields the concatenation of the non-empty deltas.

mod decoder;
mod encoder;
mod reassembler;

pub use decoder::{parse_frame, DecodeEvent, LineBuffer, StreamDecoder, Utf8Accumulator, DATA_PREFIX};
pub use encoder::{encode_stream, StreamEncoder, WireFormat};
pub use reassembler::Reassembler;
