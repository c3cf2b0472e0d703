//! Streaming CBOR (RFC 8949) codec for dynamically-typed data.
//!
//! Definite-length items only, text-string map keys, no tags: the pragmatic
//! interchange subset. Both directions run incrementally over size-bounded
//! chunks: the encoder through a fixed-capacity staging buffer with
//! optional chunk recycling, the decoder over a rope of input chunks with an
//! `on_free` hand-back for buffer-pool reuse. Per-item transform hooks can
//! inspect, replace or reject values on either side; on the decode side a
//! replacement made without invoking the hook's thunk skips the underlying
//! bytes so the cursor stays byte-exact.
//!
//! Entry points: [`encode`]/[`decode`] for contiguous buffers, the pull
//! adapters in one direction ([`EncodeIter`]/[`DecodeIter`] and their
//! awaitable counterparts), and the push-style duplex bridges
//! ([`encode_duplex`]/[`decode_duplex`]) with one-slot backpressure.

mod buffer;
mod decode;
mod duplex;
mod encode;
mod error;
mod scanner;
mod stream;
mod value;

#[cfg(test)]
mod decode_tests;

pub use buffer::ChunkBuffer;
pub use decode::{decode, DecodeKeyHook, DecodeOptions, DecodeValueHook, ItemKind, Thunk};
pub use duplex::{
    decode_duplex, encode_duplex, DecodeReceiver, DecodeSender, EncodeReceiver, EncodeSender,
};
pub use encode::{
    encode, encode_chunks, Chunk, ChunkWriter, EncodeKeyHook, EncodeOptions, EncodeValueHook,
    FloatWidth,
};
pub use error::{Error, HookError};
pub use stream::{DecodeIter, DecodeStream, EncodeIter, EncodeStream};
pub use value::{PathItem, Value, SAFE_INTEGER_BOUND};
