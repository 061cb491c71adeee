//! Frame, segment and message codecs for the Cassandra/DSE native protocol.
//!
//! The layering mirrors the wire format: message bodies (one codec per
//! opcode, collected in a registry), frames around them (9-byte header,
//! optional body compression), and for v5/DSE v2 modern framing, segments
//! around frames (CRC-24 protected headers, CRC-32 protected payloads,
//! optional LZ4).

pub mod codec;
pub mod compression;
pub mod crc;
pub mod error;
pub mod frame;
pub mod message;
pub mod segment;

pub use codec::FrameCodec;
pub use compression::{
    BodyCompressor, Lz4Compressor, Lz4PayloadCompressor, PayloadCompressor, SnappyCompressor,
};
pub use error::{FrameError, Result};
pub use frame::{Frame, FrameHeader, HeaderFlags, RawFrame};
pub use message::{CodecRegistry, Message, MessageCodec};
pub use segment::{
    split_frame, Segment, SegmentAccumulator, SegmentCodec, SegmentHeader, MAX_PAYLOAD_LENGTH,
};
