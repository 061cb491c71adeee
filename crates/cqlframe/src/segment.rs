//! Modern-framing segments (v5 / DSE v2).
//!
//! A segment wraps either one or more whole frames (self-contained) or a
//! chunk of one large frame. The header is 3 bytes uncompressed or 5 bytes
//! compressed, little-endian bit-packed, followed by a CRC-24 of the header
//! bytes; the payload is followed by a seeded CRC-32 of the payload bytes as
//! they appear on the wire.

use crate::compression::PayloadCompressor;
use crate::crc::{crc24, crc32};
use crate::error::{FrameError, Result};
use crate::frame::FrameHeader;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::sync::Arc;

/// Maximum payload carried by one segment (17 bits).
pub const MAX_PAYLOAD_LENGTH: usize = 131_071;

pub const UNCOMPRESSED_HEADER_LENGTH: usize = 3;
pub const COMPRESSED_HEADER_LENGTH: usize = 5;
pub const CRC24_LENGTH: usize = 3;
pub const CRC32_LENGTH: usize = 4;

const SELF_CONTAINED_BIT_UNCOMPRESSED: u64 = 1 << 17;
const SELF_CONTAINED_BIT_COMPRESSED: u64 = 1 << 34;
const LENGTH_MASK: u64 = MAX_PAYLOAD_LENGTH as u64;

/// One decoded segment: the (uncompressed) payload and the self-contained
/// marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub payload: Bytes,
    pub self_contained: bool,
}

impl Segment {
    pub fn self_contained(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            self_contained: true,
        }
    }

    pub fn part(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            self_contained: false,
        }
    }
}

/// Parsed segment header, CRC already verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    /// Bytes of payload on the wire (compressed length when compressed).
    pub payload_length: usize,
    /// Decompressed length; 0 on the compressed codec means the sender
    /// stored the payload uncompressed.
    pub uncompressed_length: usize,
    pub self_contained: bool,
}

/// Encodes and decodes segments, with optional LZ4 payload compression.
#[derive(Clone)]
pub struct SegmentCodec {
    compressor: Option<Arc<dyn PayloadCompressor>>,
}

impl SegmentCodec {
    pub fn uncompressed() -> Self {
        Self { compressor: None }
    }

    pub fn compressed(compressor: Arc<dyn PayloadCompressor>) -> Self {
        Self {
            compressor: Some(compressor),
        }
    }

    pub fn is_compressing(&self) -> bool {
        self.compressor.is_some()
    }

    /// Header length before the CRC-24, by codec flavor.
    pub fn header_length(&self) -> usize {
        if self.compressor.is_some() {
            COMPRESSED_HEADER_LENGTH
        } else {
            UNCOMPRESSED_HEADER_LENGTH
        }
    }

    pub fn encode(&self, segment: &Segment, buf: &mut BytesMut) -> Result<()> {
        if segment.payload.len() > MAX_PAYLOAD_LENGTH {
            return Err(FrameError::PayloadTooLong(segment.payload.len()));
        }
        let (wire_payload, uncompressed_length) = match &self.compressor {
            Some(compressor) => {
                let compressed = compressor.compress(&segment.payload)?;
                if compressed.len() >= segment.payload.len() {
                    // Store uncompressed; length 0 signals it on the wire.
                    tracing::trace!(
                        "segment payload incompressible ({} -> {} bytes), storing raw",
                        segment.payload.len(),
                        compressed.len()
                    );
                    (segment.payload.clone(), 0)
                } else {
                    (Bytes::from(compressed), segment.payload.len() as u64)
                }
            }
            None => (segment.payload.clone(), 0),
        };

        let header_length = self.header_length();
        let mut bits = wire_payload.len() as u64;
        if self.compressor.is_some() {
            bits |= uncompressed_length << 17;
            if segment.self_contained {
                bits |= SELF_CONTAINED_BIT_COMPRESSED;
            }
        } else if segment.self_contained {
            bits |= SELF_CONTAINED_BIT_UNCOMPRESSED;
        }
        let header_bytes = &bits.to_le_bytes()[..header_length];

        buf.reserve(header_length + CRC24_LENGTH + wire_payload.len() + CRC32_LENGTH);
        buf.put_slice(header_bytes);
        buf.put_slice(&crc24(header_bytes).to_le_bytes()[..CRC24_LENGTH]);
        buf.put_slice(&wire_payload);
        buf.put_u32_le(crc32(&wire_payload));
        Ok(())
    }

    /// Reads and verifies the header plus its CRC-24.
    pub fn decode_header(&self, buf: &mut Bytes) -> Result<SegmentHeader> {
        let header_length = self.header_length();
        let needed = header_length + CRC24_LENGTH;
        if buf.remaining() < needed {
            return Err(FrameError::Wire(cqlwire::WireError::UnexpectedEof {
                what: "segment header",
                needed,
                remaining: buf.remaining(),
            }));
        }
        let mut raw = [0u8; COMPRESSED_HEADER_LENGTH];
        buf.copy_to_slice(&mut raw[..header_length]);
        let computed = crc24(&raw[..header_length]);
        let mut stored_bytes = [0u8; 4];
        buf.copy_to_slice(&mut stored_bytes[..CRC24_LENGTH]);
        let stored = u32::from_le_bytes(stored_bytes);
        if stored != computed {
            return Err(FrameError::HeaderCrcMismatch { stored, computed });
        }

        let mut bits = [0u8; 8];
        bits[..header_length].copy_from_slice(&raw[..header_length]);
        let bits = u64::from_le_bytes(bits);
        if self.compressor.is_some() {
            Ok(SegmentHeader {
                payload_length: (bits & LENGTH_MASK) as usize,
                uncompressed_length: ((bits >> 17) & LENGTH_MASK) as usize,
                self_contained: bits & SELF_CONTAINED_BIT_COMPRESSED != 0,
            })
        } else {
            let length = (bits & LENGTH_MASK) as usize;
            Ok(SegmentHeader {
                payload_length: length,
                uncompressed_length: length,
                self_contained: bits & SELF_CONTAINED_BIT_UNCOMPRESSED != 0,
            })
        }
    }

    /// Reads the payload and trailer following `header`, verifies the CRC-32
    /// and decompresses if needed.
    pub fn decode_payload(&self, header: &SegmentHeader, buf: &mut Bytes) -> Result<Segment> {
        let needed = header.payload_length + CRC32_LENGTH;
        if buf.remaining() < needed {
            return Err(FrameError::Wire(cqlwire::WireError::UnexpectedEof {
                what: "segment payload",
                needed,
                remaining: buf.remaining(),
            }));
        }
        let wire_payload = buf.split_to(header.payload_length);
        let stored = buf.get_u32_le();
        let computed = crc32(&wire_payload);
        if stored != computed {
            return Err(FrameError::PayloadCrcMismatch { stored, computed });
        }
        let payload = match &self.compressor {
            Some(compressor) if header.uncompressed_length > 0 => {
                compressor.decompress(&wire_payload, header.uncompressed_length)?
            }
            _ => wire_payload,
        };
        Ok(Segment {
            payload,
            self_contained: header.self_contained,
        })
    }

    pub fn decode(&self, buf: &mut Bytes) -> Result<Segment> {
        let header = self.decode_header(buf)?;
        self.decode_payload(&header, buf)
    }
}

/// Splits an encoded frame into outbound segments: one self-contained
/// segment when it fits, consecutive parts otherwise.
pub fn split_frame(frame_bytes: Bytes) -> Vec<Segment> {
    if frame_bytes.len() <= MAX_PAYLOAD_LENGTH {
        return vec![Segment::self_contained(frame_bytes)];
    }
    let mut remaining = frame_bytes;
    let mut parts = Vec::with_capacity(remaining.len() / MAX_PAYLOAD_LENGTH + 1);
    while !remaining.is_empty() {
        let chunk = remaining.split_to(remaining.len().min(MAX_PAYLOAD_LENGTH));
        parts.push(Segment::part(chunk));
    }
    parts
}

/// Reassembles one large frame from consecutive multi-segment parts.
///
/// The first part must begin with a frame header; its body length gives the
/// reassembly target. Self-contained segments may not arrive while a frame
/// is partially accumulated.
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    buffer: BytesMut,
    target: usize,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.target = 0;
    }

    /// Called when a self-contained segment arrives; fails if a frame is
    /// partially accumulated.
    pub fn expect_empty(&self) -> Result<()> {
        if self.buffer.is_empty() {
            Ok(())
        } else {
            Err(FrameError::Reassembly(format!(
                "self-contained segment interleaved with a partial frame ({} of {} bytes buffered)",
                self.buffer.len(),
                self.target
            )))
        }
    }

    /// Adds one multi-segment part. Returns the complete frame bytes once
    /// the accumulated size reaches the target parsed from the first part.
    pub fn accumulate(&mut self, payload: &[u8]) -> Result<Option<Bytes>> {
        if self.buffer.is_empty() {
            if payload.len() < FrameHeader::LENGTH {
                return Err(FrameError::Reassembly(format!(
                    "first part of a multi-segment frame is {} bytes, shorter than a frame header",
                    payload.len()
                )));
            }
            let body_length = i32::from_be_bytes(payload[5..9].try_into().expect("4 bytes"));
            if body_length < 0 {
                return Err(FrameError::NegativeBodyLength(body_length));
            }
            self.target = FrameHeader::LENGTH + body_length as usize;
        }
        self.buffer.extend_from_slice(payload);
        if self.buffer.len() < self.target {
            return Ok(None);
        }
        if self.buffer.len() > self.target {
            let overshoot = self.buffer.len();
            self.reset();
            return Err(FrameError::Reassembly(format!(
                "accumulated {} bytes past the {}-byte frame boundary",
                overshoot, self.target
            )));
        }
        let frame = self.buffer.split().freeze();
        self.reset();
        Ok(Some(frame))
    }
}
