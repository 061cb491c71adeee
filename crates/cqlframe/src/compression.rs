//! Compression adapters for frame bodies and segment payloads.
//!
//! Two layers use compression with different conventions. Legacy frame
//! bodies (the COMPRESSED header flag) carry Cassandra's LZ4 framing: a
//! 4-byte big-endian uncompressed-length prefix ahead of the raw LZ4 block,
//! or plain Snappy blocks with no prefix. Modern-framing segment payloads
//! are raw LZ4 blocks with both lengths carried by the segment header, so
//! the payload adapter takes the uncompressed length as an argument.

use crate::error::{FrameError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use cqlwire::version::CompressionAlgorithm;

/// Compressor for legacy frame bodies.
pub trait BodyCompressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, input: &[u8]) -> Result<Bytes>;

    fn decompress(&self, input: &[u8]) -> Result<Bytes>;
}

/// Compressor for modern-framing segment payloads.
pub trait PayloadCompressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, input: &[u8], uncompressed_length: usize) -> Result<Bytes>;
}

/// Cassandra-flavor LZ4: 4-byte big-endian uncompressed length, then the
/// bare block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Compressor;

impl Lz4Compressor {
    /// Grow factors tried when sizing the decompression buffer.
    const GROWTH_FACTORS: [usize; 3] = [2, 4, 8];
}

impl BodyCompressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, input: &[u8]) -> Result<Bytes> {
        let block = lz4::block::compress(input, None, false)
            .map_err(|e| FrameError::Compression(format!("lz4 compression failed: {}", e)))?;
        let mut out = BytesMut::with_capacity(4 + block.len());
        out.put_u32(input.len() as u32);
        out.put_slice(&block);
        Ok(out.freeze())
    }

    fn decompress(&self, input: &[u8]) -> Result<Bytes> {
        let mut input = input;
        if input.remaining() < 4 {
            return Err(FrameError::Compression(
                "lz4 payload shorter than its length prefix".to_string(),
            ));
        }
        let declared = input.get_u32() as usize;
        if declared == 0 {
            // Some peers still emit the one-byte block terminator for an
            // empty payload, others emit nothing. Accept both.
            if input.remaining() > 1 {
                return Err(FrameError::Compression(format!(
                    "{} trailing bytes after empty lz4 payload",
                    input.remaining()
                )));
            }
            return Ok(Bytes::new());
        }

        // Size the output buffer adaptively: 2x the compressed size, doubling
        // up to 8x, never below the declared length.
        let mut last_err = None;
        for factor in Self::GROWTH_FACTORS {
            let capacity = (input.len() * factor).max(declared);
            match lz4::block::decompress(input, Some(capacity as i32)) {
                Ok(output) => {
                    if output.len() != declared {
                        return Err(FrameError::DecompressedLengthMismatch {
                            declared,
                            actual: output.len(),
                        });
                    }
                    return Ok(Bytes::from(output));
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(FrameError::Compression(format!(
            "lz4 decompression failed after growing the buffer to 8x: {}",
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

/// Plain Snappy blocks, no length prefix (the raw format self-describes).
#[derive(Debug, Clone, Copy, Default)]
pub struct SnappyCompressor;

impl BodyCompressor for SnappyCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Snappy
    }

    fn compress(&self, input: &[u8]) -> Result<Bytes> {
        let mut encoder = snap::raw::Encoder::new();
        encoder
            .compress_vec(input)
            .map(Bytes::from)
            .map_err(|e| FrameError::Compression(format!("snappy compression failed: {}", e)))
    }

    fn decompress(&self, input: &[u8]) -> Result<Bytes> {
        let mut decoder = snap::raw::Decoder::new();
        decoder
            .decompress_vec(input)
            .map(Bytes::from)
            .map_err(|e| FrameError::Compression(format!("snappy decompression failed: {}", e)))
    }
}

/// Raw LZ4 blocks for segment payloads. The segment header carries both
/// lengths, so no prefix is written here.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4PayloadCompressor;

impl PayloadCompressor for Lz4PayloadCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(input, None, false)
            .map_err(|e| FrameError::Compression(format!("lz4 compression failed: {}", e)))
    }

    fn decompress(&self, input: &[u8], uncompressed_length: usize) -> Result<Bytes> {
        let output = lz4::block::decompress(input, Some(uncompressed_length as i32))
            .map_err(|e| FrameError::Compression(format!("lz4 decompression failed: {}", e)))?;
        if output.len() != uncompressed_length {
            return Err(FrameError::DecompressedLengthMismatch {
                declared: uncompressed_length,
                actual: output.len(),
            });
        }
        Ok(Bytes::from(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_body_round_trip() {
        let compressor = Lz4Compressor;
        let data = b"SELECT * FROM system.local; ".repeat(64);
        let compressed = compressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], &data[..]);
    }

    #[test]
    fn test_lz4_body_prefix_is_big_endian_length() {
        let compressor = Lz4Compressor;
        let data = b"0123456789abcdef";
        let compressed = compressor.compress(data).unwrap();
        let declared = u32::from_be_bytes(compressed[..4].try_into().unwrap());
        assert_eq!(declared as usize, data.len());
    }

    #[test]
    fn test_lz4_body_empty_payload_variants() {
        let compressor = Lz4Compressor;
        // Zero prefix with nothing after it.
        assert_eq!(
            compressor.decompress(&[0, 0, 0, 0]).unwrap(),
            Bytes::new()
        );
        // Zero prefix with the single block terminator byte.
        assert_eq!(
            compressor.decompress(&[0, 0, 0, 0, 0]).unwrap(),
            Bytes::new()
        );
        // More than one trailing byte is malformed.
        assert!(compressor.decompress(&[0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_lz4_body_length_mismatch_rejected() {
        let compressor = Lz4Compressor;
        let data = b"some payload bytes that compress";
        let mut compressed = compressor.compress(data).unwrap().to_vec();
        // Lie about the uncompressed length.
        compressed[..4].copy_from_slice(&((data.len() as u32) - 1).to_be_bytes());
        assert!(compressor.decompress(&compressed).is_err());
    }

    #[test]
    fn test_snappy_round_trip() {
        let compressor = SnappyCompressor;
        let data = b"the quick brown fox jumps over the lazy dog. ".repeat(16);
        let compressed = compressor.compress(&data).unwrap();
        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], &data[..]);
    }

    #[test]
    fn test_payload_compressor_round_trip() {
        let compressor = Lz4PayloadCompressor;
        let data = vec![0x42u8; 4096];
        let compressed = compressor.compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = compressor.decompress(&compressed, data.len()).unwrap();
        assert_eq!(&decompressed[..], &data[..]);
    }
}
