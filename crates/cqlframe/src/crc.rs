//! Checksums for modern framing.
//!
//! Segment headers carry a CRC-24 (Koopman polynomial) and payloads a CRC-32
//! (IEEE). Both are seeded with fixed constants so that an empty input still
//! produces a non-trivial checksum; the CRC-32 seed bytes are mandated by the
//! wire format.

/// Bytes fed to the CRC-32 before the payload.
pub const CRC32_INITIAL_BYTES: [u8; 4] = [0xFA, 0x2D, 0x55, 0xCA];

const CRC24_INIT: u32 = 0x87_5060;
const CRC24_POLY: u32 = 0x1974F0B;

/// CRC-24 over `data`, processed byte-by-byte in wire order.
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= u32::from(byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0xFF_FFFF
}

/// Seeded IEEE CRC-32 over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&CRC32_INITIAL_BYTES);
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc24_stability() {
        // The empty input must still reflect the seeded initial state.
        let empty = crc24(&[]);
        assert_eq!(empty, CRC24_INIT);
        let one = crc24(&[0x00]);
        assert_ne!(one, empty);
        assert_eq!(one, crc24(&[0x00]));
    }

    #[test]
    fn test_crc24_detects_single_bit_flips() {
        let data = [0x12u8, 0x34, 0x56, 0x78, 0x9A];
        let reference = crc24(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut corrupted = data;
                corrupted[byte] ^= 1 << bit;
                assert_ne!(crc24(&corrupted), reference);
            }
        }
    }

    #[test]
    fn test_crc32_uses_seed() {
        // Seeding must make crc32 of the empty payload differ from the
        // unseeded IEEE CRC of the empty string (which is 0).
        assert_ne!(crc32(&[]), 0);
        assert_eq!(crc32(b"payload"), crc32(b"payload"));
        assert_ne!(crc32(b"payload"), crc32(b"payloae"));
    }
}
