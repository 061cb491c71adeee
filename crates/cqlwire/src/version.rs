//! Protocol version vocabulary and capability predicates.

use crate::error::WireError;
use std::fmt;

/// The body compression algorithms a connection can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Lz4,
    Snappy,
}

impl CompressionAlgorithm {
    /// Name used in STARTUP option maps.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Lz4 => "lz4",
            Self::Snappy => "snappy",
        }
    }
}

/// Supported native protocol versions.
///
/// The wire encoding is the low 7 bits of the version byte; the high bit is
/// the response-direction bit and is handled by the frame codec.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(u8)]
pub enum ProtocolVersion {
    V3 = 0x03,
    V4 = 0x04,
    V5 = 0x05,
    Dse1 = 0x41,
    Dse2 = 0x42,
}

impl ProtocolVersion {
    /// Every version this library speaks, in ascending order.
    pub const ALL: [ProtocolVersion; 5] = [Self::V3, Self::V4, Self::V5, Self::Dse1, Self::Dse2];

    /// Parse the low 7 bits of a header version byte.
    pub fn from_wire(byte: u8) -> Result<Self, WireError> {
        Self::try_from(byte & 0x7f).map_err(|_| WireError::UnknownVersion(byte))
    }

    pub fn as_u8(self) -> u8 {
        self.into()
    }

    /// Beta versions must carry the USE_BETA header flag.
    pub fn is_beta(self) -> bool {
        matches!(self, Self::V5 | Self::Dse2)
    }

    pub fn is_dse(self) -> bool {
        matches!(self, Self::Dse1 | Self::Dse2)
    }

    /// Versions that wrap frames in checksummed segments after handshake.
    pub fn supports_modern_framing(self) -> bool {
        matches!(self, Self::V5 | Self::Dse2)
    }

    /// Custom payloads and warnings appeared in v4.
    pub fn supports_custom_payload(self) -> bool {
        !matches!(self, Self::V3)
    }

    pub fn supports_warnings(self) -> bool {
        !matches!(self, Self::V3)
    }

    /// v5 and the DSE versions widened query flags from `[byte]` to `[int]`.
    pub fn uses_int_query_flags(self) -> bool {
        matches!(self, Self::V5 | Self::Dse1 | Self::Dse2)
    }

    /// Continuous paging is a DSE extension.
    pub fn supports_continuous_paging(self) -> bool {
        self.is_dse()
    }

    pub fn supports_compression(self, algorithm: CompressionAlgorithm) -> bool {
        match algorithm {
            CompressionAlgorithm::None => true,
            // Snappy was dropped when modern framing took over body compression.
            CompressionAlgorithm::Snappy => !self.supports_modern_framing(),
            CompressionAlgorithm::Lz4 => true,
        }
    }

    /// Length of the fixed frame header, identical for all supported versions.
    pub fn header_length(self) -> usize {
        9
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V3 => write!(f, "v3"),
            Self::V4 => write!(f, "v4"),
            Self::V5 => write!(f, "v5"),
            Self::Dse1 => write!(f, "dse-v1"),
            Self::Dse2 => write!(f, "dse-v2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_wire_masks_direction_bit() {
        assert_eq!(
            ProtocolVersion::from_wire(0x84).unwrap(),
            ProtocolVersion::V4
        );
        assert_eq!(
            ProtocolVersion::from_wire(0x42).unwrap(),
            ProtocolVersion::Dse2
        );
    }

    #[test]
    fn test_from_wire_rejects_unknown() {
        assert!(ProtocolVersion::from_wire(0x02).is_err());
        assert!(ProtocolVersion::from_wire(0x7f).is_err());
    }

    #[test]
    fn test_modern_framing_versions() {
        assert!(!ProtocolVersion::V3.supports_modern_framing());
        assert!(!ProtocolVersion::V4.supports_modern_framing());
        assert!(ProtocolVersion::V5.supports_modern_framing());
        assert!(!ProtocolVersion::Dse1.supports_modern_framing());
        assert!(ProtocolVersion::Dse2.supports_modern_framing());
    }

    #[test]
    fn test_beta_versions() {
        assert!(ProtocolVersion::V5.is_beta());
        assert!(!ProtocolVersion::V4.is_beta());
        assert!(ProtocolVersion::Dse2.is_beta());
        assert!(!ProtocolVersion::Dse1.is_beta());
    }

    #[test]
    fn test_query_flag_width() {
        assert!(!ProtocolVersion::V3.uses_int_query_flags());
        assert!(!ProtocolVersion::V4.uses_int_query_flags());
        assert!(ProtocolVersion::V5.uses_int_query_flags());
        assert!(ProtocolVersion::Dse1.uses_int_query_flags());
        assert!(ProtocolVersion::Dse2.uses_int_query_flags());
    }
}
