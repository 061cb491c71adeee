use cqlwire::{Opcode, ProtocolVersion, WireError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("unsupported protocol version byte 0x{version_byte:02x} (use_beta: {use_beta})")]
    UnsupportedVersion { version_byte: u8, use_beta: bool },
    #[error("beta version {version} requires the USE_BETA flag (use_beta: {use_beta})")]
    UseBetaRequired {
        version: ProtocolVersion,
        use_beta: bool,
    },
    #[error("USE_BETA flag set on stable version {version}")]
    UseBetaUnexpected { version: ProtocolVersion },
    #[error("opcode {opcode} is not a valid {direction} opcode")]
    InvalidDirection {
        opcode: Opcode,
        direction: &'static str,
    },
    #[error("header opcode {header} does not match body opcode {body}")]
    OpcodeMismatch { header: Opcode, body: Opcode },
    #[error("unsupported opcode 0x{0:02x}")]
    UnsupportedOpcode(u8),
    #[error("{feature} is not supported on protocol {version}")]
    UnsupportedFeature {
        feature: &'static str,
        version: ProtocolVersion,
    },
    #[error("negative body length {0}")]
    NegativeBodyLength(i32),
    #[error("COMPRESSED flag set but no compressor configured")]
    CompressorMissing,
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompressed length {actual} does not match declared length {declared}")]
    DecompressedLengthMismatch { declared: usize, actual: usize },
    #[error("segment header CRC mismatch: stored 0x{stored:06x}, computed 0x{computed:06x}")]
    HeaderCrcMismatch { stored: u32, computed: u32 },
    #[error("segment payload CRC mismatch: stored 0x{stored:08x}, computed 0x{computed:08x}")]
    PayloadCrcMismatch { stored: u32, computed: u32 },
    #[error("segment payload length {0} exceeds the 131071-byte maximum")]
    PayloadTooLong(usize),
    #[error("multi-segment reassembly error: {0}")]
    Reassembly(String),
    #[error("malformed {opcode} body: {detail}")]
    MalformedBody { opcode: Opcode, detail: String },
    #[error("message {actual} handed to the {expected} codec")]
    WrongMessageKind { expected: Opcode, actual: Opcode },
}

pub type Result<T> = std::result::Result<T, FrameError>;

impl FrameError {
    pub(crate) fn malformed(opcode: Opcode, detail: impl Into<String>) -> Self {
        Self::MalformedBody {
            opcode,
            detail: detail.into(),
        }
    }
}
