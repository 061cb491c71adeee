use crate::version::ProtocolVersion;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WireError {
    #[error("unexpected end of buffer: need {needed} bytes for {what}, have {remaining}")]
    UnexpectedEof {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("invalid UTF-8 in [{what}]")]
    InvalidUtf8 {
        what: &'static str,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("negative length {len} for [{what}]")]
    NegativeLength { what: &'static str, len: i64 },
    #[error("[{what}] length {len} does not fit the length prefix")]
    LengthOverflow { what: &'static str, len: usize },
    #[error("unknown protocol version byte 0x{0:02x}")]
    UnknownVersion(u8),
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("unknown consistency code 0x{0:04x}")]
    UnknownConsistency(u16),
    #[error("stream id {id} out of range for protocol version {version}")]
    StreamIdOutOfRange { id: i32, version: ProtocolVersion },
    #[error("invalid inet address length {0} (expected 4 or 16)")]
    InvalidInetLength(u8),
}

pub type Result<T> = std::result::Result<T, WireError>;

impl WireError {
    /// Shorthand used by the primitive readers before consuming bytes.
    pub(crate) fn eof(what: &'static str, needed: usize, remaining: usize) -> Self {
        Self::UnexpectedEof {
            what,
            needed,
            remaining,
        }
    }
}
