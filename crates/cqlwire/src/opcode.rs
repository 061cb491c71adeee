//! Frame opcodes.

use std::fmt;

/// Opcode carried in byte 4 of the frame header.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    Query = 0x07,
    Result = 0x08,
    Prepare = 0x09,
    Execute = 0x0A,
    Register = 0x0B,
    Event = 0x0C,
    Batch = 0x0D,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
    /// DSE continuous-paging revise (cancel / request more pages).
    ReviseRequest = 0xFF,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        self.into()
    }

    /// True for opcodes a client is allowed to send.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::Startup
                | Self::Options
                | Self::Query
                | Self::Prepare
                | Self::Execute
                | Self::Register
                | Self::Batch
                | Self::AuthResponse
                | Self::ReviseRequest
        )
    }

    /// True for opcodes a server is allowed to send.
    pub fn is_response(self) -> bool {
        matches!(
            self,
            Self::Error
                | Self::Ready
                | Self::Authenticate
                | Self::Supported
                | Self::Result
                | Self::Event
                | Self::AuthChallenge
                | Self::AuthSuccess
        )
    }

    /// Whether a body with this opcode may carry the COMPRESSED flag.
    ///
    /// STARTUP is what negotiates compression, so it must go out in the
    /// clear; OPTIONS and READY have empty bodies.
    pub fn is_compressible(self) -> bool {
        !matches!(self, Self::Startup | Self::Options | Self::Ready)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Error => "ERROR",
            Self::Startup => "STARTUP",
            Self::Ready => "READY",
            Self::Authenticate => "AUTHENTICATE",
            Self::Options => "OPTIONS",
            Self::Supported => "SUPPORTED",
            Self::Query => "QUERY",
            Self::Result => "RESULT",
            Self::Prepare => "PREPARE",
            Self::Execute => "EXECUTE",
            Self::Register => "REGISTER",
            Self::Event => "EVENT",
            Self::Batch => "BATCH",
            Self::AuthChallenge => "AUTH_CHALLENGE",
            Self::AuthResponse => "AUTH_RESPONSE",
            Self::AuthSuccess => "AUTH_SUCCESS",
            Self::ReviseRequest => "REVISE_REQUEST",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for byte in 0x00u8..=0x10 {
            if byte == 0x04 {
                continue; // CREDENTIALS, removed in v3
            }
            let op = Opcode::try_from(byte).unwrap();
            assert_eq!(op.as_u8(), byte);
        }
        assert!(Opcode::try_from(0x11).is_err());
        assert_eq!(Opcode::try_from(0xFF).unwrap(), Opcode::ReviseRequest);
    }

    #[test]
    fn test_direction_predicates() {
        assert!(Opcode::Query.is_request());
        assert!(!Opcode::Query.is_response());
        assert!(Opcode::Result.is_response());
        assert!(!Opcode::Result.is_request());
        assert!(Opcode::Ready.is_response());
        assert!(Opcode::Startup.is_request());
    }

    #[test]
    fn test_compressible() {
        assert!(!Opcode::Startup.is_compressible());
        assert!(!Opcode::Options.is_compressible());
        assert!(!Opcode::Ready.is_compressible());
        assert!(Opcode::Query.is_compressible());
        assert!(Opcode::Result.is_compressible());
    }
}
