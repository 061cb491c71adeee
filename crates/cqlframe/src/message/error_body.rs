//! ERROR body: an `[int]` code, a `[string]` message, and code-specific
//! details.

use crate::error::{FrameError, Result};
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Consistency, Opcode, ProtocolVersion};
use std::net::IpAddr;

/// Error codes, as raw `[int]` values so unknown codes survive decoding.
pub mod codes {
    pub const SERVER_ERROR: i32 = 0x0000;
    pub const PROTOCOL_ERROR: i32 = 0x000A;
    pub const AUTHENTICATION_ERROR: i32 = 0x0100;
    pub const UNAVAILABLE: i32 = 0x1000;
    pub const OVERLOADED: i32 = 0x1001;
    pub const IS_BOOTSTRAPPING: i32 = 0x1002;
    pub const TRUNCATE_ERROR: i32 = 0x1003;
    pub const WRITE_TIMEOUT: i32 = 0x1100;
    pub const READ_TIMEOUT: i32 = 0x1200;
    pub const READ_FAILURE: i32 = 0x1300;
    pub const FUNCTION_FAILURE: i32 = 0x1400;
    pub const WRITE_FAILURE: i32 = 0x1500;
    pub const SYNTAX_ERROR: i32 = 0x2000;
    pub const UNAUTHORIZED: i32 = 0x2100;
    pub const INVALID: i32 = 0x2200;
    pub const CONFIG_ERROR: i32 = 0x2300;
    pub const ALREADY_EXISTS: i32 = 0x2400;
    pub const UNPREPARED: i32 = 0x2500;
}

/// The write operation a timeout or failure applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteType {
    Simple,
    Batch,
    UnloggedBatch,
    Counter,
    BatchLog,
    Cas,
    View,
    Cdc,
    Other(String),
}

impl WriteType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Batch => "BATCH",
            Self::UnloggedBatch => "UNLOGGED_BATCH",
            Self::Counter => "COUNTER",
            Self::BatchLog => "BATCH_LOG",
            Self::Cas => "CAS",
            Self::View => "VIEW",
            Self::Cdc => "CDC",
            Self::Other(raw) => raw,
        }
    }

    pub fn parse(raw: String) -> Self {
        match raw.as_str() {
            "SIMPLE" => Self::Simple,
            "BATCH" => Self::Batch,
            "UNLOGGED_BATCH" => Self::UnloggedBatch,
            "COUNTER" => Self::Counter,
            "BATCH_LOG" => Self::BatchLog,
            "CAS" => Self::Cas,
            "VIEW" => Self::View,
            "CDC" => Self::Cdc,
            _ => Self::Other(raw),
        }
    }
}

/// Per-replica failure accounting: a plain count before v5, an
/// endpoint-to-reason map from v5 on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReasons {
    Count(i32),
    PerEndpoint(Vec<(IpAddr, u16)>),
}

impl FailureReasons {
    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<()> {
        match (self, version) {
            (Self::Count(count), v) if v != ProtocolVersion::V5 => {
                primitive::write_int(*count, buf);
                Ok(())
            }
            (Self::PerEndpoint(reasons), ProtocolVersion::V5) => {
                primitive::write_int(reasons.len() as i32, buf);
                for (endpoint, code) in reasons {
                    primitive::write_inet_addr(endpoint, buf);
                    primitive::write_short(*code, buf);
                }
                Ok(())
            }
            _ => Err(FrameError::malformed(
                Opcode::Error,
                "failure reasons form does not match the protocol version",
            )),
        }
    }

    fn encoded_length(&self, version: ProtocolVersion) -> Result<usize> {
        match (self, version) {
            (Self::Count(_), v) if v != ProtocolVersion::V5 => Ok(4),
            (Self::PerEndpoint(reasons), ProtocolVersion::V5) => Ok(4 + reasons
                .iter()
                .map(|(endpoint, _)| primitive::length_of_inet_addr(endpoint) + 2)
                .sum::<usize>()),
            _ => Err(FrameError::malformed(
                Opcode::Error,
                "failure reasons form does not match the protocol version",
            )),
        }
    }

    fn decode(buf: &mut Bytes, version: ProtocolVersion) -> Result<Self> {
        if version == ProtocolVersion::V5 {
            let count = primitive::read_int(buf)?;
            let mut reasons = Vec::with_capacity(count.max(0).min(1024) as usize);
            for _ in 0..count {
                let endpoint = primitive::read_inet_addr(buf)?;
                let code = primitive::read_short(buf)?;
                reasons.push((endpoint, code));
            }
            Ok(Self::PerEndpoint(reasons))
        } else {
            Ok(Self::Count(primitive::read_int(buf)?))
        }
    }
}

/// Code-specific trailer of the ERROR body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorDetail {
    #[default]
    None,
    Unavailable {
        consistency: Consistency,
        required: i32,
        alive: i32,
    },
    ReadTimeout {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        data_present: bool,
    },
    WriteTimeout {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        write_type: WriteType,
        /// v5, CAS writes only.
        contentions: Option<u16>,
    },
    ReadFailure {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        reasons: FailureReasons,
        data_present: bool,
    },
    WriteFailure {
        consistency: Consistency,
        received: i32,
        block_for: i32,
        reasons: FailureReasons,
        write_type: WriteType,
    },
    FunctionFailure {
        keyspace: String,
        function: String,
        arg_types: Vec<String>,
    },
    AlreadyExists {
        keyspace: String,
        table: String,
    },
    Unprepared {
        id: Bytes,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
    pub detail: ErrorDetail,
}

impl ErrorBody {
    /// A detail-free error with the given code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: ErrorDetail::None,
        }
    }

    pub fn unprepared(message: impl Into<String>, id: impl Into<Bytes>) -> Self {
        Self {
            code: codes::UNPREPARED,
            message: message.into(),
            detail: ErrorDetail::Unprepared { id: id.into() },
        }
    }
}

pub struct ErrorCodec;

impl MessageCodec for ErrorCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Error
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Error(body) => {
                primitive::write_int(body.code, buf);
                primitive::write_string(&body.message, buf)?;
                match &body.detail {
                    ErrorDetail::None => {}
                    ErrorDetail::Unavailable {
                        consistency,
                        required,
                        alive,
                    } => {
                        primitive::write_consistency(*consistency, buf);
                        primitive::write_int(*required, buf);
                        primitive::write_int(*alive, buf);
                    }
                    ErrorDetail::ReadTimeout {
                        consistency,
                        received,
                        block_for,
                        data_present,
                    } => {
                        primitive::write_consistency(*consistency, buf);
                        primitive::write_int(*received, buf);
                        primitive::write_int(*block_for, buf);
                        primitive::write_byte(u8::from(*data_present), buf);
                    }
                    ErrorDetail::WriteTimeout {
                        consistency,
                        received,
                        block_for,
                        write_type,
                        contentions,
                    } => {
                        primitive::write_consistency(*consistency, buf);
                        primitive::write_int(*received, buf);
                        primitive::write_int(*block_for, buf);
                        primitive::write_string(write_type.as_str(), buf)?;
                        if version == ProtocolVersion::V5 && *write_type == WriteType::Cas {
                            primitive::write_short(contentions.unwrap_or(0), buf);
                        }
                    }
                    ErrorDetail::ReadFailure {
                        consistency,
                        received,
                        block_for,
                        reasons,
                        data_present,
                    } => {
                        primitive::write_consistency(*consistency, buf);
                        primitive::write_int(*received, buf);
                        primitive::write_int(*block_for, buf);
                        reasons.encode(buf, version)?;
                        primitive::write_byte(u8::from(*data_present), buf);
                    }
                    ErrorDetail::WriteFailure {
                        consistency,
                        received,
                        block_for,
                        reasons,
                        write_type,
                    } => {
                        primitive::write_consistency(*consistency, buf);
                        primitive::write_int(*received, buf);
                        primitive::write_int(*block_for, buf);
                        reasons.encode(buf, version)?;
                        primitive::write_string(write_type.as_str(), buf)?;
                    }
                    ErrorDetail::FunctionFailure {
                        keyspace,
                        function,
                        arg_types,
                    } => {
                        primitive::write_string(keyspace, buf)?;
                        primitive::write_string(function, buf)?;
                        primitive::write_string_list(arg_types, buf)?;
                    }
                    ErrorDetail::AlreadyExists { keyspace, table } => {
                        primitive::write_string(keyspace, buf)?;
                        primitive::write_string(table, buf)?;
                    }
                    ErrorDetail::Unprepared { id } => {
                        primitive::write_short_bytes(id, buf)?;
                    }
                }
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Error, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Error(body) => {
                let mut length = 4 + primitive::length_of_string(&body.message);
                length += match &body.detail {
                    ErrorDetail::None => 0,
                    ErrorDetail::Unavailable { .. } => primitive::LENGTH_OF_CONSISTENCY + 8,
                    ErrorDetail::ReadTimeout { .. } => primitive::LENGTH_OF_CONSISTENCY + 9,
                    ErrorDetail::WriteTimeout {
                        write_type,
                        ..
                    } => {
                        primitive::LENGTH_OF_CONSISTENCY
                            + 8
                            + primitive::length_of_string(write_type.as_str())
                            + if version == ProtocolVersion::V5 && *write_type == WriteType::Cas {
                                2
                            } else {
                                0
                            }
                    }
                    ErrorDetail::ReadFailure { reasons, .. } => {
                        primitive::LENGTH_OF_CONSISTENCY + 8 + reasons.encoded_length(version)? + 1
                    }
                    ErrorDetail::WriteFailure {
                        reasons,
                        write_type,
                        ..
                    } => {
                        primitive::LENGTH_OF_CONSISTENCY
                            + 8
                            + reasons.encoded_length(version)?
                            + primitive::length_of_string(write_type.as_str())
                    }
                    ErrorDetail::FunctionFailure {
                        keyspace,
                        function,
                        arg_types,
                    } => {
                        primitive::length_of_string(keyspace)
                            + primitive::length_of_string(function)
                            + primitive::length_of_string_list(arg_types)
                    }
                    ErrorDetail::AlreadyExists { keyspace, table } => {
                        primitive::length_of_string(keyspace) + primitive::length_of_string(table)
                    }
                    ErrorDetail::Unprepared { id } => primitive::length_of_short_bytes(id),
                };
                Ok(length)
            }
            other => Err(wrong_kind(Opcode::Error, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let code = primitive::read_int(buf)?;
        let message = primitive::read_string(buf)?;
        let detail = match code {
            codes::UNAVAILABLE => ErrorDetail::Unavailable {
                consistency: primitive::read_consistency(buf)?,
                required: primitive::read_int(buf)?,
                alive: primitive::read_int(buf)?,
            },
            codes::READ_TIMEOUT => ErrorDetail::ReadTimeout {
                consistency: primitive::read_consistency(buf)?,
                received: primitive::read_int(buf)?,
                block_for: primitive::read_int(buf)?,
                data_present: primitive::read_byte(buf)? != 0,
            },
            codes::WRITE_TIMEOUT => {
                let consistency = primitive::read_consistency(buf)?;
                let received = primitive::read_int(buf)?;
                let block_for = primitive::read_int(buf)?;
                let write_type = WriteType::parse(primitive::read_string(buf)?);
                let contentions = if version == ProtocolVersion::V5 && write_type == WriteType::Cas
                {
                    Some(primitive::read_short(buf)?)
                } else {
                    None
                };
                ErrorDetail::WriteTimeout {
                    consistency,
                    received,
                    block_for,
                    write_type,
                    contentions,
                }
            }
            codes::READ_FAILURE => ErrorDetail::ReadFailure {
                consistency: primitive::read_consistency(buf)?,
                received: primitive::read_int(buf)?,
                block_for: primitive::read_int(buf)?,
                reasons: FailureReasons::decode(buf, version)?,
                data_present: primitive::read_byte(buf)? != 0,
            },
            codes::WRITE_FAILURE => ErrorDetail::WriteFailure {
                consistency: primitive::read_consistency(buf)?,
                received: primitive::read_int(buf)?,
                block_for: primitive::read_int(buf)?,
                reasons: FailureReasons::decode(buf, version)?,
                write_type: WriteType::parse(primitive::read_string(buf)?),
            },
            codes::FUNCTION_FAILURE => ErrorDetail::FunctionFailure {
                keyspace: primitive::read_string(buf)?,
                function: primitive::read_string(buf)?,
                arg_types: primitive::read_string_list(buf)?,
            },
            codes::ALREADY_EXISTS => ErrorDetail::AlreadyExists {
                keyspace: primitive::read_string(buf)?,
                table: primitive::read_string(buf)?,
            },
            codes::UNPREPARED => ErrorDetail::Unprepared {
                id: primitive::read_short_bytes(buf)?,
            },
            _ => ErrorDetail::None,
        };
        Ok(Message::Error(ErrorBody {
            code,
            message,
            detail,
        }))
    }
}
