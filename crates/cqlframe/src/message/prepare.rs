//! PREPARE body.

use crate::error::{FrameError, Result};
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

const PREPARE_FLAG_WITH_KEYSPACE: u32 = 0x01;

/// PREPARE: a `[long string]`; v5 adds a flags `[int]` and an optional
/// keyspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepare {
    pub query: String,
    pub keyspace: Option<String>,
}

impl Prepare {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            keyspace: None,
        }
    }
}

pub struct PrepareCodec;

impl MessageCodec for PrepareCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Prepare
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Prepare(prepare) => {
                if prepare.keyspace.is_some() && version != ProtocolVersion::V5 {
                    return Err(FrameError::UnsupportedFeature {
                        feature: "per-prepare keyspace",
                        version,
                    });
                }
                primitive::write_long_string(&prepare.query, buf)?;
                if version == ProtocolVersion::V5 {
                    match &prepare.keyspace {
                        Some(keyspace) => {
                            primitive::write_int(PREPARE_FLAG_WITH_KEYSPACE as i32, buf);
                            primitive::write_string(keyspace, buf)?;
                        }
                        None => primitive::write_int(0, buf),
                    }
                }
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Prepare, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Prepare(prepare) => {
                let mut length = primitive::length_of_long_string(&prepare.query);
                if version == ProtocolVersion::V5 {
                    length += 4;
                    if let Some(keyspace) = &prepare.keyspace {
                        length += primitive::length_of_string(keyspace);
                    }
                }
                Ok(length)
            }
            other => Err(wrong_kind(Opcode::Prepare, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let query = primitive::read_long_string(buf)?;
        let keyspace = if version == ProtocolVersion::V5 {
            let flags = primitive::read_int(buf)? as u32;
            if flags & PREPARE_FLAG_WITH_KEYSPACE != 0 {
                Some(primitive::read_string(buf)?)
            } else {
                None
            }
        } else {
            None
        };
        Ok(Message::Prepare(Prepare { query, keyspace }))
    }
}
