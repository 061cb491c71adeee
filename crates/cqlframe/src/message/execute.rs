//! EXECUTE body.

use crate::error::{FrameError, Result};
use crate::message::query::QueryParameters;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

/// EXECUTE: the prepared-statement id, the v5 result-metadata id, then the
/// same parameter block QUERY uses.
#[derive(Debug, Clone, PartialEq)]
pub struct Execute {
    pub query_id: Bytes,
    pub result_metadata_id: Option<Bytes>,
    pub params: QueryParameters,
}

impl Execute {
    pub fn new(query_id: impl Into<Bytes>) -> Self {
        Self {
            query_id: query_id.into(),
            result_metadata_id: None,
            params: QueryParameters::default(),
        }
    }

    pub fn with_params(mut self, params: QueryParameters) -> Self {
        self.params = params;
        self
    }
}

pub struct ExecuteCodec;

impl MessageCodec for ExecuteCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Execute
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Execute(execute) => {
                primitive::write_short_bytes(&execute.query_id, buf)?;
                if version == ProtocolVersion::V5 {
                    let metadata_id = execute.result_metadata_id.as_ref().ok_or_else(|| {
                        FrameError::malformed(
                            Opcode::Execute,
                            "result metadata id is mandatory on v5",
                        )
                    })?;
                    primitive::write_short_bytes(metadata_id, buf)?;
                }
                execute.params.encode(buf, version)
            }
            other => Err(wrong_kind(Opcode::Execute, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Execute(execute) => {
                let mut length = primitive::length_of_short_bytes(&execute.query_id);
                if version == ProtocolVersion::V5 {
                    let metadata_id = execute.result_metadata_id.as_ref().ok_or_else(|| {
                        FrameError::malformed(
                            Opcode::Execute,
                            "result metadata id is mandatory on v5",
                        )
                    })?;
                    length += primitive::length_of_short_bytes(metadata_id);
                }
                Ok(length + execute.params.encoded_length(version)?)
            }
            other => Err(wrong_kind(Opcode::Execute, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let query_id = primitive::read_short_bytes(buf)?;
        let result_metadata_id = if version == ProtocolVersion::V5 {
            Some(primitive::read_short_bytes(buf)?)
        } else {
            None
        };
        let params = QueryParameters::decode(buf, version)?;
        Ok(Message::Execute(Execute {
            query_id,
            result_metadata_id,
            params,
        }))
    }
}
