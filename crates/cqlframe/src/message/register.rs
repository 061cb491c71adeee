//! REGISTER body.

use crate::error::Result;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

/// REGISTER: the `[string list]` of event types to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Register {
    pub event_types: Vec<String>,
}

impl Register {
    pub fn all() -> Self {
        Self {
            event_types: vec![
                "TOPOLOGY_CHANGE".to_string(),
                "STATUS_CHANGE".to_string(),
                "SCHEMA_CHANGE".to_string(),
            ],
        }
    }
}

pub struct RegisterCodec;

impl MessageCodec for RegisterCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Register
    }

    fn encode(&self, message: &Message, buf: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
        match message {
            Message::Register(register) => {
                primitive::write_string_list(&register.event_types, buf)?;
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Register, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Register(register) => {
                Ok(primitive::length_of_string_list(&register.event_types))
            }
            other => Err(wrong_kind(Opcode::Register, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        let event_types = primitive::read_string_list(buf)?;
        Ok(Message::Register(Register { event_types }))
    }
}
