//! SUPPORTED body.

use crate::error::Result;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};
use std::collections::HashMap;

/// SUPPORTED: a `[string multimap]` of option names to allowed values.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Supported {
    pub options: HashMap<String, Vec<String>>,
}

impl Supported {
    /// The answer a minimal server gives to OPTIONS.
    pub fn standard() -> Self {
        let mut options = HashMap::new();
        options.insert(
            "CQL_VERSION".to_string(),
            vec!["3.0.0".to_string(), "3.4.5".to_string()],
        );
        options.insert(
            "COMPRESSION".to_string(),
            vec!["lz4".to_string(), "snappy".to_string()],
        );
        options.insert(
            "PROTOCOL_VERSIONS".to_string(),
            vec!["3/v3".to_string(), "4/v4".to_string(), "5/v5-beta".to_string()],
        );
        Self { options }
    }
}

pub struct SupportedCodec;

impl MessageCodec for SupportedCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Supported
    }

    fn encode(&self, message: &Message, buf: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
        match message {
            Message::Supported(supported) => {
                primitive::write_string_multimap(&supported.options, buf)?;
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Supported, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Supported(supported) => {
                Ok(primitive::length_of_string_multimap(&supported.options))
            }
            other => Err(wrong_kind(Opcode::Supported, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        let options = primitive::read_string_multimap(buf)?;
        Ok(Message::Supported(Supported { options }))
    }
}
