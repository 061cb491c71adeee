//! STARTUP, OPTIONS and READY bodies.

use crate::error::Result;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::version::CompressionAlgorithm;
use cqlwire::{primitive, Opcode, ProtocolVersion};
use std::collections::HashMap;

pub const CQL_VERSION_KEY: &str = "CQL_VERSION";
pub const COMPRESSION_KEY: &str = "COMPRESSION";
pub const DRIVER_NAME_KEY: &str = "DRIVER_NAME";
pub const DRIVER_VERSION_KEY: &str = "DRIVER_VERSION";
pub const DEFAULT_CQL_VERSION: &str = "3.0.0";

/// STARTUP: a `[string map]` of options.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Startup {
    pub options: HashMap<String, String>,
}

impl Startup {
    pub fn new(compression: CompressionAlgorithm) -> Self {
        let mut options = HashMap::new();
        options.insert(CQL_VERSION_KEY.to_string(), DEFAULT_CQL_VERSION.to_string());
        if compression != CompressionAlgorithm::None {
            options.insert(COMPRESSION_KEY.to_string(), compression.as_str().to_string());
        }
        Self { options }
    }

    pub fn with_driver(mut self, name: &str, version: &str) -> Self {
        self.options
            .insert(DRIVER_NAME_KEY.to_string(), name.to_string());
        self.options
            .insert(DRIVER_VERSION_KEY.to_string(), version.to_string());
        self
    }

    pub fn compression(&self) -> Option<&str> {
        self.options.get(COMPRESSION_KEY).map(String::as_str)
    }
}

pub struct StartupCodec;

impl MessageCodec for StartupCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Startup
    }

    fn encode(&self, message: &Message, buf: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
        match message {
            Message::Startup(startup) => {
                primitive::write_string_map(&startup.options, buf)?;
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Startup, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Startup(startup) => Ok(primitive::length_of_string_map(&startup.options)),
            other => Err(wrong_kind(Opcode::Startup, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        let options = primitive::read_string_map(buf)?;
        Ok(Message::Startup(Startup { options }))
    }
}

/// OPTIONS has an empty body.
pub struct OptionsCodec;

impl MessageCodec for OptionsCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Options
    }

    fn encode(&self, message: &Message, _: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
        match message {
            Message::Options => Ok(()),
            other => Err(wrong_kind(Opcode::Options, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Options => Ok(0),
            other => Err(wrong_kind(Opcode::Options, other)),
        }
    }

    fn decode(&self, _: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        Ok(Message::Options)
    }
}

/// READY has an empty body.
pub struct ReadyCodec;

impl MessageCodec for ReadyCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Ready
    }

    fn encode(&self, message: &Message, _: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
        match message {
            Message::Ready => Ok(()),
            other => Err(wrong_kind(Opcode::Ready, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Ready => Ok(0),
            other => Err(wrong_kind(Opcode::Ready, other)),
        }
    }

    fn decode(&self, _: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        Ok(Message::Ready)
    }
}
