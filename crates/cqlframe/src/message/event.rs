//! EVENT body: server-push notifications.

use crate::error::{FrameError, Result};
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::primitive::{self, Inet};
use cqlwire::{Opcode, ProtocolVersion};

pub const TOPOLOGY_CHANGE: &str = "TOPOLOGY_CHANGE";
pub const STATUS_CHANGE: &str = "STATUS_CHANGE";
pub const SCHEMA_CHANGE: &str = "SCHEMA_CHANGE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyChange {
    /// `NEW_NODE`, `REMOVED_NODE` or `MOVED_NODE`.
    pub change_type: String,
    pub address: Inet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// `UP` or `DOWN`.
    pub change_type: String,
    pub address: Inet,
}

/// What a schema change applies to. Shared with the SchemaChange RESULT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChangeTarget {
    Keyspace,
    Table,
    Type,
    Function,
    Aggregate,
}

impl SchemaChangeTarget {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Keyspace => "KEYSPACE",
            Self::Table => "TABLE",
            Self::Type => "TYPE",
            Self::Function => "FUNCTION",
            Self::Aggregate => "AGGREGATE",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "KEYSPACE" => Ok(Self::Keyspace),
            "TABLE" => Ok(Self::Table),
            "TYPE" => Ok(Self::Type),
            "FUNCTION" => Ok(Self::Function),
            "AGGREGATE" => Ok(Self::Aggregate),
            other => Err(FrameError::malformed(
                Opcode::Event,
                format!("unknown schema change target {}", other),
            )),
        }
    }
}

/// A schema change, as carried by both EVENT and RESULT frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaChange {
    /// `CREATED`, `UPDATED` or `DROPPED`.
    pub change_type: String,
    pub target: SchemaChangeTarget,
    pub keyspace: String,
    /// Table/type/function/aggregate name; empty for keyspace targets.
    pub object: String,
    /// Function/aggregate argument types.
    pub arguments: Vec<String>,
}

impl SchemaChange {
    pub fn encode(&self, buf: &mut BytesMut, _version: ProtocolVersion) -> Result<()> {
        primitive::write_string(&self.change_type, buf)?;
        primitive::write_string(self.target.as_str(), buf)?;
        primitive::write_string(&self.keyspace, buf)?;
        match self.target {
            SchemaChangeTarget::Keyspace => {}
            SchemaChangeTarget::Table | SchemaChangeTarget::Type => {
                primitive::write_string(&self.object, buf)?;
            }
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate => {
                primitive::write_string(&self.object, buf)?;
                primitive::write_string_list(&self.arguments, buf)?;
            }
        }
        Ok(())
    }

    pub fn encoded_length(&self, _version: ProtocolVersion) -> usize {
        let mut length = primitive::length_of_string(&self.change_type)
            + primitive::length_of_string(self.target.as_str())
            + primitive::length_of_string(&self.keyspace);
        match self.target {
            SchemaChangeTarget::Keyspace => {}
            SchemaChangeTarget::Table | SchemaChangeTarget::Type => {
                length += primitive::length_of_string(&self.object);
            }
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate => {
                length += primitive::length_of_string(&self.object)
                    + primitive::length_of_string_list(&self.arguments);
            }
        }
        length
    }

    pub fn decode(buf: &mut Bytes, _version: ProtocolVersion) -> Result<Self> {
        let change_type = primitive::read_string(buf)?;
        let target = SchemaChangeTarget::parse(&primitive::read_string(buf)?)?;
        let keyspace = primitive::read_string(buf)?;
        let (object, arguments) = match target {
            SchemaChangeTarget::Keyspace => (String::new(), Vec::new()),
            SchemaChangeTarget::Table | SchemaChangeTarget::Type => {
                (primitive::read_string(buf)?, Vec::new())
            }
            SchemaChangeTarget::Function | SchemaChangeTarget::Aggregate => {
                let object = primitive::read_string(buf)?;
                let arguments = primitive::read_string_list(buf)?;
                (object, arguments)
            }
        };
        Ok(Self {
            change_type,
            target,
            keyspace,
            object,
            arguments,
        })
    }
}

/// EVENT: `[string]` event type, then a type-specific payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TopologyChange(TopologyChange),
    StatusChange(StatusChange),
    SchemaChange(SchemaChange),
}

impl Event {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TopologyChange(_) => TOPOLOGY_CHANGE,
            Self::StatusChange(_) => STATUS_CHANGE,
            Self::SchemaChange(_) => SCHEMA_CHANGE,
        }
    }
}

pub struct EventCodec;

impl MessageCodec for EventCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Event
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Event(event) => {
                primitive::write_string(event.event_type(), buf)?;
                match event {
                    Event::TopologyChange(change) => {
                        primitive::write_string(&change.change_type, buf)?;
                        primitive::write_inet(&change.address, buf);
                    }
                    Event::StatusChange(change) => {
                        primitive::write_string(&change.change_type, buf)?;
                        primitive::write_inet(&change.address, buf);
                    }
                    Event::SchemaChange(change) => change.encode(buf, version)?,
                }
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Event, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Event(event) => {
                let mut length = primitive::length_of_string(event.event_type());
                length += match event {
                    Event::TopologyChange(change) => {
                        primitive::length_of_string(&change.change_type)
                            + primitive::length_of_inet(&change.address)
                    }
                    Event::StatusChange(change) => {
                        primitive::length_of_string(&change.change_type)
                            + primitive::length_of_inet(&change.address)
                    }
                    Event::SchemaChange(change) => change.encoded_length(version),
                };
                Ok(length)
            }
            other => Err(wrong_kind(Opcode::Event, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let event_type = primitive::read_string(buf)?;
        let event = match event_type.as_str() {
            TOPOLOGY_CHANGE => Event::TopologyChange(TopologyChange {
                change_type: primitive::read_string(buf)?,
                address: primitive::read_inet(buf)?,
            }),
            STATUS_CHANGE => Event::StatusChange(StatusChange {
                change_type: primitive::read_string(buf)?,
                address: primitive::read_inet(buf)?,
            }),
            SCHEMA_CHANGE => Event::SchemaChange(SchemaChange::decode(buf, version)?),
            other => {
                return Err(FrameError::malformed(
                    Opcode::Event,
                    format!("unknown event type {}", other),
                ))
            }
        };
        Ok(Message::Event(event))
    }
}
