//! The `[option]` type tree used in result metadata column specs.

use crate::error::{FrameError, Result};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

mod ids {
    pub const CUSTOM: u16 = 0x0000;
    pub const ASCII: u16 = 0x0001;
    pub const BIGINT: u16 = 0x0002;
    pub const BLOB: u16 = 0x0003;
    pub const BOOLEAN: u16 = 0x0004;
    pub const COUNTER: u16 = 0x0005;
    pub const DECIMAL: u16 = 0x0006;
    pub const DOUBLE: u16 = 0x0007;
    pub const FLOAT: u16 = 0x0008;
    pub const INT: u16 = 0x0009;
    pub const TIMESTAMP: u16 = 0x000B;
    pub const UUID: u16 = 0x000C;
    pub const VARCHAR: u16 = 0x000D;
    pub const VARINT: u16 = 0x000E;
    pub const TIMEUUID: u16 = 0x000F;
    pub const INET: u16 = 0x0010;
    pub const DATE: u16 = 0x0011;
    pub const TIME: u16 = 0x0012;
    pub const SMALLINT: u16 = 0x0013;
    pub const TINYINT: u16 = 0x0014;
    pub const DURATION: u16 = 0x0015;
    pub const LIST: u16 = 0x0020;
    pub const MAP: u16 = 0x0021;
    pub const SET: u16 = 0x0022;
    pub const UDT: u16 = 0x0030;
    pub const TUPLE: u16 = 0x0031;
}

/// A column's CQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Custom(String),
    Ascii,
    Bigint,
    Blob,
    Boolean,
    Counter,
    Decimal,
    Double,
    Float,
    Int,
    Timestamp,
    Uuid,
    Varchar,
    Varint,
    Timeuuid,
    Inet,
    Date,
    Time,
    Smallint,
    Tinyint,
    Duration,
    List(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Set(Box<DataType>),
    Udt {
        keyspace: String,
        name: String,
        fields: Vec<(String, DataType)>,
    },
    Tuple(Vec<DataType>),
}

impl DataType {
    fn id(&self) -> u16 {
        match self {
            Self::Custom(_) => ids::CUSTOM,
            Self::Ascii => ids::ASCII,
            Self::Bigint => ids::BIGINT,
            Self::Blob => ids::BLOB,
            Self::Boolean => ids::BOOLEAN,
            Self::Counter => ids::COUNTER,
            Self::Decimal => ids::DECIMAL,
            Self::Double => ids::DOUBLE,
            Self::Float => ids::FLOAT,
            Self::Int => ids::INT,
            Self::Timestamp => ids::TIMESTAMP,
            Self::Uuid => ids::UUID,
            Self::Varchar => ids::VARCHAR,
            Self::Varint => ids::VARINT,
            Self::Timeuuid => ids::TIMEUUID,
            Self::Inet => ids::INET,
            Self::Date => ids::DATE,
            Self::Time => ids::TIME,
            Self::Smallint => ids::SMALLINT,
            Self::Tinyint => ids::TINYINT,
            Self::Duration => ids::DURATION,
            Self::List(_) => ids::LIST,
            Self::Map(_, _) => ids::MAP,
            Self::Set(_) => ids::SET,
            Self::Udt { .. } => ids::UDT,
            Self::Tuple(_) => ids::TUPLE,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        primitive::write_short(self.id(), buf);
        match self {
            Self::Custom(class) => primitive::write_string(class, buf)?,
            Self::List(element) | Self::Set(element) => element.encode(buf)?,
            Self::Map(key, value) => {
                key.encode(buf)?;
                value.encode(buf)?;
            }
            Self::Udt {
                keyspace,
                name,
                fields,
            } => {
                primitive::write_string(keyspace, buf)?;
                primitive::write_string(name, buf)?;
                primitive::write_short(fields.len() as u16, buf);
                for (field_name, field_type) in fields {
                    primitive::write_string(field_name, buf)?;
                    field_type.encode(buf)?;
                }
            }
            Self::Tuple(elements) => {
                primitive::write_short(elements.len() as u16, buf);
                for element in elements {
                    element.encode(buf)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub fn encoded_length(&self) -> usize {
        2 + match self {
            Self::Custom(class) => primitive::length_of_string(class),
            Self::List(element) | Self::Set(element) => element.encoded_length(),
            Self::Map(key, value) => key.encoded_length() + value.encoded_length(),
            Self::Udt {
                keyspace,
                name,
                fields,
            } => {
                primitive::length_of_string(keyspace)
                    + primitive::length_of_string(name)
                    + 2
                    + fields
                        .iter()
                        .map(|(field_name, field_type)| {
                            primitive::length_of_string(field_name) + field_type.encoded_length()
                        })
                        .sum::<usize>()
            }
            Self::Tuple(elements) => {
                2 + elements
                    .iter()
                    .map(DataType::encoded_length)
                    .sum::<usize>()
            }
            _ => 0,
        }
    }

    pub fn decode(buf: &mut Bytes, version: ProtocolVersion) -> Result<Self> {
        let id = primitive::read_short(buf)?;
        Ok(match id {
            ids::CUSTOM => Self::Custom(primitive::read_string(buf)?),
            ids::ASCII => Self::Ascii,
            ids::BIGINT => Self::Bigint,
            ids::BLOB => Self::Blob,
            ids::BOOLEAN => Self::Boolean,
            ids::COUNTER => Self::Counter,
            ids::DECIMAL => Self::Decimal,
            ids::DOUBLE => Self::Double,
            ids::FLOAT => Self::Float,
            ids::INT => Self::Int,
            ids::TIMESTAMP => Self::Timestamp,
            ids::UUID => Self::Uuid,
            ids::VARCHAR => Self::Varchar,
            ids::VARINT => Self::Varint,
            ids::TIMEUUID => Self::Timeuuid,
            ids::INET => Self::Inet,
            ids::DATE => Self::Date,
            ids::TIME => Self::Time,
            ids::SMALLINT => Self::Smallint,
            ids::TINYINT => Self::Tinyint,
            ids::DURATION => Self::Duration,
            ids::LIST => Self::List(Box::new(Self::decode(buf, version)?)),
            ids::MAP => Self::Map(
                Box::new(Self::decode(buf, version)?),
                Box::new(Self::decode(buf, version)?),
            ),
            ids::SET => Self::Set(Box::new(Self::decode(buf, version)?)),
            ids::UDT => {
                let keyspace = primitive::read_string(buf)?;
                let name = primitive::read_string(buf)?;
                let count = primitive::read_short(buf)? as usize;
                let mut fields = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let field_name = primitive::read_string(buf)?;
                    let field_type = Self::decode(buf, version)?;
                    fields.push((field_name, field_type));
                }
                Self::Udt {
                    keyspace,
                    name,
                    fields,
                }
            }
            ids::TUPLE => {
                let count = primitive::read_short(buf)? as usize;
                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(Self::decode(buf, version)?);
                }
                Self::Tuple(elements)
            }
            other => {
                return Err(FrameError::malformed(
                    Opcode::Result,
                    format!("unknown type option 0x{:04x}", other),
                ))
            }
        })
    }
}
