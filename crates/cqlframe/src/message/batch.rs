//! BATCH body.

use crate::error::{FrameError, Result};
use crate::message::query::QueryFlags;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::primitive::{self, Value};
use cqlwire::{Consistency, Opcode, ProtocolVersion};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, num_enum::TryFromPrimitive, num_enum::IntoPrimitive,
)]
#[repr(u8)]
pub enum BatchType {
    Logged = 0,
    Unlogged = 1,
    Counter = 2,
}

impl Default for BatchType {
    fn default() -> Self {
        Self::Logged
    }
}

/// One child of a batch: an inline query string or a prepared-statement id,
/// plus its positional values.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchQuery {
    pub kind: BatchQueryKind,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchQueryKind {
    Query(String),
    Prepared(Bytes),
}

impl BatchQuery {
    pub fn query(query: impl Into<String>) -> Self {
        Self {
            kind: BatchQueryKind::Query(query.into()),
            values: Vec::new(),
        }
    }

    pub fn prepared(id: impl Into<Bytes>) -> Self {
        Self {
            kind: BatchQueryKind::Prepared(id.into()),
            values: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub batch_type: BatchType,
    pub queries: Vec<BatchQuery>,
    pub consistency: Consistency,
    pub serial_consistency: Option<Consistency>,
    pub default_timestamp: Option<i64>,
    pub keyspace: Option<String>,
    pub now_in_seconds: Option<i32>,
}

impl Batch {
    fn flags(&self) -> QueryFlags {
        let mut flags = QueryFlags::empty();
        if self.serial_consistency.is_some() {
            flags |= QueryFlags::SERIAL_CONSISTENCY;
        }
        if self.default_timestamp.is_some() {
            flags |= QueryFlags::DEFAULT_TIMESTAMP;
        }
        if self.keyspace.is_some() {
            flags |= QueryFlags::WITH_KEYSPACE;
        }
        if self.now_in_seconds.is_some() {
            flags |= QueryFlags::NOW_IN_SECONDS;
        }
        flags
    }

    fn check_version(&self, version: ProtocolVersion) -> Result<()> {
        if self.keyspace.is_some() && version != ProtocolVersion::V5 {
            return Err(FrameError::UnsupportedFeature {
                feature: "per-batch keyspace",
                version,
            });
        }
        if self.now_in_seconds.is_some() && version != ProtocolVersion::V5 {
            return Err(FrameError::UnsupportedFeature {
                feature: "now-in-seconds",
                version,
            });
        }
        Ok(())
    }
}

pub struct BatchCodec;

impl MessageCodec for BatchCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Batch
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Batch(batch) => {
                batch.check_version(version)?;
                primitive::write_byte(batch.batch_type.into(), buf);
                primitive::write_short(batch.queries.len() as u16, buf);
                for child in &batch.queries {
                    match &child.kind {
                        BatchQueryKind::Query(query) => {
                            primitive::write_byte(0, buf);
                            primitive::write_long_string(query, buf)?;
                        }
                        BatchQueryKind::Prepared(id) => {
                            primitive::write_byte(1, buf);
                            primitive::write_short_bytes(id, buf)?;
                        }
                    }
                    primitive::write_short(child.values.len() as u16, buf);
                    for value in &child.values {
                        primitive::write_value(value, buf)?;
                    }
                }
                primitive::write_consistency(batch.consistency, buf);
                let flags = batch.flags();
                if version.uses_int_query_flags() {
                    primitive::write_int(flags.bits() as i32, buf);
                } else {
                    primitive::write_byte(flags.bits() as u8, buf);
                }
                if let Some(serial) = batch.serial_consistency {
                    primitive::write_consistency(serial, buf);
                }
                if let Some(timestamp) = batch.default_timestamp {
                    primitive::write_long(timestamp, buf);
                }
                if let Some(keyspace) = &batch.keyspace {
                    primitive::write_string(keyspace, buf)?;
                }
                if let Some(now) = batch.now_in_seconds {
                    primitive::write_int(now, buf);
                }
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Batch, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Batch(batch) => {
                batch.check_version(version)?;
                let mut length = 1 + 2;
                for child in &batch.queries {
                    length += 1;
                    length += match &child.kind {
                        BatchQueryKind::Query(query) => primitive::length_of_long_string(query),
                        BatchQueryKind::Prepared(id) => primitive::length_of_short_bytes(id),
                    };
                    length += 2;
                    for value in &child.values {
                        length += primitive::length_of_value(value);
                    }
                }
                length += primitive::LENGTH_OF_CONSISTENCY;
                length += if version.uses_int_query_flags() { 4 } else { 1 };
                if batch.serial_consistency.is_some() {
                    length += primitive::LENGTH_OF_CONSISTENCY;
                }
                if batch.default_timestamp.is_some() {
                    length += 8;
                }
                if let Some(keyspace) = &batch.keyspace {
                    length += primitive::length_of_string(keyspace);
                }
                if batch.now_in_seconds.is_some() {
                    length += 4;
                }
                Ok(length)
            }
            other => Err(wrong_kind(Opcode::Batch, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let raw_type = primitive::read_byte(buf)?;
        let batch_type = BatchType::try_from(raw_type).map_err(|_| {
            FrameError::malformed(Opcode::Batch, format!("unknown batch type {}", raw_type))
        })?;
        let count = primitive::read_short(buf)? as usize;
        let mut queries = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let kind = match primitive::read_byte(buf)? {
                0 => BatchQueryKind::Query(primitive::read_long_string(buf)?),
                1 => BatchQueryKind::Prepared(primitive::read_short_bytes(buf)?),
                other => {
                    return Err(FrameError::malformed(
                        Opcode::Batch,
                        format!("unknown batch child kind {}", other),
                    ))
                }
            };
            let value_count = primitive::read_short(buf)? as usize;
            let mut values = Vec::with_capacity(value_count.min(1024));
            for _ in 0..value_count {
                values.push(primitive::read_value(buf)?);
            }
            queries.push(BatchQuery { kind, values });
        }
        let consistency = primitive::read_consistency(buf)?;
        let raw_flags = if version.uses_int_query_flags() {
            primitive::read_int(buf)? as u32
        } else {
            u32::from(primitive::read_byte(buf)?)
        };
        let flags = QueryFlags::from_bits_truncate(raw_flags);
        let serial_consistency = if flags.contains(QueryFlags::SERIAL_CONSISTENCY) {
            Some(primitive::read_consistency(buf)?)
        } else {
            None
        };
        let default_timestamp = if flags.contains(QueryFlags::DEFAULT_TIMESTAMP) {
            Some(primitive::read_long(buf)?)
        } else {
            None
        };
        let keyspace = if flags.contains(QueryFlags::WITH_KEYSPACE) {
            Some(primitive::read_string(buf)?)
        } else {
            None
        };
        let now_in_seconds = if flags.contains(QueryFlags::NOW_IN_SECONDS) {
            Some(primitive::read_int(buf)?)
        } else {
            None
        };
        Ok(Message::Batch(Batch {
            batch_type,
            queries,
            consistency,
            serial_consistency,
            default_timestamp,
            keyspace,
            now_in_seconds,
        }))
    }
}
