//! QUERY body and the query-parameter block shared with EXECUTE.

use crate::error::{FrameError, Result};
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::primitive::{self, Value};
use cqlwire::{Consistency, Opcode, ProtocolVersion};
use std::collections::HashMap;

bitflags::bitflags! {
    /// Query-parameter flags. A single byte before v5; `[int]` on v5 and the
    /// DSE versions, which is where the DSE-only high bits live.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueryFlags: u32 {
        const VALUES = 0x0000_0001;
        const SKIP_METADATA = 0x0000_0002;
        const PAGE_SIZE = 0x0000_0004;
        const PAGING_STATE = 0x0000_0008;
        const SERIAL_CONSISTENCY = 0x0000_0010;
        const DEFAULT_TIMESTAMP = 0x0000_0020;
        const VALUE_NAMES = 0x0000_0040;
        const WITH_KEYSPACE = 0x0000_0080;
        const NOW_IN_SECONDS = 0x0000_0100;
        const DSE_PAGE_SIZE_BYTES = 0x4000_0000;
        const DSE_CONTINUOUS_PAGING = 0x8000_0000;
    }
}

/// DSE continuous-paging options attached to QUERY/EXECUTE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousPagingOptions {
    pub max_pages: i32,
    pub pages_per_second: i32,
    /// DSE v2 only: how many pages the client is ready to receive.
    pub next_pages: Option<i32>,
}

/// The parameter block following the query string or prepared-statement id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryParameters {
    pub consistency: Consistency,
    pub positional_values: Vec<Value>,
    pub named_values: HashMap<String, Value>,
    pub skip_metadata: bool,
    pub page_size: Option<i32>,
    /// DSE: interpret `page_size` as bytes instead of rows.
    pub page_size_in_bytes: bool,
    pub paging_state: Option<Bytes>,
    pub serial_consistency: Option<Consistency>,
    pub default_timestamp: Option<i64>,
    pub keyspace: Option<String>,
    pub now_in_seconds: Option<i32>,
    pub continuous_paging: Option<ContinuousPagingOptions>,
}

impl QueryParameters {
    fn flags(&self) -> QueryFlags {
        let mut flags = QueryFlags::empty();
        if !self.positional_values.is_empty() {
            flags |= QueryFlags::VALUES;
        }
        if !self.named_values.is_empty() {
            flags |= QueryFlags::VALUES | QueryFlags::VALUE_NAMES;
        }
        if self.skip_metadata {
            flags |= QueryFlags::SKIP_METADATA;
        }
        if self.page_size.is_some() {
            flags |= QueryFlags::PAGE_SIZE;
        }
        if self.page_size_in_bytes {
            flags |= QueryFlags::DSE_PAGE_SIZE_BYTES;
        }
        if self.paging_state.is_some() {
            flags |= QueryFlags::PAGING_STATE;
        }
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
        if self.continuous_paging.is_some() {
            flags |= QueryFlags::DSE_CONTINUOUS_PAGING;
        }
        flags
    }

    fn check_version(&self, version: ProtocolVersion) -> Result<()> {
        if !self.positional_values.is_empty() && !self.named_values.is_empty() {
            return Err(FrameError::malformed(
                Opcode::Query,
                "positional and named values are mutually exclusive",
            ));
        }
        if self.keyspace.is_some() && version != ProtocolVersion::V5 {
            return Err(FrameError::UnsupportedFeature {
                feature: "per-query keyspace",
                version,
            });
        }
        if self.now_in_seconds.is_some() && version != ProtocolVersion::V5 {
            return Err(FrameError::UnsupportedFeature {
                feature: "now-in-seconds",
                version,
            });
        }
        if self.continuous_paging.is_some() && !version.supports_continuous_paging() {
            return Err(FrameError::UnsupportedFeature {
                feature: "continuous paging",
                version,
            });
        }
        if self.page_size_in_bytes && !version.is_dse() {
            return Err(FrameError::UnsupportedFeature {
                feature: "page size in bytes",
                version,
            });
        }
        Ok(())
    }

    pub fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<()> {
        self.check_version(version)?;
        let flags = self.flags();
        primitive::write_consistency(self.consistency, buf);
        if version.uses_int_query_flags() {
            primitive::write_int(flags.bits() as i32, buf);
        } else {
            primitive::write_byte(flags.bits() as u8, buf);
        }
        if flags.contains(QueryFlags::VALUE_NAMES) {
            primitive::write_short(self.named_values.len() as u16, buf);
            for (name, value) in &self.named_values {
                primitive::write_string(name, buf)?;
                primitive::write_value(value, buf)?;
            }
        } else if flags.contains(QueryFlags::VALUES) {
            primitive::write_short(self.positional_values.len() as u16, buf);
            for value in &self.positional_values {
                primitive::write_value(value, buf)?;
            }
        }
        if let Some(page_size) = self.page_size {
            primitive::write_int(page_size, buf);
        }
        if let Some(paging_state) = &self.paging_state {
            primitive::write_bytes(Some(paging_state), buf)?;
        }
        if let Some(serial) = self.serial_consistency {
            primitive::write_consistency(serial, buf);
        }
        if let Some(timestamp) = self.default_timestamp {
            primitive::write_long(timestamp, buf);
        }
        if let Some(keyspace) = &self.keyspace {
            primitive::write_string(keyspace, buf)?;
        }
        if let Some(now) = self.now_in_seconds {
            primitive::write_int(now, buf);
        }
        if let Some(paging) = &self.continuous_paging {
            primitive::write_int(paging.max_pages, buf);
            primitive::write_int(paging.pages_per_second, buf);
            if version == ProtocolVersion::Dse2 {
                primitive::write_int(paging.next_pages.unwrap_or(0), buf);
            }
        }
        Ok(())
    }

    pub fn encoded_length(&self, version: ProtocolVersion) -> Result<usize> {
        self.check_version(version)?;
        let flags = self.flags();
        let mut length =
            primitive::LENGTH_OF_CONSISTENCY + if version.uses_int_query_flags() { 4 } else { 1 };
        if flags.contains(QueryFlags::VALUE_NAMES) {
            length += 2;
            for (name, value) in &self.named_values {
                length += primitive::length_of_string(name) + primitive::length_of_value(value);
            }
        } else if flags.contains(QueryFlags::VALUES) {
            length += 2;
            for value in &self.positional_values {
                length += primitive::length_of_value(value);
            }
        }
        if self.page_size.is_some() {
            length += 4;
        }
        if let Some(paging_state) = &self.paging_state {
            length += primitive::length_of_bytes(Some(paging_state));
        }
        if self.serial_consistency.is_some() {
            length += primitive::LENGTH_OF_CONSISTENCY;
        }
        if self.default_timestamp.is_some() {
            length += 8;
        }
        if let Some(keyspace) = &self.keyspace {
            length += primitive::length_of_string(keyspace);
        }
        if self.now_in_seconds.is_some() {
            length += 4;
        }
        if self.continuous_paging.is_some() {
            length += 8;
            if version == ProtocolVersion::Dse2 {
                length += 4;
            }
        }
        Ok(length)
    }

    pub fn decode(buf: &mut Bytes, version: ProtocolVersion) -> Result<Self> {
        let consistency = primitive::read_consistency(buf)?;
        let raw_flags = if version.uses_int_query_flags() {
            primitive::read_int(buf)? as u32
        } else {
            u32::from(primitive::read_byte(buf)?)
        };
        let flags = QueryFlags::from_bits_truncate(raw_flags);

        let mut params = QueryParameters {
            consistency,
            skip_metadata: flags.contains(QueryFlags::SKIP_METADATA),
            page_size_in_bytes: flags.contains(QueryFlags::DSE_PAGE_SIZE_BYTES),
            ..Default::default()
        };
        if flags.contains(QueryFlags::VALUES) {
            let count = primitive::read_short(buf)? as usize;
            if flags.contains(QueryFlags::VALUE_NAMES) {
                for _ in 0..count {
                    let name = primitive::read_string(buf)?;
                    let value = primitive::read_value(buf)?;
                    params.named_values.insert(name, value);
                }
            } else {
                for _ in 0..count {
                    params.positional_values.push(primitive::read_value(buf)?);
                }
            }
        }
        if flags.contains(QueryFlags::PAGE_SIZE) {
            params.page_size = Some(primitive::read_int(buf)?);
        }
        if flags.contains(QueryFlags::PAGING_STATE) {
            params.paging_state = primitive::read_bytes(buf)?;
        }
        if flags.contains(QueryFlags::SERIAL_CONSISTENCY) {
            params.serial_consistency = Some(primitive::read_consistency(buf)?);
        }
        if flags.contains(QueryFlags::DEFAULT_TIMESTAMP) {
            params.default_timestamp = Some(primitive::read_long(buf)?);
        }
        if flags.contains(QueryFlags::WITH_KEYSPACE) {
            params.keyspace = Some(primitive::read_string(buf)?);
        }
        if flags.contains(QueryFlags::NOW_IN_SECONDS) {
            params.now_in_seconds = Some(primitive::read_int(buf)?);
        }
        if flags.contains(QueryFlags::DSE_CONTINUOUS_PAGING) {
            let max_pages = primitive::read_int(buf)?;
            let pages_per_second = primitive::read_int(buf)?;
            let next_pages = if version == ProtocolVersion::Dse2 {
                Some(primitive::read_int(buf)?)
            } else {
                None
            };
            params.continuous_paging = Some(ContinuousPagingOptions {
                max_pages,
                pages_per_second,
                next_pages,
            });
        }
        params.check_version(version)?;
        Ok(params)
    }
}

/// QUERY: a `[long string]` plus the parameter block.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub query: String,
    pub params: QueryParameters,
}

impl Query {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: QueryParameters::default(),
        }
    }

    pub fn with_params(mut self, params: QueryParameters) -> Self {
        self.params = params;
        self
    }
}

pub struct QueryCodec;

impl MessageCodec for QueryCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Query
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Query(query) => {
                primitive::write_long_string(&query.query, buf)?;
                query.params.encode(buf, version)
            }
            other => Err(wrong_kind(Opcode::Query, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Query(query) => Ok(primitive::length_of_long_string(&query.query)
                + query.params.encoded_length(version)?),
            other => Err(wrong_kind(Opcode::Query, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let query = primitive::read_long_string(buf)?;
        let params = QueryParameters::decode(buf, version)?;
        Ok(Message::Query(Query { query, params }))
    }
}
