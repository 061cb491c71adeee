//! RESULT body and its five kinds.

pub mod datatype;

pub use datatype::DataType;

use crate::error::{FrameError, Result};
use crate::message::event::SchemaChange;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

const KIND_VOID: i32 = 0x0001;
const KIND_ROWS: i32 = 0x0002;
const KIND_SET_KEYSPACE: i32 = 0x0003;
const KIND_PREPARED: i32 = 0x0004;
const KIND_SCHEMA_CHANGE: i32 = 0x0005;

bitflags::bitflags! {
    /// Rows-metadata flags. The two high bits are DSE continuous paging.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RowsMetadataFlags: u32 {
        const GLOBAL_TABLES_SPEC = 0x0000_0001;
        const HAS_MORE_PAGES = 0x0000_0002;
        const NO_METADATA = 0x0000_0004;
        const METADATA_CHANGED = 0x0000_0008;
        const CONTINUOUS_PAGING = 0x4000_0000;
        const LAST_CONTINUOUS_PAGE = 0x8000_0000;
    }
}

/// A keyspace/table pair shared by all columns of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub keyspace: String,
    pub table: String,
}

/// One column of a result set or prepared-statement variable list.
///
/// When the metadata carries a global table spec the per-column keyspace and
/// table are not on the wire; the decoder copies them from the global spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub keyspace: String,
    pub table: String,
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSpec {
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            name: name.into(),
            data_type,
        }
    }
}

/// Metadata heading a Rows result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowsMetadata {
    pub column_count: i32,
    pub paging_state: Option<Bytes>,
    /// v5, present when the prepared result metadata changed.
    pub new_metadata_id: Option<Bytes>,
    /// DSE continuous paging: 1-based page number.
    pub continuous_page_number: Option<i32>,
    /// DSE continuous paging: set on the final page.
    pub last_continuous_page: bool,
    pub global_table_spec: Option<TableSpec>,
    /// Empty when the sender set NO_METADATA.
    pub columns: Vec<ColumnSpec>,
}

impl RowsMetadata {
    fn flags(&self) -> RowsMetadataFlags {
        let mut flags = RowsMetadataFlags::empty();
        if self.global_table_spec.is_some() {
            flags |= RowsMetadataFlags::GLOBAL_TABLES_SPEC;
        }
        if self.paging_state.is_some() {
            flags |= RowsMetadataFlags::HAS_MORE_PAGES;
        }
        if self.columns.is_empty() && self.column_count > 0 {
            flags |= RowsMetadataFlags::NO_METADATA;
        }
        if self.new_metadata_id.is_some() {
            flags |= RowsMetadataFlags::METADATA_CHANGED;
        }
        if self.continuous_page_number.is_some() {
            flags |= RowsMetadataFlags::CONTINUOUS_PAGING;
        }
        if self.last_continuous_page {
            flags |= RowsMetadataFlags::LAST_CONTINUOUS_PAGE;
        }
        flags
    }

    fn check_version(&self, version: ProtocolVersion) -> Result<()> {
        if self.new_metadata_id.is_some() && version != ProtocolVersion::V5 {
            return Err(FrameError::UnsupportedFeature {
                feature: "changed result metadata id",
                version,
            });
        }
        if (self.continuous_page_number.is_some() || self.last_continuous_page)
            && !version.supports_continuous_paging()
        {
            return Err(FrameError::UnsupportedFeature {
                feature: "continuous paging",
                version,
            });
        }
        Ok(())
    }

    pub fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<()> {
        self.check_version(version)?;
        let flags = self.flags();
        primitive::write_int(flags.bits() as i32, buf);
        primitive::write_int(self.column_count, buf);
        if let Some(paging_state) = &self.paging_state {
            primitive::write_bytes(Some(paging_state), buf)?;
        }
        if let Some(metadata_id) = &self.new_metadata_id {
            primitive::write_short_bytes(metadata_id, buf)?;
        }
        if let Some(page_number) = self.continuous_page_number {
            primitive::write_int(page_number, buf);
        }
        if !flags.contains(RowsMetadataFlags::NO_METADATA) {
            if let Some(spec) = &self.global_table_spec {
                primitive::write_string(&spec.keyspace, buf)?;
                primitive::write_string(&spec.table, buf)?;
            }
            for column in &self.columns {
                if self.global_table_spec.is_none() {
                    primitive::write_string(&column.keyspace, buf)?;
                    primitive::write_string(&column.table, buf)?;
                }
                primitive::write_string(&column.name, buf)?;
                column.data_type.encode(buf)?;
            }
        }
        Ok(())
    }

    pub fn encoded_length(&self, version: ProtocolVersion) -> Result<usize> {
        self.check_version(version)?;
        let flags = self.flags();
        let mut length = 8;
        if let Some(paging_state) = &self.paging_state {
            length += primitive::length_of_bytes(Some(paging_state));
        }
        if let Some(metadata_id) = &self.new_metadata_id {
            length += primitive::length_of_short_bytes(metadata_id);
        }
        if self.continuous_page_number.is_some() {
            length += 4;
        }
        if !flags.contains(RowsMetadataFlags::NO_METADATA) {
            if let Some(spec) = &self.global_table_spec {
                length += primitive::length_of_string(&spec.keyspace)
                    + primitive::length_of_string(&spec.table);
            }
            for column in &self.columns {
                if self.global_table_spec.is_none() {
                    length += primitive::length_of_string(&column.keyspace)
                        + primitive::length_of_string(&column.table);
                }
                length += primitive::length_of_string(&column.name)
                    + column.data_type.encoded_length();
            }
        }
        Ok(length)
    }

    pub fn decode(buf: &mut Bytes, version: ProtocolVersion) -> Result<Self> {
        let flags = RowsMetadataFlags::from_bits_truncate(primitive::read_int(buf)? as u32);
        let column_count = primitive::read_int(buf)?;
        if column_count < 0 {
            return Err(FrameError::malformed(
                Opcode::Result,
                format!("negative column count {}", column_count),
            ));
        }
        let paging_state = if flags.contains(RowsMetadataFlags::HAS_MORE_PAGES) {
            primitive::read_bytes(buf)?
        } else {
            None
        };
        let new_metadata_id = if flags.contains(RowsMetadataFlags::METADATA_CHANGED) {
            Some(primitive::read_short_bytes(buf)?)
        } else {
            None
        };
        let continuous_page_number = if flags.contains(RowsMetadataFlags::CONTINUOUS_PAGING) {
            Some(primitive::read_int(buf)?)
        } else {
            None
        };
        let last_continuous_page = flags.contains(RowsMetadataFlags::LAST_CONTINUOUS_PAGE);

        let mut global_table_spec = None;
        let mut columns = Vec::new();
        if !flags.contains(RowsMetadataFlags::NO_METADATA) {
            if flags.contains(RowsMetadataFlags::GLOBAL_TABLES_SPEC) {
                global_table_spec = Some(TableSpec {
                    keyspace: primitive::read_string(buf)?,
                    table: primitive::read_string(buf)?,
                });
            }
            columns.reserve(column_count.min(1024) as usize);
            for _ in 0..column_count {
                let (keyspace, table) = match &global_table_spec {
                    Some(spec) => (spec.keyspace.clone(), spec.table.clone()),
                    None => (primitive::read_string(buf)?, primitive::read_string(buf)?),
                };
                let name = primitive::read_string(buf)?;
                let data_type = DataType::decode(buf, version)?;
                columns.push(ColumnSpec {
                    keyspace,
                    table,
                    name,
                    data_type,
                });
            }
        }
        Ok(Self {
            column_count,
            paging_state,
            new_metadata_id,
            continuous_page_number,
            last_continuous_page,
            global_table_spec,
            columns,
        })
    }
}

/// A Rows result: metadata plus row data as raw cell blobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rows {
    pub metadata: RowsMetadata,
    pub data: Vec<Vec<Option<Bytes>>>,
}

impl Rows {
    /// Whether this is an intermediate continuous-paging page, i.e. more
    /// pages with the same stream id will follow.
    pub fn has_more_continuous_pages(&self) -> bool {
        self.metadata.continuous_page_number.is_some() && !self.metadata.last_continuous_page
    }
}

/// Variable metadata of a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreparedMetadata {
    pub column_count: i32,
    /// v4+: indices of the partition-key columns among the variables.
    pub pk_indices: Vec<u16>,
    pub global_table_spec: Option<TableSpec>,
    pub columns: Vec<ColumnSpec>,
}

impl PreparedMetadata {
    fn flags(&self) -> RowsMetadataFlags {
        if self.global_table_spec.is_some() {
            RowsMetadataFlags::GLOBAL_TABLES_SPEC
        } else {
            RowsMetadataFlags::empty()
        }
    }

    fn encode(&self, buf: &mut BytesMut, version: ProtocolVersion) -> Result<()> {
        primitive::write_int(self.flags().bits() as i32, buf);
        primitive::write_int(self.column_count, buf);
        if version != ProtocolVersion::V3 {
            primitive::write_int(self.pk_indices.len() as i32, buf);
            for index in &self.pk_indices {
                primitive::write_short(*index, buf);
            }
        }
        if let Some(spec) = &self.global_table_spec {
            primitive::write_string(&spec.keyspace, buf)?;
            primitive::write_string(&spec.table, buf)?;
        }
        for column in &self.columns {
            if self.global_table_spec.is_none() {
                primitive::write_string(&column.keyspace, buf)?;
                primitive::write_string(&column.table, buf)?;
            }
            primitive::write_string(&column.name, buf)?;
            column.data_type.encode(buf)?;
        }
        Ok(())
    }

    fn encoded_length(&self, version: ProtocolVersion) -> usize {
        let mut length = 8;
        if version != ProtocolVersion::V3 {
            length += 4 + 2 * self.pk_indices.len();
        }
        if let Some(spec) = &self.global_table_spec {
            length += primitive::length_of_string(&spec.keyspace)
                + primitive::length_of_string(&spec.table);
        }
        for column in &self.columns {
            if self.global_table_spec.is_none() {
                length += primitive::length_of_string(&column.keyspace)
                    + primitive::length_of_string(&column.table);
            }
            length += primitive::length_of_string(&column.name) + column.data_type.encoded_length();
        }
        length
    }

    fn decode(buf: &mut Bytes, version: ProtocolVersion) -> Result<Self> {
        let flags = RowsMetadataFlags::from_bits_truncate(primitive::read_int(buf)? as u32);
        let column_count = primitive::read_int(buf)?;
        let mut pk_indices = Vec::new();
        if version != ProtocolVersion::V3 {
            let pk_count = primitive::read_int(buf)?;
            pk_indices.reserve(pk_count.max(0).min(1024) as usize);
            for _ in 0..pk_count {
                pk_indices.push(primitive::read_short(buf)?);
            }
        }
        let global_table_spec = if flags.contains(RowsMetadataFlags::GLOBAL_TABLES_SPEC) {
            Some(TableSpec {
                keyspace: primitive::read_string(buf)?,
                table: primitive::read_string(buf)?,
            })
        } else {
            None
        };
        let mut columns = Vec::with_capacity(column_count.max(0).min(1024) as usize);
        for _ in 0..column_count {
            let (keyspace, table) = match &global_table_spec {
                Some(spec) => (spec.keyspace.clone(), spec.table.clone()),
                None => (primitive::read_string(buf)?, primitive::read_string(buf)?),
            };
            let name = primitive::read_string(buf)?;
            let data_type = DataType::decode(buf, version)?;
            columns.push(ColumnSpec {
                keyspace,
                table,
                name,
                data_type,
            });
        }
        Ok(Self {
            column_count,
            pk_indices,
            global_table_spec,
            columns,
        })
    }
}

/// A Prepared result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub id: Bytes,
    /// v5 only.
    pub result_metadata_id: Option<Bytes>,
    pub variables_metadata: PreparedMetadata,
    pub result_metadata: RowsMetadata,
}

/// The RESULT kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultBody {
    Void,
    Rows(Rows),
    SetKeyspace(String),
    Prepared(Prepared),
    SchemaChange(SchemaChange),
}

pub struct ResultCodec;

impl MessageCodec for ResultCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Result
    }

    fn encode(
        &self,
        message: &Message,
        buf: &mut BytesMut,
        version: ProtocolVersion,
    ) -> Result<()> {
        match message {
            Message::Result(body) => match body {
                ResultBody::Void => {
                    primitive::write_int(KIND_VOID, buf);
                    Ok(())
                }
                ResultBody::Rows(rows) => {
                    primitive::write_int(KIND_ROWS, buf);
                    rows.metadata.encode(buf, version)?;
                    primitive::write_int(rows.data.len() as i32, buf);
                    for row in &rows.data {
                        for cell in row {
                            primitive::write_bytes(cell.as_deref(), buf)?;
                        }
                    }
                    Ok(())
                }
                ResultBody::SetKeyspace(keyspace) => {
                    primitive::write_int(KIND_SET_KEYSPACE, buf);
                    primitive::write_string(keyspace, buf)?;
                    Ok(())
                }
                ResultBody::Prepared(prepared) => {
                    primitive::write_int(KIND_PREPARED, buf);
                    primitive::write_short_bytes(&prepared.id, buf)?;
                    if version == ProtocolVersion::V5 {
                        let metadata_id =
                            prepared.result_metadata_id.as_ref().ok_or_else(|| {
                                FrameError::malformed(
                                    Opcode::Result,
                                    "result metadata id is mandatory on v5",
                                )
                            })?;
                        primitive::write_short_bytes(metadata_id, buf)?;
                    }
                    prepared.variables_metadata.encode(buf, version)?;
                    prepared.result_metadata.encode(buf, version)
                }
                ResultBody::SchemaChange(change) => {
                    primitive::write_int(KIND_SCHEMA_CHANGE, buf);
                    change.encode(buf, version)
                }
            },
            other => Err(wrong_kind(Opcode::Result, other)),
        }
    }

    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Result(body) => {
                let length = match body {
                    ResultBody::Void => 0,
                    ResultBody::Rows(rows) => {
                        let mut length = rows.metadata.encoded_length(version)? + 4;
                        for row in &rows.data {
                            for cell in row {
                                length += primitive::length_of_bytes(cell.as_deref());
                            }
                        }
                        length
                    }
                    ResultBody::SetKeyspace(keyspace) => primitive::length_of_string(keyspace),
                    ResultBody::Prepared(prepared) => {
                        let mut length = primitive::length_of_short_bytes(&prepared.id);
                        if version == ProtocolVersion::V5 {
                            let metadata_id =
                                prepared.result_metadata_id.as_ref().ok_or_else(|| {
                                    FrameError::malformed(
                                        Opcode::Result,
                                        "result metadata id is mandatory on v5",
                                    )
                                })?;
                            length += primitive::length_of_short_bytes(metadata_id);
                        }
                        length += prepared.variables_metadata.encoded_length(version);
                        length += prepared.result_metadata.encoded_length(version)?;
                        length
                    }
                    ResultBody::SchemaChange(change) => change.encoded_length(version),
                };
                Ok(4 + length)
            }
            other => Err(wrong_kind(Opcode::Result, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message> {
        let kind = primitive::read_int(buf)?;
        let body = match kind {
            KIND_VOID => ResultBody::Void,
            KIND_ROWS => {
                let metadata = RowsMetadata::decode(buf, version)?;
                let row_count = primitive::read_int(buf)?;
                if row_count < 0 {
                    return Err(FrameError::malformed(
                        Opcode::Result,
                        format!("negative row count {}", row_count),
                    ));
                }
                let mut data = Vec::with_capacity(row_count.min(1024) as usize);
                for _ in 0..row_count {
                    let mut row = Vec::with_capacity(metadata.column_count.min(1024) as usize);
                    for _ in 0..metadata.column_count {
                        row.push(primitive::read_bytes(buf)?);
                    }
                    data.push(row);
                }
                ResultBody::Rows(Rows { metadata, data })
            }
            KIND_SET_KEYSPACE => ResultBody::SetKeyspace(primitive::read_string(buf)?),
            KIND_PREPARED => {
                let id = primitive::read_short_bytes(buf)?;
                let result_metadata_id = if version == ProtocolVersion::V5 {
                    Some(primitive::read_short_bytes(buf)?)
                } else {
                    None
                };
                let variables_metadata = PreparedMetadata::decode(buf, version)?;
                let result_metadata = RowsMetadata::decode(buf, version)?;
                ResultBody::Prepared(Prepared {
                    id,
                    result_metadata_id,
                    variables_metadata,
                    result_metadata,
                })
            }
            KIND_SCHEMA_CHANGE => ResultBody::SchemaChange(SchemaChange::decode(buf, version)?),
            other => {
                return Err(FrameError::malformed(
                    Opcode::Result,
                    format!("unknown result kind {}", other),
                ))
            }
        };
        Ok(Message::Result(body))
    }
}
