//! Stream-id codec.
//!
//! Stream ids are 2 signed big-endian bytes on every version this library
//! speaks (the 1-byte form died with protocol v2). Negative ids belong to
//! server-initiated events; id 0 is legal on the wire but reserved at the
//! public API as the "assign one for me" sentinel.

use crate::error::{Result, WireError};
use crate::version::ProtocolVersion;
use bytes::{Buf, BufMut};

pub type StreamId = i16;

/// Sentinel callers pass to request a managed id from the pool.
pub const MANAGED_STREAM_ID: StreamId = 0;

pub fn read_stream_id(buf: &mut impl Buf, version: ProtocolVersion) -> Result<StreamId> {
    let needed = length_of_stream_id(version);
    if buf.remaining() < needed {
        return Err(WireError::UnexpectedEof {
            what: "stream id",
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(buf.get_i16())
}

/// Writes a stream id, rejecting values outside the version's wire range.
///
/// The id arrives as `i32` so that range errors are reportable instead of
/// silently truncated by a cast at the call site.
pub fn write_stream_id(id: i32, buf: &mut impl BufMut, version: ProtocolVersion) -> Result<()> {
    if id < i16::MIN as i32 || id > i16::MAX as i32 {
        return Err(WireError::StreamIdOutOfRange { id, version });
    }
    buf.put_i16(id as i16);
    Ok(())
}

pub fn length_of_stream_id(_version: ProtocolVersion) -> usize {
    2
}
