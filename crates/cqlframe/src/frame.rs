//! Frame and raw-frame models.
//!
//! A [`Frame`] carries a fully decoded message plus the body prelude
//! (tracing id, custom payload, warnings); a [`RawFrame`] keeps the body as
//! opaque bytes for pass-through use. Both share [`FrameHeader`].

use crate::message::Message;
use bytes::Bytes;
use cqlwire::{Opcode, ProtocolVersion, StreamId};
use std::collections::HashMap;
use uuid::Uuid;

bitflags::bitflags! {
    /// Byte 1 of the frame header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderFlags: u8 {
        const COMPRESSED = 0x01;
        const TRACING = 0x02;
        const CUSTOM_PAYLOAD = 0x04;
        const WARNING = 0x08;
        const USE_BETA = 0x10;
    }
}

/// The fixed 9-byte header. `body_length` is only meaningful on decoded
/// headers and raw frames; the full-frame encoder recomputes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: ProtocolVersion,
    pub flags: HeaderFlags,
    pub stream_id: StreamId,
    pub opcode: Opcode,
    pub body_length: i32,
}

impl FrameHeader {
    /// Total header length on the wire.
    pub const LENGTH: usize = 9;

    pub fn is_response(&self) -> bool {
        self.opcode.is_response()
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub header: FrameHeader,
    /// On requests: ask the server to trace this request.
    pub tracing_requested: bool,
    /// On responses: the tracing session id, when tracing happened.
    pub tracing_id: Option<Uuid>,
    pub custom_payload: Option<HashMap<String, Option<Bytes>>>,
    pub warnings: Vec<String>,
    pub message: Message,
}

impl Frame {
    /// Builds a frame around `message`, deriving the content flags the same
    /// way the codec does so that encode/decode round-trips compare equal.
    pub fn new(version: ProtocolVersion, stream_id: StreamId, message: Message) -> Self {
        let opcode = message.opcode();
        let mut flags = HeaderFlags::empty();
        if version.is_beta() {
            flags |= HeaderFlags::USE_BETA;
        }
        Self {
            header: FrameHeader {
                version,
                flags,
                stream_id,
                opcode,
                body_length: 0,
            },
            tracing_requested: false,
            tracing_id: None,
            custom_payload: None,
            warnings: Vec::new(),
            message,
        }
    }

    pub fn with_tracing_requested(mut self) -> Self {
        self.tracing_requested = true;
        self.header.flags |= HeaderFlags::TRACING;
        self
    }

    pub fn with_tracing_id(mut self, id: Uuid) -> Self {
        self.tracing_id = Some(id);
        self.header.flags |= HeaderFlags::TRACING;
        self
    }

    pub fn with_custom_payload(mut self, payload: HashMap<String, Option<Bytes>>) -> Self {
        self.custom_payload = Some(payload);
        self.header.flags |= HeaderFlags::CUSTOM_PAYLOAD;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        if !warnings.is_empty() {
            self.header.flags |= HeaderFlags::WARNING;
        }
        self.warnings = warnings;
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.message.opcode()
    }

    pub fn is_response(&self) -> bool {
        self.message.opcode().is_response()
    }

    pub fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }
}

/// A frame whose body was left undecoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub header: FrameHeader,
    pub body: Bytes,
}

impl RawFrame {
    pub fn opcode(&self) -> Opcode {
        self.header.opcode
    }

    pub fn stream_id(&self) -> StreamId {
        self.header.stream_id
    }
}
