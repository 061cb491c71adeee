//! Message taxonomy and the opcode-indexed codec registry.
//!
//! Every opcode has a body codec registered here. The registry is frozen at
//! construction: the defaults cover the full taxonomy, and caller-supplied
//! codecs override them (useful for proxies and protocol extensions).

pub mod auth;
pub mod batch;
pub mod error_body;
pub mod event;
pub mod execute;
pub mod prepare;
pub mod query;
pub mod register;
pub mod result;
pub mod revise;
pub mod startup;
pub mod supported;

pub use auth::{Authenticate, AuthChallenge, AuthResponse, AuthSuccess};
pub use batch::{Batch, BatchQuery, BatchType};
pub use error_body::{codes as error_codes, ErrorBody, ErrorDetail, FailureReasons, WriteType};
pub use event::{Event, SchemaChange, SchemaChangeTarget, StatusChange, TopologyChange};
pub use execute::Execute;
pub use prepare::Prepare;
pub use query::{ContinuousPagingOptions, Query, QueryFlags, QueryParameters};
pub use register::Register;
pub use result::{
    ColumnSpec, DataType, Prepared, PreparedMetadata, ResultBody, Rows, RowsMetadata,
    RowsMetadataFlags, TableSpec,
};
pub use revise::{ReviseRequest, RevisionType};
pub use startup::Startup;
pub use supported::Supported;

use crate::error::{FrameError, Result};
use bytes::{Bytes, BytesMut};
use cqlwire::{Opcode, ProtocolVersion};
use std::collections::HashMap;
use std::sync::Arc;

/// A decoded message body, one variant per opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Startup(Startup),
    Options,
    Ready,
    Authenticate(Authenticate),
    AuthResponse(AuthResponse),
    AuthChallenge(AuthChallenge),
    AuthSuccess(AuthSuccess),
    Supported(Supported),
    Query(Query),
    Prepare(Prepare),
    Execute(Execute),
    Batch(Batch),
    Register(Register),
    Event(Event),
    Error(ErrorBody),
    Result(ResultBody),
    ReviseRequest(ReviseRequest),
}

impl Message {
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::Startup(_) => Opcode::Startup,
            Self::Options => Opcode::Options,
            Self::Ready => Opcode::Ready,
            Self::Authenticate(_) => Opcode::Authenticate,
            Self::AuthResponse(_) => Opcode::AuthResponse,
            Self::AuthChallenge(_) => Opcode::AuthChallenge,
            Self::AuthSuccess(_) => Opcode::AuthSuccess,
            Self::Supported(_) => Opcode::Supported,
            Self::Query(_) => Opcode::Query,
            Self::Prepare(_) => Opcode::Prepare,
            Self::Execute(_) => Opcode::Execute,
            Self::Batch(_) => Opcode::Batch,
            Self::Register(_) => Opcode::Register,
            Self::Event(_) => Opcode::Event,
            Self::Error(_) => Opcode::Error,
            Self::Result(_) => Opcode::Result,
            Self::ReviseRequest(_) => Opcode::ReviseRequest,
        }
    }

    pub fn is_response(&self) -> bool {
        self.opcode().is_response()
    }
}

/// Body codec for one message kind.
pub trait MessageCodec: Send + Sync {
    fn opcode(&self) -> Opcode;

    fn encode(&self, message: &Message, buf: &mut BytesMut, version: ProtocolVersion)
        -> Result<()>;

    /// Encoded body length without writing, used to presize buffers.
    fn encoded_length(&self, message: &Message, version: ProtocolVersion) -> Result<usize>;

    fn decode(&self, buf: &mut Bytes, version: ProtocolVersion) -> Result<Message>;
}

/// Error helper used by every codec's `match` arm for foreign messages.
pub(crate) fn wrong_kind(expected: Opcode, message: &Message) -> FrameError {
    FrameError::WrongMessageKind {
        expected,
        actual: message.opcode(),
    }
}

/// Flat `opcode -> codec` table, frozen at construction.
pub struct CodecRegistry {
    codecs: HashMap<Opcode, Arc<dyn MessageCodec>>,
}

impl CodecRegistry {
    /// Registry with the default codec for every opcode.
    pub fn new() -> Self {
        Self::with_extras(std::iter::empty())
    }

    /// Defaults plus caller-supplied codecs; later definitions win.
    pub fn with_extras(extras: impl IntoIterator<Item = Arc<dyn MessageCodec>>) -> Self {
        let defaults: [Arc<dyn MessageCodec>; 17] = [
            Arc::new(startup::StartupCodec),
            Arc::new(startup::OptionsCodec),
            Arc::new(startup::ReadyCodec),
            Arc::new(auth::AuthenticateCodec),
            Arc::new(auth::AuthResponseCodec),
            Arc::new(auth::AuthChallengeCodec),
            Arc::new(auth::AuthSuccessCodec),
            Arc::new(supported::SupportedCodec),
            Arc::new(query::QueryCodec),
            Arc::new(prepare::PrepareCodec),
            Arc::new(execute::ExecuteCodec),
            Arc::new(batch::BatchCodec),
            Arc::new(register::RegisterCodec),
            Arc::new(event::EventCodec),
            Arc::new(error_body::ErrorCodec),
            Arc::new(result::ResultCodec),
            Arc::new(revise::ReviseRequestCodec),
        ];
        let mut codecs: HashMap<Opcode, Arc<dyn MessageCodec>> = HashMap::new();
        for codec in defaults.into_iter().chain(extras) {
            codecs.insert(codec.opcode(), codec);
        }
        Self { codecs }
    }

    pub fn get(&self, opcode: Opcode) -> Result<&Arc<dyn MessageCodec>> {
        self.codecs
            .get(&opcode)
            .ok_or(FrameError::UnsupportedOpcode(opcode.as_u8()))
    }

    pub fn contains(&self, opcode: Opcode) -> bool {
        self.codecs.contains_key(&opcode)
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_covers_every_opcode() {
        let registry = CodecRegistry::new();
        for opcode in [
            Opcode::Error,
            Opcode::Startup,
            Opcode::Ready,
            Opcode::Authenticate,
            Opcode::Options,
            Opcode::Supported,
            Opcode::Query,
            Opcode::Result,
            Opcode::Prepare,
            Opcode::Execute,
            Opcode::Register,
            Opcode::Event,
            Opcode::Batch,
            Opcode::AuthChallenge,
            Opcode::AuthResponse,
            Opcode::AuthSuccess,
            Opcode::ReviseRequest,
        ] {
            assert!(registry.contains(opcode), "missing codec for {}", opcode);
        }
    }

    #[test]
    fn test_extras_override_defaults() {
        struct NullOptionsCodec;

        impl MessageCodec for NullOptionsCodec {
            fn opcode(&self) -> Opcode {
                Opcode::Options
            }

            fn encode(&self, _: &Message, _: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
                Err(FrameError::UnsupportedOpcode(0x05))
            }

            fn encoded_length(&self, _: &Message, _: ProtocolVersion) -> Result<usize> {
                Ok(0)
            }

            fn decode(&self, _: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
                Ok(Message::Options)
            }
        }

        let registry =
            CodecRegistry::with_extras([Arc::new(NullOptionsCodec) as Arc<dyn MessageCodec>]);
        let codec = registry.get(Opcode::Options).unwrap();
        let mut buf = BytesMut::new();
        assert!(codec
            .encode(&Message::Options, &mut buf, ProtocolVersion::V4)
            .is_err());
    }
}
