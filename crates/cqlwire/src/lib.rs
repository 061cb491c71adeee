//! Wire primitives for the Cassandra/DSE native protocol.
//!
//! This crate holds the typed readers and writers for every `[x]` notation
//! primitive the protocol defines, the protocol-version and opcode
//! vocabulary shared by the higher layers, and the stream-id codec.
//! All reads and writes go through `bytes::Buf`/`bytes::BufMut` and return
//! an explicit `Result`; nothing here panics on malformed input.

pub mod consistency;
pub mod error;
pub mod opcode;
pub mod primitive;
pub mod streamid;
pub mod version;

pub use consistency::Consistency;
pub use error::{Result, WireError};
pub use opcode::Opcode;
pub use primitive::{Inet, Value};
pub use streamid::StreamId;
pub use version::ProtocolVersion;
