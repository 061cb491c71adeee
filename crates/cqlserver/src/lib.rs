//! Reference server endpoint for the Cassandra/DSE native protocol.
//!
//! The server accepts connections, runs each through an ordered chain of
//! request handlers, and ships a small library of standard handlers
//! (handshake, heartbeat, keyspace, register, system tables, prepared
//! statements) that compose into a functional mock node for driver testing.

pub mod connection;
pub mod error;
pub mod handlers;
pub mod server;

pub use connection::ServerConnection;
pub use error::{Result, ServerError};
pub use handlers::{
    CompositeHandler, HandlerContext, HandshakeHandler, HeartbeatHandler, Outbound,
    PreparedStatementHandler, RawRequestHandler, RegisterHandler, RequestHandler,
    SetKeyspaceHandler, SystemTablesHandler,
};
pub use server::{Server, ServerState};

use cqlauth::Credentials;
use cqlframe::message::CodecRegistry;
use cqlwire::version::CompressionAlgorithm;
use std::sync::Arc;
use std::time::Duration;

/// Server behavior knobs.
#[derive(Clone)]
pub struct ServerConfig {
    /// Cap on concurrently accepted connections; more are refused.
    pub max_connections: usize,
    /// How long `accept_any` / `accept_specific` wait.
    pub accept_timeout: Duration,
    /// Connections silent for this long are closed.
    pub idle_timeout: Duration,
    /// Sizes each connection's outbound response queue.
    pub max_in_flight: usize,
    /// When set, the handshake demands authentication against these.
    pub credentials: Option<Credentials>,
    /// Compression the server speaks (a client requesting something else in
    /// STARTUP will fail its first compressed frame).
    pub compression: CompressionAlgorithm,
    pub request_handlers: Vec<Arc<dyn RequestHandler>>,
    pub raw_request_handlers: Vec<Arc<dyn RawRequestHandler>>,
    pub codec_registry: Arc<CodecRegistry>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 128,
            accept_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            max_in_flight: 1024,
            credentials: None,
            compression: CompressionAlgorithm::None,
            request_handlers: Vec::new(),
            raw_request_handlers: Vec::new(),
            codec_registry: Arc::new(CodecRegistry::new()),
        }
    }
}

impl ServerConfig {
    /// The standard handler chain of a functional mock node: handshake,
    /// heartbeat, keyspace switching, event registration, system tables,
    /// prepared statements.
    pub fn with_standard_handlers(cluster_name: &str, datacenter: &str) -> Self {
        Self {
            request_handlers: vec![
                Arc::new(HandshakeHandler::new()),
                Arc::new(HeartbeatHandler),
                Arc::new(SetKeyspaceHandler::new(|keyspace| {
                    tracing::debug!("keyspace set to {}", keyspace);
                })),
                Arc::new(RegisterHandler),
                Arc::new(SystemTablesHandler::new(cluster_name, datacenter)),
                Arc::new(PreparedStatementHandler::new()),
            ],
            ..Default::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn with_handlers(mut self, handlers: Vec<Arc<dyn RequestHandler>>) -> Self {
        self.request_handlers = handlers;
        self
    }

    pub(crate) fn outbound_queue_depth(&self) -> usize {
        self.max_in_flight.max(1)
    }
}
