//! Request-handler chain.
//!
//! Every inbound request walks the raw-handler list, then the decoded
//! handler list, in registration order; the first non-`None` response wins
//! and is written back on the request's stream id. Handlers are instantiated
//! once per server and reused across connections and requests, so all
//! per-connection state lives in the [`HandlerContext`] each connection
//! allocates per handler.

pub mod handshake;
pub mod heartbeat;
pub mod keyspace;
pub mod prepared;
pub mod register;
pub mod system_tables;

pub use handshake::HandshakeHandler;
pub use heartbeat::HeartbeatHandler;
pub use keyspace::SetKeyspaceHandler;
pub use prepared::PreparedStatementHandler;
pub use register::RegisterHandler;
pub use system_tables::SystemTablesHandler;

use cqlauth::Credentials;
use cqlframe::{Frame, RawFrame};
use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Frames queued for the writer task, decoded or pre-encoded.
#[derive(Debug)]
pub enum Outbound {
    Frame(Frame),
    Raw(RawFrame),
}

/// Per-connection, per-handler state container.
///
/// Handlers keep state across invocations here (e.g. the handshake phase)
/// instead of in closure captures. The context also exposes the connection's
/// outbound queue so a handler can push additional response frames beyond
/// its return value (continuous paging, events).
pub struct HandlerContext {
    peer_addr: SocketAddr,
    credentials: Option<Credentials>,
    outbound: mpsc::Sender<Outbound>,
    attributes: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl HandlerContext {
    pub(crate) fn new(
        peer_addr: SocketAddr,
        credentials: Option<Credentials>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            peer_addr,
            credentials,
            outbound,
            attributes: RwLock::new(HashMap::new()),
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Credentials the server was configured with, if any.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Queues an extra response frame ahead of (or instead of) the handler's
    /// return value.
    pub async fn push(&self, frame: Frame) -> bool {
        self.outbound.send(Outbound::Frame(frame)).await.is_ok()
    }

    pub fn insert<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.attributes
            .write()
            .expect("handler context poisoned")
            .insert(key.to_string(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.attributes
            .read()
            .expect("handler context poisoned")
            .get(key)
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
    }

    pub fn remove(&self, key: &str) {
        self.attributes
            .write()
            .expect("handler context poisoned")
            .remove(key);
    }
}

/// A handler producing decoded response frames.
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Returns the response for `request`, or `None` to pass it to the next
    /// handler in the chain.
    async fn handle(&self, request: &Frame, ctx: &HandlerContext) -> Option<Frame>;
}

/// A handler producing pre-encoded response frames; consulted before the
/// decoded handlers.
#[async_trait::async_trait]
pub trait RawRequestHandler: Send + Sync {
    async fn handle(&self, request: &Frame, ctx: &HandlerContext) -> Option<RawFrame>;
}

/// Delegates to child handlers in order; first response wins.
pub struct CompositeHandler {
    children: Vec<Arc<dyn RequestHandler>>,
}

impl CompositeHandler {
    pub fn new(children: Vec<Arc<dyn RequestHandler>>) -> Self {
        Self { children }
    }
}

#[async_trait::async_trait]
impl RequestHandler for CompositeHandler {
    async fn handle(&self, request: &Frame, ctx: &HandlerContext) -> Option<Frame> {
        for child in &self.children {
            if let Some(response) = child.handle(request, ctx).await {
                return Some(response);
            }
        }
        None
    }
}

/// Builds an ERROR response on the request's stream id.
pub(crate) fn error_frame(request: &Frame, code: i32, message: impl Into<String>) -> Frame {
    Frame::new(
        request.header.version,
        request.header.stream_id,
        cqlframe::Message::Error(cqlframe::message::ErrorBody::new(code, message)),
    )
}

/// Builds a response frame mirroring the request's version and stream id.
pub(crate) fn respond(request: &Frame, message: cqlframe::Message) -> Frame {
    Frame::new(request.header.version, request.header.stream_id, message)
}
