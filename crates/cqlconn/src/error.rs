use cqlwire::StreamId;
use thiserror::Error;

/// Why an individual in-flight request ended without a terminal frame.
///
/// Kept separate from [`ConnectionError`] so it can be cloned into every
/// waiter on the request.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    #[error("request timed out waiting for a response")]
    TimedOut,
    #[error("too many pending response frames")]
    TooManyPending,
    #[error("connection closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] cqlframe::FrameError),
    #[error(transparent)]
    Auth(#[from] cqlauth::AuthError),
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout {
        addr: std::net::SocketAddr,
        timeout: std::time::Duration,
    },
    #[error("handshake failed: unexpected {got} in state {state}")]
    UnexpectedHandshakeMessage { state: &'static str, got: String },
    #[error("authentication rejected by server: {0}")]
    AuthenticationRejected(String),
    #[error("server requires authentication but no credentials were configured")]
    MissingCredentials,
    #[error("no stream id available")]
    NoStreamId,
    #[error("stream id {0} is already in flight")]
    DuplicateStreamId(StreamId),
    #[error("in-flight table is full ({0} requests)")]
    InFlightTableFull(usize),
    #[error("outbound queue is full, frame not enqueued")]
    EnqueueFailed,
    #[error("connection is closed")]
    Closed,
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error("server reported fatal error 0x{code:04x}: {message}")]
    FatalServerError { code: i32, message: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
