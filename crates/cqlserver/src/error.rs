use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] cqlframe::FrameError),
    #[error(transparent)]
    Connection(#[from] cqlconn::ConnectionError),
    #[error("server is {0}, expected {1}")]
    WrongState(&'static str, &'static str),
    #[error("accept timed out after {0:?}")]
    AcceptTimeout(std::time::Duration),
    #[error("connection table full ({0} connections)")]
    TooManyConnections(usize),
    #[error("server closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ServerError>;
