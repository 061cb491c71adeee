use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("unknown authenticator class: {0}")]
    UnknownAuthenticator(String),
    #[error("unexpected SASL challenge: {0:?}")]
    UnexpectedChallenge(Vec<u8>),
    #[error("malformed PLAIN credentials")]
    MalformedCredentials,
    #[error("authentication failed: {0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
