//! Client-side authenticator abstraction.

use crate::credentials::Credentials;
use crate::error::{AuthError, Result};
use crate::{DSE_AUTHENTICATOR, PASSWORD_AUTHENTICATOR, PLAIN_MECHANISM, PLAIN_START_CHALLENGE};
use bytes::Bytes;
use std::fmt::Debug;

/// Strategy invoked by the handshake when the server requests authentication.
///
/// `initial_response` produces the payload of the first AUTH_RESPONSE, keyed
/// on the authenticator class the server announced in AUTHENTICATE;
/// `evaluate_challenge` answers each subsequent AUTH_CHALLENGE.
pub trait Authenticator: Send + Sync + Debug {
    fn initial_response(&self, authenticator_class: &str) -> Result<Bytes>;

    fn evaluate_challenge(&self, challenge: &[u8]) -> Result<Bytes>;
}

/// SASL PLAIN against either server flavor.
///
/// Cassandra's password authenticator takes the marshalled credentials in
/// the first AUTH_RESPONSE. The DSE authenticator negotiates: the first
/// response names the mechanism, and the credentials follow only after the
/// `PLAIN-START` challenge.
#[derive(Debug, Clone)]
pub struct PlainTextAuthenticator {
    credentials: Credentials,
}

impl PlainTextAuthenticator {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl Authenticator for PlainTextAuthenticator {
    fn initial_response(&self, authenticator_class: &str) -> Result<Bytes> {
        match authenticator_class {
            PASSWORD_AUTHENTICATOR => Ok(self.credentials.marshal()),
            DSE_AUTHENTICATOR => Ok(Bytes::from_static(PLAIN_MECHANISM.as_bytes())),
            other => {
                tracing::warn!("server requested unsupported authenticator {}", other);
                Err(AuthError::UnknownAuthenticator(other.to_string()))
            }
        }
    }

    fn evaluate_challenge(&self, challenge: &[u8]) -> Result<Bytes> {
        if challenge == PLAIN_START_CHALLENGE {
            Ok(self.credentials.marshal())
        } else {
            Err(AuthError::UnexpectedChallenge(challenge.to_vec()))
        }
    }
}
