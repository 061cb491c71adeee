//! PLAIN credentials and their SASL marshalling.

use crate::error::{AuthError, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// A username/password pair.
///
/// `Debug` deliberately omits the password so credentials can travel through
/// config structs that derive `Debug` without leaking into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Serializes to the SASL PLAIN form `\0 username \0 password`.
    pub fn marshal(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(2 + self.username.len() + self.password.len());
        buf.put_u8(0);
        buf.put_slice(self.username.as_bytes());
        buf.put_u8(0);
        buf.put_slice(self.password.as_bytes());
        buf.freeze()
    }

    /// Parses a SASL PLAIN token back into credentials (server side).
    pub fn unmarshal(token: &[u8]) -> Result<Self> {
        let mut parts = token.split(|&b| b == 0);
        // Leading NUL yields an empty authzid part.
        let authzid = parts.next().ok_or(AuthError::MalformedCredentials)?;
        if !authzid.is_empty() {
            return Err(AuthError::MalformedCredentials);
        }
        let username = parts.next().ok_or(AuthError::MalformedCredentials)?;
        let password = parts.next().ok_or(AuthError::MalformedCredentials)?;
        if parts.next().is_some() {
            return Err(AuthError::MalformedCredentials);
        }
        Ok(Self {
            username: String::from_utf8(username.to_vec())
                .map_err(|_| AuthError::MalformedCredentials)?,
            password: String::from_utf8(password.to_vec())
                .map_err(|_| AuthError::MalformedCredentials)?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}
