//! SASL authentication for the native protocol handshake.
//!
//! The handshake layer asks an [`Authenticator`] for the payload of each
//! AUTH_RESPONSE frame without knowing the mechanism in use. The only
//! mechanism shipped here is PLAIN, in its two server flavors (the Cassandra
//! password authenticator and the DSE authenticator with its mechanism
//! negotiation round).

pub mod authenticator;
pub mod credentials;
pub mod error;

pub use authenticator::{Authenticator, PlainTextAuthenticator};
pub use credentials::Credentials;
pub use error::{AuthError, Result};

/// Class name announced by Cassandra's built-in password authenticator.
pub const PASSWORD_AUTHENTICATOR: &str = "org.apache.cassandra.auth.PasswordAuthenticator";

/// Class name announced by the DSE unified authenticator.
pub const DSE_AUTHENTICATOR: &str = "com.datastax.bdp.cassandra.auth.DseAuthenticator";

/// SASL mechanism name sent to the DSE authenticator.
pub const PLAIN_MECHANISM: &str = "PLAIN";

/// Challenge the DSE authenticator sends once the mechanism is accepted.
pub const PLAIN_START_CHALLENGE: &[u8] = b"PLAIN-START";
