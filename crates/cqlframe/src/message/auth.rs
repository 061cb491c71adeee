//! Authentication bodies: AUTHENTICATE, AUTH_RESPONSE, AUTH_CHALLENGE,
//! AUTH_SUCCESS.

use crate::error::Result;
use crate::message::{wrong_kind, Message, MessageCodec};
use bytes::{Bytes, BytesMut};
use cqlwire::{primitive, Opcode, ProtocolVersion};

/// AUTHENTICATE: the authenticator class the server wants to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticate {
    pub authenticator: String,
}

impl Authenticate {
    pub fn new(authenticator: impl Into<String>) -> Self {
        Self {
            authenticator: authenticator.into(),
        }
    }
}

/// AUTH_RESPONSE: a `[bytes]` SASL token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthResponse {
    pub token: Option<Bytes>,
}

/// AUTH_CHALLENGE: a `[bytes]` SASL token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthChallenge {
    pub token: Option<Bytes>,
}

/// AUTH_SUCCESS: a final `[bytes]` SASL token, usually null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthSuccess {
    pub token: Option<Bytes>,
}

pub struct AuthenticateCodec;

impl MessageCodec for AuthenticateCodec {
    fn opcode(&self) -> Opcode {
        Opcode::Authenticate
    }

    fn encode(&self, message: &Message, buf: &mut BytesMut, _: ProtocolVersion) -> Result<()> {
        match message {
            Message::Authenticate(body) => {
                primitive::write_string(&body.authenticator, buf)?;
                Ok(())
            }
            other => Err(wrong_kind(Opcode::Authenticate, other)),
        }
    }

    fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
        match message {
            Message::Authenticate(body) => Ok(primitive::length_of_string(&body.authenticator)),
            other => Err(wrong_kind(Opcode::Authenticate, other)),
        }
    }

    fn decode(&self, buf: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
        let authenticator = primitive::read_string(buf)?;
        Ok(Message::Authenticate(Authenticate { authenticator }))
    }
}

/// The three token-only bodies share their layout; one macro per codec keeps
/// the registry monomorphic.
macro_rules! token_codec {
    ($codec:ident, $variant:ident, $body:ident, $opcode:expr) => {
        pub struct $codec;

        impl MessageCodec for $codec {
            fn opcode(&self) -> Opcode {
                $opcode
            }

            fn encode(
                &self,
                message: &Message,
                buf: &mut BytesMut,
                _: ProtocolVersion,
            ) -> Result<()> {
                match message {
                    Message::$variant(body) => {
                        primitive::write_bytes(body.token.as_deref(), buf)?;
                        Ok(())
                    }
                    other => Err(wrong_kind($opcode, other)),
                }
            }

            fn encoded_length(&self, message: &Message, _: ProtocolVersion) -> Result<usize> {
                match message {
                    Message::$variant(body) => {
                        Ok(primitive::length_of_bytes(body.token.as_deref()))
                    }
                    other => Err(wrong_kind($opcode, other)),
                }
            }

            fn decode(&self, buf: &mut Bytes, _: ProtocolVersion) -> Result<Message> {
                let token = primitive::read_bytes(buf)?;
                Ok(Message::$variant($body { token }))
            }
        }
    };
}

token_codec!(
    AuthResponseCodec,
    AuthResponse,
    AuthResponse,
    Opcode::AuthResponse
);
token_codec!(
    AuthChallengeCodec,
    AuthChallenge,
    AuthChallenge,
    Opcode::AuthChallenge
);
token_codec!(
    AuthSuccessCodec,
    AuthSuccess,
    AuthSuccess,
    Opcode::AuthSuccess
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authenticate_round_trip() {
        let message = Message::Authenticate(Authenticate::new(
            "org.apache.cassandra.auth.PasswordAuthenticator",
        ));
        let mut buf = BytesMut::new();
        AuthenticateCodec
            .encode(&message, &mut buf, ProtocolVersion::V4)
            .unwrap();
        let mut frozen = buf.freeze();
        assert_eq!(
            AuthenticateCodec
                .decode(&mut frozen, ProtocolVersion::V4)
                .unwrap(),
            message
        );
    }

    #[test]
    fn test_token_bodies_round_trip() {
        let message = Message::AuthResponse(AuthResponse {
            token: Some(Bytes::from_static(b"\0cassandra\0cassandra")),
        });
        let mut buf = BytesMut::new();
        AuthResponseCodec
            .encode(&message, &mut buf, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(
            buf.len(),
            AuthResponseCodec
                .encoded_length(&message, ProtocolVersion::V4)
                .unwrap()
        );
        let mut frozen = buf.freeze();
        assert_eq!(
            AuthResponseCodec
                .decode(&mut frozen, ProtocolVersion::V4)
                .unwrap(),
            message
        );
    }

    #[test]
    fn test_null_token() {
        let message = Message::AuthSuccess(AuthSuccess::default());
        let mut buf = BytesMut::new();
        AuthSuccessCodec
            .encode(&message, &mut buf, ProtocolVersion::V4)
            .unwrap();
        assert_eq!(&buf[..], &(-1i32).to_be_bytes());
        let mut frozen = buf.freeze();
        assert_eq!(
            AuthSuccessCodec
                .decode(&mut frozen, ProtocolVersion::V4)
                .unwrap(),
            message
        );
    }
}
