//! Client-side handshake state machine.
//!
//! ```text
//! START -> send STARTUP -> recv
//!     READY        -> done
//!     AUTHENTICATE -> send AUTH_RESPONSE(initial) -> recv
//!         AUTH_SUCCESS   -> done
//!         AUTH_CHALLENGE -> send AUTH_RESPONSE(evaluate) -> recv ...
//!         other          -> fail
//!     other        -> fail
//! ```
//!
//! The switch to modern framing happens the moment READY or AUTHENTICATE is
//! processed at a version that supports it; everything after (including the
//! AUTH_RESPONSE exchange) is already segment-framed. No other frames may be
//! in flight during the handshake, which is what makes the switch safe; the
//! connection enforces that by completing the handshake before its I/O
//! tasks start.

use crate::error::{ConnectionError, Result};
use crate::io::{FrameReader, FrameWriter, FramingState};
use cqlauth::Authenticator;
use cqlframe::message::{error_codes, AuthResponse, Message, Startup};
use cqlframe::Frame;
use cqlwire::version::CompressionAlgorithm;
use cqlwire::ProtocolVersion;

pub const DRIVER_NAME: &str = "cqlconn";
pub const DRIVER_VERSION: &str = env!("CARGO_PKG_VERSION");

fn unexpected(state: &'static str, message: &Message) -> ConnectionError {
    ConnectionError::UnexpectedHandshakeMessage {
        state,
        got: message.opcode().to_string(),
    }
}

fn maybe_enable_modern(version: ProtocolVersion, framing: &FramingState) {
    if version.supports_modern_framing() {
        framing.enable_modern();
    }
}

fn auth_response(version: ProtocolVersion, token: bytes::Bytes) -> Frame {
    Frame::new(
        version,
        0,
        Message::AuthResponse(AuthResponse { token: Some(token) }),
    )
}

pub(crate) async fn perform_client_handshake(
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    version: ProtocolVersion,
    compression: CompressionAlgorithm,
    authenticator: Option<&dyn Authenticator>,
    framing: &FramingState,
) -> Result<()> {
    let startup = Startup::new(compression).with_driver(DRIVER_NAME, DRIVER_VERSION);
    writer
        .write_frame(&Frame::new(version, 0, Message::Startup(startup)))
        .await?;

    let response = reader.read_frame().await?;
    match response.message {
        Message::Ready => {
            maybe_enable_modern(version, framing);
            tracing::debug!("handshake complete (no authentication)");
            Ok(())
        }
        Message::Authenticate(request) => {
            // Safe to switch here: the server sent AUTHENTICATE legacy-framed
            // and reads everything after it as segments.
            maybe_enable_modern(version, framing);
            let authenticator = authenticator.ok_or(ConnectionError::MissingCredentials)?;
            tracing::debug!("server requests {} authentication", request.authenticator);
            let token = authenticator.initial_response(&request.authenticator)?;
            writer.write_frame(&auth_response(version, token)).await?;

            loop {
                let response = reader.read_frame().await?;
                match response.message {
                    Message::AuthSuccess(_) => {
                        tracing::debug!("handshake complete (authenticated)");
                        return Ok(());
                    }
                    Message::AuthChallenge(challenge) => {
                        let token = authenticator
                            .evaluate_challenge(challenge.token.as_deref().unwrap_or_default())?;
                        writer.write_frame(&auth_response(version, token)).await?;
                    }
                    Message::Error(body) if body.code == error_codes::AUTHENTICATION_ERROR => {
                        return Err(ConnectionError::AuthenticationRejected(body.message));
                    }
                    other => return Err(unexpected("AUTH_RESPONSE_SENT", &other)),
                }
            }
        }
        Message::Error(body) if body.code == error_codes::AUTHENTICATION_ERROR => {
            Err(ConnectionError::AuthenticationRejected(body.message))
        }
        other => Err(unexpected("STARTUP_SENT", &other)),
    }
}
