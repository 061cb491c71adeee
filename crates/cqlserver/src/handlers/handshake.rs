//! Server-side handshake state machine, realized as a request handler.
//!
//! OPTIONS requests may interleave before STARTUP (they belong to the
//! heartbeat handler). With no credentials configured, STARTUP gets READY
//! straight away. With credentials, STARTUP gets AUTHENTICATE and the
//! handler walks the SASL exchange, comparing the presented PLAIN
//! credentials byte-for-byte.

use crate::handlers::{error_frame, respond, HandlerContext, RequestHandler};
use cqlauth::{
    Credentials, DSE_AUTHENTICATOR, PASSWORD_AUTHENTICATOR, PLAIN_MECHANISM,
    PLAIN_START_CHALLENGE,
};
use cqlframe::message::{error_codes, AuthChallenge, AuthSuccess, Authenticate, Message};
use cqlframe::Frame;
use bytes::Bytes;

const PHASE_KEY: &str = "handshake.phase";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for STARTUP.
    Initial,
    /// AUTHENTICATE sent; for DSE, the mechanism announcement is still due.
    AwaitingMechanism,
    /// Waiting for the AUTH_RESPONSE carrying credentials.
    AwaitingCredentials,
    /// Handshake finished (successfully or not).
    Done,
}

/// The server half of the protocol handshake.
///
/// `authenticator_class` picks the flavor announced to clients: the
/// Cassandra password authenticator expects credentials in the first
/// AUTH_RESPONSE, the DSE authenticator negotiates the PLAIN mechanism with
/// an extra challenge round first.
pub struct HandshakeHandler {
    authenticator_class: &'static str,
}

impl Default for HandshakeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeHandler {
    pub fn new() -> Self {
        Self {
            authenticator_class: PASSWORD_AUTHENTICATOR,
        }
    }

    pub fn dse() -> Self {
        Self {
            authenticator_class: DSE_AUTHENTICATOR,
        }
    }

    fn phase(ctx: &HandlerContext) -> Phase {
        ctx.get::<Phase>(PHASE_KEY)
            .map(|phase| *phase)
            .unwrap_or(Phase::Initial)
    }

    fn set_phase(ctx: &HandlerContext, phase: Phase) {
        ctx.insert(PHASE_KEY, phase);
    }

    fn check_credentials(
        &self,
        request: &Frame,
        ctx: &HandlerContext,
        token: Option<&Bytes>,
        expected: &Credentials,
    ) -> Frame {
        let presented: &[u8] = token.map(|token| token.as_ref()).unwrap_or_default();
        if presented == &expected.marshal()[..] {
            Self::set_phase(ctx, Phase::Done);
            respond(request, Message::AuthSuccess(AuthSuccess::default()))
        } else {
            tracing::warn!("authentication failure from {}", ctx.peer_addr());
            Self::set_phase(ctx, Phase::Done);
            error_frame(
                request,
                error_codes::AUTHENTICATION_ERROR,
                "invalid credentials",
            )
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for HandshakeHandler {
    async fn handle(&self, request: &Frame, ctx: &HandlerContext) -> Option<Frame> {
        match (&request.message, Self::phase(ctx)) {
            (Message::Startup(_), Phase::Initial) => match ctx.credentials() {
                None => {
                    Self::set_phase(ctx, Phase::Done);
                    Some(respond(request, Message::Ready))
                }
                Some(_) => {
                    let next = if self.authenticator_class == DSE_AUTHENTICATOR {
                        Phase::AwaitingMechanism
                    } else {
                        Phase::AwaitingCredentials
                    };
                    Self::set_phase(ctx, next);
                    Some(respond(
                        request,
                        Message::Authenticate(Authenticate::new(self.authenticator_class)),
                    ))
                }
            },
            (Message::AuthResponse(response), Phase::AwaitingMechanism) => {
                let mechanism = response.token.as_deref().unwrap_or_default();
                if mechanism == PLAIN_MECHANISM.as_bytes() {
                    Self::set_phase(ctx, Phase::AwaitingCredentials);
                    Some(respond(
                        request,
                        Message::AuthChallenge(AuthChallenge {
                            token: Some(Bytes::from_static(PLAIN_START_CHALLENGE)),
                        }),
                    ))
                } else {
                    Self::set_phase(ctx, Phase::Done);
                    Some(error_frame(
                        request,
                        error_codes::AUTHENTICATION_ERROR,
                        "unsupported SASL mechanism",
                    ))
                }
            }
            (Message::AuthResponse(response), Phase::AwaitingCredentials) => {
                let expected = ctx.credentials()?.clone();
                Some(self.check_credentials(request, ctx, response.token.as_ref(), &expected))
            }
            (Message::Startup(_), _) => Some(error_frame(
                request,
                error_codes::PROTOCOL_ERROR,
                "STARTUP after handshake",
            )),
            _ => None,
        }
    }
}
