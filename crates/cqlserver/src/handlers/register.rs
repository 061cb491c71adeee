//! REGISTER -> READY.

use crate::handlers::{respond, HandlerContext, RequestHandler};
use cqlframe::message::Message;
use cqlframe::Frame;

#[derive(Default)]
pub struct RegisterHandler;

#[async_trait::async_trait]
impl RequestHandler for RegisterHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        match &request.message {
            Message::Register(register) => {
                tracing::debug!(
                    "client {} registered for events: {:?}",
                    request.header.stream_id,
                    register.event_types
                );
                Some(respond(request, Message::Ready))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Outbound;
    use cqlframe::message::Register;
    use cqlwire::ProtocolVersion;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_register_gets_ready() {
        let (tx, _rx) = mpsc::channel::<Outbound>(1);
        let ctx = HandlerContext::new("127.0.0.1:1".parse().unwrap(), None, tx);
        let request = Frame::new(
            ProtocolVersion::V4,
            2,
            Message::Register(Register::all()),
        );
        let response = RegisterHandler.handle(&request, &ctx).await.unwrap();
        assert_eq!(response.message, Message::Ready);
    }
}
