//! OPTIONS -> SUPPORTED.

use crate::handlers::{respond, HandlerContext, RequestHandler};
use cqlframe::message::{Message, Supported};
use cqlframe::Frame;

/// Answers OPTIONS heartbeats with a static SUPPORTED map.
#[derive(Default)]
pub struct HeartbeatHandler;

#[async_trait::async_trait]
impl RequestHandler for HeartbeatHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        match request.message {
            Message::Options => Some(respond(
                request,
                Message::Supported(Supported::standard()),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Outbound;
    use cqlframe::message::Query;
    use cqlwire::ProtocolVersion;
    use tokio::sync::mpsc;

    fn context() -> HandlerContext {
        let (tx, _rx) = mpsc::channel::<Outbound>(1);
        HandlerContext::new("127.0.0.1:1".parse().unwrap(), None, tx)
    }

    #[tokio::test]
    async fn test_options_answered() {
        let request = Frame::new(ProtocolVersion::V4, 5, Message::Options);
        let response = HeartbeatHandler.handle(&request, &context()).await.unwrap();
        assert_eq!(response.header.stream_id, 5);
        assert!(matches!(response.message, Message::Supported(_)));
    }

    #[tokio::test]
    async fn test_other_requests_passed_on() {
        let request = Frame::new(
            ProtocolVersion::V4,
            5,
            Message::Query(Query::new("SELECT 1")),
        );
        assert!(HeartbeatHandler.handle(&request, &context()).await.is_none());
    }
}
