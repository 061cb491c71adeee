//! `USE <keyspace>` interception.

use crate::handlers::{respond, HandlerContext, RequestHandler};
use cqlframe::message::{Message, ResultBody};
use cqlframe::Frame;
use std::sync::Arc;

type KeyspaceCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Matches `USE <ks>` queries (case-insensitive, whitespace-normalized),
/// invokes the callback and answers with a SetKeyspace result.
pub struct SetKeyspaceHandler {
    callback: KeyspaceCallback,
}

impl SetKeyspaceHandler {
    pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// Extracts the keyspace from a `USE` statement, or `None` when the
    /// query is something else.
    fn parse_use(query: &str) -> Option<&str> {
        let trimmed = query.trim().trim_end_matches(';').trim_end();
        let mut words = trimmed.split_whitespace();
        if !words.next()?.eq_ignore_ascii_case("USE") {
            return None;
        }
        let keyspace = words.next()?;
        if words.next().is_some() {
            return None;
        }
        Some(keyspace.trim_matches('"'))
    }
}

#[async_trait::async_trait]
impl RequestHandler for SetKeyspaceHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        let Message::Query(query) = &request.message else {
            return None;
        };
        let keyspace = Self::parse_use(&query.query)?;
        (self.callback)(keyspace);
        Some(respond(
            request,
            Message::Result(ResultBody::SetKeyspace(keyspace.to_string())),
        ))
    }
}
