//! PREPARE / EXECUTE handling with caller-synthesized rows.

use crate::handlers::{respond, HandlerContext, RequestHandler};
use bytes::Bytes;
use cqlframe::message::result::{Prepared, PreparedMetadata, ResultBody, Rows, RowsMetadata};
use cqlframe::message::{ErrorBody, Execute, Message};
use cqlframe::Frame;
use cqlwire::ProtocolVersion;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

type RowsFactory = Arc<dyn Fn(&Execute) -> Rows + Send + Sync>;

/// Records which query strings have been prepared; PREPARE is answered with
/// a Prepared result whose id is the query-string bytes, EXECUTE with
/// synthesized rows for known ids and an Unprepared error otherwise.
pub struct PreparedStatementHandler {
    prepared: Mutex<HashSet<Bytes>>,
    rows_factory: Option<RowsFactory>,
}

impl Default for PreparedStatementHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl PreparedStatementHandler {
    pub fn new() -> Self {
        Self {
            prepared: Mutex::new(HashSet::new()),
            rows_factory: None,
        }
    }

    /// Synthesize EXECUTE responses through `factory` instead of Void rows.
    pub fn with_rows(factory: impl Fn(&Execute) -> Rows + Send + Sync + 'static) -> Self {
        Self {
            prepared: Mutex::new(HashSet::new()),
            rows_factory: Some(Arc::new(factory)),
        }
    }

    pub fn is_prepared(&self, query: &str) -> bool {
        self.prepared
            .lock()
            .expect("prepared set poisoned")
            .contains(query.as_bytes())
    }

    fn prepared_result(version: ProtocolVersion, id: Bytes) -> ResultBody {
        ResultBody::Prepared(Prepared {
            result_metadata_id: (version == ProtocolVersion::V5)
                .then(|| Bytes::from_static(b"metadata-v1")),
            id,
            variables_metadata: PreparedMetadata::default(),
            result_metadata: RowsMetadata::default(),
        })
    }
}

#[async_trait::async_trait]
impl RequestHandler for PreparedStatementHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        match &request.message {
            Message::Prepare(prepare) => {
                let id = Bytes::copy_from_slice(prepare.query.as_bytes());
                self.prepared
                    .lock()
                    .expect("prepared set poisoned")
                    .insert(id.clone());
                Some(respond(
                    request,
                    Message::Result(Self::prepared_result(request.header.version, id)),
                ))
            }
            Message::Execute(execute) => {
                let known = self
                    .prepared
                    .lock()
                    .expect("prepared set poisoned")
                    .contains(&execute.query_id);
                if !known {
                    return Some(respond(
                        request,
                        Message::Error(ErrorBody::unprepared(
                            "unprepared statement",
                            execute.query_id.clone(),
                        )),
                    ));
                }
                let body = match &self.rows_factory {
                    Some(factory) => ResultBody::Rows(factory(execute)),
                    None => ResultBody::Void,
                };
                Some(respond(request, Message::Result(body)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Outbound;
    use cqlframe::message::{error_codes, ErrorDetail, Prepare};
    use tokio::sync::mpsc;

    fn context() -> HandlerContext {
        let (tx, _rx) = mpsc::channel::<Outbound>(1);
        HandlerContext::new("127.0.0.1:1".parse().unwrap(), None, tx)
    }

    fn prepare_frame(cql: &str) -> Frame {
        Frame::new(ProtocolVersion::V4, 1, Message::Prepare(Prepare::new(cql)))
    }

    fn execute_frame(id: &[u8]) -> Frame {
        Frame::new(
            ProtocolVersion::V4,
            2,
            Message::Execute(Execute::new(Bytes::copy_from_slice(id))),
        )
    }

    #[tokio::test]
    async fn test_prepare_then_execute() {
        let handler = PreparedStatementHandler::new();
        let cql = "SELECT * FROM t WHERE pk = ?";

        let response = handler.handle(&prepare_frame(cql), &context()).await.unwrap();
        match &response.message {
            Message::Result(ResultBody::Prepared(prepared)) => {
                assert_eq!(&prepared.id[..], cql.as_bytes());
            }
            other => panic!("expected Prepared, got {:?}", other),
        }
        assert!(handler.is_prepared(cql));

        let response = handler
            .handle(&execute_frame(cql.as_bytes()), &context())
            .await
            .unwrap();
        assert_eq!(response.message, Message::Result(ResultBody::Void));
    }

    #[tokio::test]
    async fn test_execute_unknown_id_gets_unprepared() {
        let handler = PreparedStatementHandler::new();
        let response = handler
            .handle(&execute_frame(b"never prepared"), &context())
            .await
            .unwrap();
        match &response.message {
            Message::Error(body) => {
                assert_eq!(body.code, error_codes::UNPREPARED);
                assert!(matches!(body.detail, ErrorDetail::Unprepared { .. }));
            }
            other => panic!("expected ERROR, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rows_factory_used() {
        let handler = PreparedStatementHandler::with_rows(|_| Rows {
            metadata: RowsMetadata {
                column_count: 1,
                ..Default::default()
            },
            data: vec![vec![Some(Bytes::from_static(&[1, 2, 3, 4]))]],
        });
        handler
            .handle(&prepare_frame("SELECT x"), &context())
            .await
            .unwrap();
        let response = handler
            .handle(&execute_frame(b"SELECT x"), &context())
            .await
            .unwrap();
        match &response.message {
            Message::Result(ResultBody::Rows(rows)) => assert_eq!(rows.data.len(), 1),
            other => panic!("expected Rows, got {:?}", other),
        }
    }
}
