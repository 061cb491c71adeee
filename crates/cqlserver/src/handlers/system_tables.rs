//! Synthetic `system.local` / `system.peers` for driver bootstrap queries.

use crate::handlers::{respond, HandlerContext, RequestHandler};
use bytes::{BufMut, Bytes, BytesMut};
use cqlframe::message::result::{ColumnSpec, DataType, ResultBody, Rows, RowsMetadata, TableSpec};
use cqlframe::message::Message;
use cqlframe::Frame;
use uuid::Uuid;

const PARTITIONER: &str = "org.apache.cassandra.dht.Murmur3Partitioner";
const RELEASE_VERSION: &str = "4.0.0";
const RACK: &str = "rack1";
/// The single token owned by the synthetic node.
const TOKEN: &str = "-9223372036854775808";

fn varchar_cell(value: &str) -> Option<Bytes> {
    Some(Bytes::copy_from_slice(value.as_bytes()))
}

fn uuid_cell(value: Uuid) -> Option<Bytes> {
    Some(Bytes::copy_from_slice(value.as_bytes()))
}

/// `set<varchar>` cell: element count then int-length-prefixed elements.
fn varchar_set_cell(values: &[&str]) -> Option<Bytes> {
    let mut buf = BytesMut::new();
    buf.put_i32(values.len() as i32);
    for value in values {
        buf.put_i32(value.len() as i32);
        buf.put_slice(value.as_bytes());
    }
    Some(buf.freeze())
}

/// Answers the bootstrap queries drivers issue against `system.local` and
/// `system.peers`, synthesizing a single-node topology.
pub struct SystemTablesHandler {
    cluster_name: String,
    datacenter: String,
    host_id: Uuid,
    schema_version: Uuid,
}

impl SystemTablesHandler {
    pub fn new(cluster_name: impl Into<String>, datacenter: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            datacenter: datacenter.into(),
            host_id: Uuid::from_u128(0x5f3c_0c25_8f1e_4a7d_9b6a_1c2d_3e4f_5061),
            schema_version: Uuid::from_u128(0xe84b_6a07_6cf3_4b1d_924e_c680_89b8_1c5e),
        }
    }

    pub fn host_id(&self) -> Uuid {
        self.host_id
    }

    fn local_rows(&self) -> Rows {
        let spec = |name, data_type| ColumnSpec::new("system", "local", name, data_type);
        Rows {
            metadata: RowsMetadata {
                column_count: 9,
                global_table_spec: Some(TableSpec {
                    keyspace: "system".to_string(),
                    table: "local".to_string(),
                }),
                columns: vec![
                    spec("key", DataType::Varchar),
                    spec("cluster_name", DataType::Varchar),
                    spec("data_center", DataType::Varchar),
                    spec("rack", DataType::Varchar),
                    spec("host_id", DataType::Uuid),
                    spec("schema_version", DataType::Uuid),
                    spec("partitioner", DataType::Varchar),
                    spec("tokens", DataType::Set(Box::new(DataType::Varchar))),
                    spec("release_version", DataType::Varchar),
                ],
                ..Default::default()
            },
            data: vec![vec![
                varchar_cell("local"),
                varchar_cell(&self.cluster_name),
                varchar_cell(&self.datacenter),
                varchar_cell(RACK),
                uuid_cell(self.host_id),
                uuid_cell(self.schema_version),
                varchar_cell(PARTITIONER),
                varchar_set_cell(&[TOKEN]),
                varchar_cell(RELEASE_VERSION),
            ]],
        }
    }

    fn peers_rows(&self) -> Rows {
        let spec = |name, data_type| ColumnSpec::new("system", "peers", name, data_type);
        Rows {
            metadata: RowsMetadata {
                column_count: 6,
                global_table_spec: Some(TableSpec {
                    keyspace: "system".to_string(),
                    table: "peers".to_string(),
                }),
                columns: vec![
                    spec("peer", DataType::Inet),
                    spec("data_center", DataType::Varchar),
                    spec("rack", DataType::Varchar),
                    spec("host_id", DataType::Uuid),
                    spec("schema_version", DataType::Uuid),
                    spec("tokens", DataType::Set(Box::new(DataType::Varchar))),
                ],
                ..Default::default()
            },
            // A single-node topology has no peers.
            data: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl RequestHandler for SystemTablesHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        let Message::Query(query) = &request.message else {
            return None;
        };
        let cql = query.query.to_ascii_lowercase();
        if cql.contains("system.local") {
            Some(respond(
                request,
                Message::Result(ResultBody::Rows(self.local_rows())),
            ))
        } else if cql.contains("system.peers") {
            Some(respond(
                request,
                Message::Result(ResultBody::Rows(self.peers_rows())),
            ))
        } else {
            None
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

    fn query_frame(cql: &str) -> Frame {
        Frame::new(ProtocolVersion::V4, 8, Message::Query(Query::new(cql)))
    }

    #[tokio::test]
    async fn test_local_query_gets_one_row() {
        let handler = SystemTablesHandler::new("test-cluster", "dc1");
        let response = handler
            .handle(&query_frame("SELECT * FROM system.local WHERE key='local'"), &context())
            .await
            .unwrap();
        match &response.message {
            Message::Result(ResultBody::Rows(rows)) => {
                assert_eq!(rows.data.len(), 1);
                assert_eq!(rows.metadata.column_count, 9);
                assert_eq!(rows.data[0][1], varchar_cell("test-cluster"));
                assert_eq!(rows.data[0][7], varchar_set_cell(&[TOKEN]));
            }
            other => panic!("expected Rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peers_query_gets_no_rows() {
        let handler = SystemTablesHandler::new("test-cluster", "dc1");
        let response = handler
            .handle(&query_frame("SELECT * FROM system.peers"), &context())
            .await
            .unwrap();
        match &response.message {
            Message::Result(ResultBody::Rows(rows)) => assert!(rows.data.is_empty()),
            other => panic!("expected Rows, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_other_queries_ignored() {
        let handler = SystemTablesHandler::new("c", "dc");
        assert!(handler
            .handle(&query_frame("SELECT * FROM ks.user_table"), &context())
            .await
            .is_none());
    }
}
