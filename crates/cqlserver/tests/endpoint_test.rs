//! End-to-end scenarios over loopback TCP: handshake flavors, modern
//! framing, continuous paging, fatal errors and close semantics.

use bytes::{Bytes, BytesMut};
use cqlconn::{Connection, ConnectionConfig};
use cqlframe::message::result::{ColumnSpec, DataType, ResultBody, Rows, RowsMetadata, TableSpec};
use cqlframe::message::{
    error_codes, ContinuousPagingOptions, ErrorBody, Event, Message, Query, QueryParameters,
    Register, StatusChange,
};
use cqlframe::{Frame, FrameCodec, Segment, SegmentCodec};
use cqlserver::{
    HandlerContext, HandshakeHandler, HeartbeatHandler, RequestHandler, Server, ServerConfig,
    ServerState,
};
use cqlwire::version::CompressionAlgorithm;
use cqlwire::ProtocolVersion;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn any_addr() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn int_rows(values: &[&[u8]]) -> Rows {
    Rows {
        metadata: RowsMetadata {
            column_count: 1,
            global_table_spec: Some(TableSpec {
                keyspace: "system".to_string(),
                table: "local".to_string(),
            }),
            columns: vec![ColumnSpec::new("system", "local", "key", DataType::Int)],
            ..Default::default()
        },
        data: values
            .iter()
            .map(|value| vec![Some(Bytes::copy_from_slice(value))])
            .collect(),
    }
}

/// Answers `SELECT * FROM system.local` with two fixed int rows.
struct LocalRowsHandler;

#[async_trait::async_trait]
impl RequestHandler for LocalRowsHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        let Message::Query(query) = &request.message else {
            return None;
        };
        if query.query != "SELECT * FROM system.local" {
            return None;
        }
        Some(Frame::new(
            request.header.version,
            request.header.stream_id,
            Message::Result(ResultBody::Rows(int_rows(&[
                &[0x01, 0x02, 0x03, 0x04],
                &[0x05, 0x06, 0x07, 0x08],
            ]))),
        ))
    }
}

fn basic_config() -> ServerConfig {
    ServerConfig {
        request_handlers: vec![
            Arc::new(HandshakeHandler::new()),
            Arc::new(HeartbeatHandler),
            Arc::new(LocalRowsHandler),
        ],
        ..Default::default()
    }
}

async fn start_server(config: ServerConfig) -> (Arc<Server>, SocketAddr) {
    let server = Arc::new(Server::new(config));
    let addr = server.start(any_addr()).await.unwrap();
    (server, addr)
}

#[tokio::test]
async fn test_query_round_trip_v4() {
    init_tracing();
    let (server, addr) = start_server(basic_config()).await;

    let client = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap();
    let request = client
        .send(Frame::new(
            ProtocolVersion::V4,
            0,
            Message::Query(Query::new("SELECT * FROM system.local")),
        ))
        .await
        .unwrap();

    // The managed id came from the pool, never the sentinel.
    assert!(request.stream_id() >= 1);

    let response = request.response().await.unwrap();
    assert_eq!(response.header.stream_id, request.stream_id());
    match &response.message {
        Message::Result(ResultBody::Rows(rows)) => {
            assert_eq!(rows.data.len(), 2);
            assert_eq!(
                rows.data[0][0].as_deref(),
                Some(&[0x01u8, 0x02, 0x03, 0x04][..])
            );
            assert_eq!(
                rows.data[1][0].as_deref(),
                Some(&[0x05u8, 0x06, 0x07, 0x08][..])
            );
        }
        other => panic!("expected Rows, got {:?}", other),
    }

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_plain_authentication_cassandra_flavor() {
    init_tracing();
    let (server, addr) = start_server(basic_config().with_credentials("cassandra", "cassandra")).await;

    // Correct credentials succeed.
    let client = Connection::connect(
        addr,
        ConnectionConfig::default().with_credentials("cassandra", "cassandra"),
    )
    .await
    .unwrap();
    assert!(!client.is_closed());
    client.close().await;

    // Wrong credentials are rejected during the handshake.
    let error = Connection::connect(
        addr,
        ConnectionConfig::default().with_credentials("cassandra", "wrong"),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        error,
        cqlconn::ConnectionError::AuthenticationRejected(_)
    ));

    // No credentials at all fails before anything is sent back.
    let error = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(error, cqlconn::ConnectionError::MissingCredentials));

    server.close().await;
}

#[tokio::test]
async fn test_plain_authentication_dse_challenge_flavor() {
    init_tracing();
    let config = ServerConfig {
        request_handlers: vec![Arc::new(HandshakeHandler::dse()), Arc::new(HeartbeatHandler)],
        ..Default::default()
    }
    .with_credentials("u", "p");
    let (server, addr) = start_server(config).await;

    let client = Connection::connect(
        addr,
        ConnectionConfig::default().with_credentials("u", "p"),
    )
    .await
    .unwrap();
    assert!(!client.is_closed());

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_modern_framing_switch_at_v5() {
    init_tracing();
    let (server, addr) = start_server(basic_config()).await;

    let client = Connection::connect(
        addr,
        ConnectionConfig::with_version(ProtocolVersion::V5),
    )
    .await
    .unwrap();
    assert!(client.modern_framing());

    let server_conn = server
        .accept_specific(client.local_addr().unwrap())
        .await
        .unwrap();
    // The server flips right after its writer pushes READY out; give the
    // writer task a moment to run.
    for _ in 0..50 {
        if server_conn.modern_framing() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server_conn.modern_framing());

    // A request after the switch travels inside segments end to end.
    let request = client
        .send(Frame::new(
            ProtocolVersion::V5,
            0,
            Message::Query(Query::new("SELECT * FROM system.local")),
        ))
        .await
        .unwrap();
    let response = request.response().await.unwrap();
    assert!(matches!(
        response.message,
        Message::Result(ResultBody::Rows(_))
    ));

    client.close().await;
    server.close().await;
}

/// A hand-rolled server that completes the v5 handshake and then sends one
/// corrupted segment.
async fn corrupting_server(listener: tokio::net::TcpListener) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let codec = FrameCodec::with_defaults();

    // Read the legacy-framed STARTUP.
    let mut header = [0u8; 9];
    stream.read_exact(&mut header).await.unwrap();
    let body_length = i32::from_be_bytes(header[5..9].try_into().unwrap()) as usize;
    let mut body = vec![0u8; body_length];
    stream.read_exact(&mut body).await.unwrap();

    // Reply READY (legacy-framed), which flips both sides to segments.
    let mut ready = BytesMut::new();
    codec
        .encode(&Frame::new(ProtocolVersion::V5, 0, Message::Ready), &mut ready)
        .unwrap();
    stream.write_all(&ready).await.unwrap();

    // Wait for the client's first post-handshake request so the corrupted
    // bytes land while a request is in flight.
    let mut probe = [0u8; 1];
    stream.read_exact(&mut probe).await.unwrap();

    // Build a valid self-contained segment, then flip the MSB of the third
    // header byte.
    let mut frame_bytes = BytesMut::new();
    codec
        .encode(
            &Frame::new(
                ProtocolVersion::V5,
                1,
                Message::Supported(cqlframe::message::Supported::standard()),
            ),
            &mut frame_bytes,
        )
        .unwrap();
    let mut segment = BytesMut::new();
    SegmentCodec::uncompressed()
        .encode(&Segment::self_contained(frame_bytes.freeze()), &mut segment)
        .unwrap();
    segment[2] ^= 0x80;
    stream.write_all(&segment).await.unwrap();
    stream.flush().await.unwrap();

    // Hold the socket open; the client must abort on its own.
    tokio::time::sleep(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn test_crc_corruption_aborts_connection() {
    init_tracing();
    let listener = tokio::net::TcpListener::bind(any_addr()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_task = tokio::spawn(corrupting_server(listener));

    let client = Connection::connect(
        addr,
        ConnectionConfig::with_version(ProtocolVersion::V5),
    )
    .await
    .unwrap();
    assert!(client.modern_framing());

    let request = client
        .send(Frame::new(ProtocolVersion::V5, 0, Message::Options))
        .await
        .unwrap();
    // The corrupted segment kills the read loop; the request fails closed.
    let error = request.response().await.unwrap_err();
    assert!(matches!(
        error,
        cqlconn::ConnectionError::Request(cqlconn::RequestError::Closed)
    ));

    for _ in 0..50 {
        if client.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(client.is_closed());
    server_task.abort();
}

/// Streams `max_pages` continuous-paging result frames for one QUERY.
struct ContinuousPagingHandler;

fn page_frame(request: &Frame, page: i32, last: bool) -> Frame {
    Frame::new(
        request.header.version,
        request.header.stream_id,
        Message::Result(ResultBody::Rows(Rows {
            metadata: RowsMetadata {
                column_count: 1,
                continuous_page_number: Some(page),
                last_continuous_page: last,
                ..Default::default()
            },
            data: vec![vec![Some(Bytes::copy_from_slice(&page.to_be_bytes()))]],
        })),
    )
}

#[async_trait::async_trait]
impl RequestHandler for ContinuousPagingHandler {
    async fn handle(&self, request: &Frame, ctx: &HandlerContext) -> Option<Frame> {
        let Message::Query(query) = &request.message else {
            return None;
        };
        let options = query.params.continuous_paging?;
        for page in 1..options.max_pages {
            ctx.push(page_frame(request, page, false)).await;
        }
        Some(page_frame(request, options.max_pages, true))
    }
}

#[tokio::test]
async fn test_continuous_paging_delivers_all_pages() {
    init_tracing();
    let config = ServerConfig {
        request_handlers: vec![
            Arc::new(HandshakeHandler::new()),
            Arc::new(ContinuousPagingHandler),
        ],
        ..Default::default()
    };
    let (server, addr) = start_server(config).await;

    let client = Connection::connect(
        addr,
        ConnectionConfig::with_version(ProtocolVersion::Dse2),
    )
    .await
    .unwrap();

    let params = QueryParameters {
        page_size: Some(100),
        continuous_paging: Some(ContinuousPagingOptions {
            max_pages: 5,
            pages_per_second: 0,
            next_pages: Some(5),
        }),
        ..Default::default()
    };
    let request = client
        .send(Frame::new(
            ProtocolVersion::Dse2,
            0,
            Message::Query(Query::new("SELECT * FROM ks.big").with_params(params)),
        ))
        .await
        .unwrap();

    for expected_page in 1..=5 {
        let frame = request.incoming().await.expect("page frame");
        match &frame.message {
            Message::Result(ResultBody::Rows(rows)) => {
                assert_eq!(rows.metadata.continuous_page_number, Some(expected_page));
                assert_eq!(rows.metadata.last_continuous_page, expected_page == 5);
            }
            other => panic!("expected Rows, got {:?}", other),
        }
    }
    assert!(request.incoming().await.is_none());
    assert!(request.is_done());
    assert!(request.error().is_none());
    assert_eq!(client.in_flight().await, 0);

    client.close().await;
    server.close().await;
}

/// Replies to every QUERY with a fatal OVERLOADED error.
struct OverloadedHandler;

#[async_trait::async_trait]
impl RequestHandler for OverloadedHandler {
    async fn handle(&self, request: &Frame, _ctx: &HandlerContext) -> Option<Frame> {
        matches!(request.message, Message::Query(_)).then(|| {
            Frame::new(
                request.header.version,
                request.header.stream_id,
                Message::Error(ErrorBody::new(error_codes::OVERLOADED, "shedding load")),
            )
        })
    }
}

#[tokio::test]
async fn test_fatal_error_code_closes_connection() {
    init_tracing();
    let config = ServerConfig {
        request_handlers: vec![
            Arc::new(HandshakeHandler::new()),
            Arc::new(OverloadedHandler),
        ],
        ..Default::default()
    };
    let (server, addr) = start_server(config).await;

    let client = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap();
    let request = client
        .send(Frame::new(
            ProtocolVersion::V4,
            0,
            Message::Query(Query::new("SELECT 1")),
        ))
        .await
        .unwrap();

    // The fatal error is still delivered to the caller first.
    let response = request.response().await.unwrap();
    match &response.message {
        Message::Error(body) => assert_eq!(body.code, error_codes::OVERLOADED),
        other => panic!("expected ERROR, got {:?}", other),
    }

    for _ in 0..50 {
        if client.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(client.is_closed());
    assert!(matches!(
        client
            .send(Frame::new(
                ProtocolVersion::V4,
                0,
                Message::Query(Query::new("SELECT 1")),
            ))
            .await,
        Err(cqlconn::ConnectionError::Closed)
    ));

    server.close().await;
}

async fn query_once(client: &Connection, version: ProtocolVersion) {
    let request = client
        .send(Frame::new(
            version,
            0,
            Message::Query(Query::new("SELECT * FROM system.local")),
        ))
        .await
        .unwrap();
    let response = request.response().await.unwrap();
    match &response.message {
        Message::Result(ResultBody::Rows(rows)) => assert_eq!(rows.data.len(), 2),
        other => panic!("expected Rows, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lz4_body_compression_legacy_framing() {
    init_tracing();
    let config = ServerConfig {
        compression: CompressionAlgorithm::Lz4,
        ..basic_config()
    };
    let (server, addr) = start_server(config).await;

    let client = Connection::connect(
        addr,
        ConnectionConfig::default().with_compression(CompressionAlgorithm::Lz4),
    )
    .await
    .unwrap();
    query_once(&client, ProtocolVersion::V4).await;

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_lz4_segment_compression_modern_framing() {
    init_tracing();
    let config = ServerConfig {
        compression: CompressionAlgorithm::Lz4,
        ..basic_config()
    };
    let (server, addr) = start_server(config).await;

    let client = Connection::connect(
        addr,
        ConnectionConfig::with_version(ProtocolVersion::V5)
            .with_compression(CompressionAlgorithm::Lz4),
    )
    .await
    .unwrap();
    assert!(client.modern_framing());
    query_once(&client, ProtocolVersion::V5).await;

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_close_is_idempotent() {
    init_tracing();
    let (server, addr) = start_server(basic_config()).await;

    let client = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap();
    let closes = Arc::new(AtomicUsize::new(0));
    let closes_clone = Arc::clone(&closes);
    client.set_on_close(move || {
        closes_clone.fetch_add(1, Ordering::SeqCst);
    });

    client.close().await;
    client.close().await;
    client.close().await;
    assert_eq!(closes.load(Ordering::SeqCst), 1);

    server.close().await;
    assert_eq!(server.state(), ServerState::Closed);
}

struct CountingEventHandler {
    seen: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl cqlconn::EventHandler for CountingEventHandler {
    async fn on_event(&self, frame: Frame) {
        assert!(matches!(frame.message, Message::Event(_)));
        self.seen.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_server_push_events_reach_client() {
    init_tracing();
    let (server, addr) =
        start_server(ServerConfig::with_standard_handlers("test-cluster", "dc1")).await;

    let seen = Arc::new(AtomicUsize::new(0));
    let mut client_config = ConnectionConfig::default();
    client_config.event_handlers = vec![Arc::new(CountingEventHandler {
        seen: Arc::clone(&seen),
    })];
    let client = Connection::connect(addr, client_config).await.unwrap();
    let server_conn = server.accept_any().await.unwrap();

    // REGISTER is answered with READY through the standard chain.
    let request = client
        .send(Frame::new(
            ProtocolVersion::V4,
            0,
            Message::Register(Register::all()),
        ))
        .await
        .unwrap();
    assert_eq!(request.response().await.unwrap().message, Message::Ready);

    // Server pushes an event on the negative stream id reserved for pushes.
    let event = Frame::new(
        ProtocolVersion::V4,
        -1,
        Message::Event(Event::StatusChange(StatusChange {
            change_type: "UP".to_string(),
            address: cqlwire::primitive::Inet {
                addr: "10.0.0.9".parse().unwrap(),
                port: 9042,
            },
        })),
    );
    assert!(server_conn.send(event).await);

    let received = client.recv_event().await.expect("event frame");
    assert_eq!(received.header.stream_id, -1);
    assert!(matches!(received.message, Message::Event(Event::StatusChange(_))));
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    client.close().await;
    server.close().await;
}

/// Pre-encodes its own SUPPORTED answer for OPTIONS, bypassing the registry.
struct RawOptionsHandler;

#[async_trait::async_trait]
impl cqlserver::RawRequestHandler for RawOptionsHandler {
    async fn handle(
        &self,
        request: &Frame,
        _ctx: &HandlerContext,
    ) -> Option<cqlframe::RawFrame> {
        if !matches!(request.message, Message::Options) {
            return None;
        }
        let mut supported = cqlframe::message::Supported::standard();
        supported
            .options
            .insert("RAW_HANDLER".to_string(), vec!["yes".to_string()]);
        let frame = Frame::new(
            request.header.version,
            request.header.stream_id,
            Message::Supported(supported),
        );
        Some(FrameCodec::with_defaults().to_raw(&frame).unwrap())
    }
}

#[tokio::test]
async fn test_raw_handlers_win_over_decoded_handlers() {
    init_tracing();
    let config = ServerConfig {
        raw_request_handlers: vec![Arc::new(RawOptionsHandler)],
        ..basic_config()
    };
    let (server, addr) = start_server(config).await;

    let client = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap();
    let request = client
        .send(Frame::new(ProtocolVersion::V4, 0, Message::Options))
        .await
        .unwrap();
    // HeartbeatHandler would also answer OPTIONS; the raw handler is
    // consulted first and its marker must come through.
    match &request.response().await.unwrap().message {
        Message::Supported(supported) => {
            assert_eq!(
                supported.options.get("RAW_HANDLER"),
                Some(&vec!["yes".to_string()])
            );
        }
        other => panic!("expected SUPPORTED, got {:?}", other),
    }

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_accept_any_and_connection_table() {
    init_tracing();
    let (server, addr) = start_server(basic_config()).await;
    assert_eq!(server.state(), ServerState::Running);

    let client = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap();
    let server_conn = server.accept_any().await.unwrap();
    assert_eq!(Some(server_conn.peer_addr()), client.local_addr());
    assert_eq!(server.connection_count().await, 1);

    client.close().await;
    server.close().await;
}

#[tokio::test]
async fn test_max_connections_refused() {
    init_tracing();
    let config = ServerConfig {
        max_connections: 1,
        ..basic_config()
    };
    let (server, addr) = start_server(config).await;

    let first = Connection::connect(addr, ConnectionConfig::default())
        .await
        .unwrap();
    assert_eq!(server.connection_count().await, 1);

    // The second connection is dropped by the server before any handshake
    // response, so connecting fails.
    let second = Connection::connect(addr, ConnectionConfig::default()).await;
    assert!(second.is_err());

    first.close().await;
    server.close().await;
}
