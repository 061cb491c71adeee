//! The client connection engine.
//!
//! One reader task and one writer task per connection, wired to the public
//! API through bounded channels. The in-flight table correlates responses to
//! requests by stream id; a sweeper task enforces per-request inactivity
//! timeouts without touching the connection itself.

use crate::error::{ConnectionError, Result};
use crate::handshake;
use crate::inflight::{InFlightRequest, InFlightTable};
use crate::io::{frame_io, BoxedTransport, FrameReader, FrameWriter, FramingState};
use crate::{ConnectionConfig, EventHandler};
use cqlauth::{Authenticator, PlainTextAuthenticator};
use cqlframe::compression::{
    BodyCompressor, Lz4Compressor, Lz4PayloadCompressor, SnappyCompressor,
};
use cqlframe::message::{error_codes, Message};
use cqlframe::{Frame, FrameCodec, SegmentCodec};
use cqlwire::version::CompressionAlgorithm;
use cqlwire::{Opcode, ProtocolVersion};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Error codes after which the connection cannot continue.
const FATAL_ERROR_CODES: [i32; 5] = [
    error_codes::SERVER_ERROR,
    error_codes::PROTOCOL_ERROR,
    error_codes::AUTHENTICATION_ERROR,
    error_codes::OVERLOADED,
    error_codes::IS_BOOTSTRAPPING,
];

type OnClose = Box<dyn FnOnce() + Send>;

struct Shared {
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    inflight: InFlightTable,
    outbound_tx: mpsc::Sender<Frame>,
    on_close: std::sync::Mutex<Option<OnClose>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Idempotent teardown of everything that does not require awaiting the
    /// I/O tasks: mark closed, cancel the tasks, fail outstanding requests,
    /// fire the close callback.
    async fn begin_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        self.inflight.close_all().await;
        let callback = self.on_close.lock().expect("on_close poisoned").take();
        if let Some(callback) = callback {
            callback();
        }
    }

    async fn send(&self, mut frame: Frame) -> Result<InFlightRequest> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let request = self.inflight.on_outgoing(&mut frame).await?;
        if self.outbound_tx.try_send(frame).is_err() {
            self.inflight.abort(request.stream_id()).await;
            return Err(ConnectionError::EnqueueFailed);
        }
        Ok(request)
    }
}

/// A client connection to one server.
pub struct Connection {
    version: ProtocolVersion,
    peer_addr: SocketAddr,
    local_addr: Option<SocketAddr>,
    shared: Arc<Shared>,
    framing: Arc<FramingState>,
    events_rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("version", &self.version)
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Dials `addr` and completes the protocol handshake.
    pub async fn connect(addr: SocketAddr, config: ConnectionConfig) -> Result<Self> {
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                addr,
                timeout: config.connect_timeout,
            })??;
        let _ = stream.set_nodelay(true);
        let local_addr = stream.local_addr().ok();
        tracing::info!("connected to {} (protocol {})", addr, config.version);
        Self::establish_inner(Box::new(stream), addr, local_addr, config).await
    }

    /// Runs the handshake and starts the engine over an arbitrary transport
    /// (e.g. a TLS stream the caller already wrapped).
    pub async fn establish(
        transport: BoxedTransport,
        peer_addr: SocketAddr,
        config: ConnectionConfig,
    ) -> Result<Self> {
        Self::establish_inner(transport, peer_addr, None, config).await
    }

    async fn establish_inner(
        transport: BoxedTransport,
        peer_addr: SocketAddr,
        local_addr: Option<SocketAddr>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (legacy_codec, segment_codec) = build_codecs(&config);
        let framing = FramingState::new();
        let (mut reader, mut writer) = frame_io(
            transport,
            legacy_codec,
            segment_codec,
            Arc::clone(&framing),
        );

        // Handshake runs before the I/O tasks exist, so no other frame can
        // be in flight when the framing switch happens.
        let authenticator = config
            .credentials
            .clone()
            .map(PlainTextAuthenticator::new);
        handshake::perform_client_handshake(
            &mut reader,
            &mut writer,
            config.version,
            config.compression,
            authenticator.as_ref().map(|a| a as &dyn Authenticator),
            &framing,
        )
        .await?;

        let (outbound_tx, outbound_rx) = mpsc::channel(config.max_in_flight);
        let (events_tx, events_rx) = mpsc::channel(config.max_in_flight);
        let (shutdown_tx, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            shutdown: shutdown_tx,
            inflight: InFlightTable::new(
                config.max_in_flight,
                config.max_pending,
                config.read_timeout,
            ),
            outbound_tx,
            on_close: std::sync::Mutex::new(None),
        });

        let mut tasks = Vec::with_capacity(4);
        tasks.push(spawn_reader(
            reader,
            Arc::clone(&shared),
            events_tx,
            config.event_handlers.clone(),
        ));
        tasks.push(spawn_writer(writer, outbound_rx, Arc::clone(&shared)));
        tasks.push(spawn_sweeper(Arc::clone(&shared), config.read_timeout));
        if let Some(interval) = config.heartbeat_interval {
            tasks.push(spawn_heartbeat(
                Arc::clone(&shared),
                config.version,
                interval,
            ));
        }

        Ok(Self {
            version: config.version,
            peer_addr,
            local_addr,
            shared,
            framing,
            events_rx: tokio::sync::Mutex::new(events_rx),
            tasks: tokio::sync::Mutex::new(tasks),
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Local socket address; what a server sees as the remote address.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Whether the connection has switched to segment framing.
    pub fn modern_framing(&self) -> bool {
        self.framing.is_modern()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Registers the callback invoked exactly once when the connection
    /// closes.
    pub fn set_on_close(&self, callback: impl FnOnce() + Send + 'static) {
        *self.shared.on_close.lock().expect("on_close poisoned") = Some(Box::new(callback));
    }

    /// Sends a request frame.
    ///
    /// A stream id of 0 requests a managed id from the pool; the id written
    /// to the wire is available on the returned handle and is never 0.
    /// Fails immediately when the outbound queue is full.
    pub async fn send(&self, frame: Frame) -> Result<InFlightRequest> {
        self.shared.send(frame).await
    }

    /// Number of requests currently awaiting responses.
    pub async fn in_flight(&self) -> usize {
        self.shared.inflight.len().await
    }

    /// Next server-push EVENT frame, `None` after close.
    pub async fn recv_event(&self) -> Option<Frame> {
        self.events_rx.lock().await.recv().await
    }

    /// Closes the connection: idempotent, fails all in-flight requests with
    /// a closed error, and waits for both I/O tasks to finish.
    pub async fn close(&self) {
        self.shared.begin_close().await;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!("connection to {} closed", self.peer_addr);
    }
}

fn build_codecs(config: &ConnectionConfig) -> (FrameCodec, SegmentCodec) {
    let body_compressor: Option<Arc<dyn BodyCompressor>> = match config.compression {
        CompressionAlgorithm::None => None,
        CompressionAlgorithm::Lz4 => Some(Arc::new(Lz4Compressor)),
        CompressionAlgorithm::Snappy => Some(Arc::new(SnappyCompressor)),
    };
    let legacy_codec = FrameCodec::new(Arc::clone(&config.codec_registry), body_compressor);
    let segment_codec = match config.compression {
        CompressionAlgorithm::Lz4 => SegmentCodec::compressed(Arc::new(Lz4PayloadCompressor)),
        _ => SegmentCodec::uncompressed(),
    };
    (legacy_codec, segment_codec)
}

fn fatal_error(frame: &Frame) -> Option<(i32, String)> {
    match &frame.message {
        Message::Error(body) if FATAL_ERROR_CODES.contains(&body.code) => {
            Some((body.code, body.message.clone()))
        }
        _ => None,
    }
}

fn spawn_reader(
    mut reader: FrameReader,
    shared: Arc<Shared>,
    events_tx: mpsc::Sender<Frame>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
) -> JoinHandle<()> {
    let mut shutdown_rx = shared.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                result = reader.read_frame() => match result {
                    Ok(frame) => {
                        if frame.opcode() == Opcode::Event {
                            for handler in &event_handlers {
                                handler.on_event(frame.clone()).await;
                            }
                            if events_tx.try_send(frame).is_err() {
                                tracing::warn!("event queue full, dropping server event");
                            }
                            continue;
                        }
                        let fatal = fatal_error(&frame);
                        shared.inflight.on_incoming(frame).await;
                        if let Some((code, message)) = fatal {
                            tracing::error!(
                                "server sent fatal error 0x{:04x} ({}), closing connection",
                                code,
                                message
                            );
                            shared.begin_close().await;
                            break;
                        }
                    }
                    Err(error) => {
                        if !shared.is_closed() {
                            tracing::debug!("read loop ended: {}", error);
                        }
                        shared.begin_close().await;
                        break;
                    }
                },
            }
        }
    })
}

fn spawn_writer(
    mut writer: FrameWriter,
    mut outbound_rx: mpsc::Receiver<Frame>,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    let mut shutdown_rx = shared.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                maybe_frame = outbound_rx.recv() => match maybe_frame {
                    Some(frame) => {
                        if let Err(error) = writer.write_frame(&frame).await {
                            tracing::warn!("write failed: {}", error);
                            shared.begin_close().await;
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

fn spawn_sweeper(shared: Arc<Shared>, read_timeout: Duration) -> JoinHandle<()> {
    let mut shutdown_rx = shared.shutdown.subscribe();
    tokio::spawn(async move {
        let period = (read_timeout / 4).max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => shared.inflight.sweep().await,
            }
        }
    })
}

fn spawn_heartbeat(
    shared: Arc<Shared>,
    version: ProtocolVersion,
    interval: Duration,
) -> JoinHandle<()> {
    let mut shutdown_rx = shared.shutdown.subscribe();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so an idle connection
        // does not heartbeat right after the handshake.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = ticker.tick() => {
                    match shared.send(Frame::new(version, 0, Message::Options)).await {
                        Ok(request) => {
                            if let Err(error) = request.response().await {
                                tracing::warn!("heartbeat failed: {}", error);
                            }
                        }
                        Err(error) => {
                            tracing::debug!("heartbeat not sent: {}", error);
                        }
                    }
                }
            }
        }
    })
}
