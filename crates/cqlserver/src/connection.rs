//! One accepted client connection.
//!
//! A reader task decodes inbound request frames and spawns a short-lived
//! handler task per request; a writer task drains the outbound queue. The
//! switch to modern framing happens on the writer, right after READY or
//! AUTHENTICATE goes out at a version that segments.

use crate::handlers::{HandlerContext, Outbound, RawRequestHandler, RequestHandler};
use crate::ServerConfig;
use cqlconn::io::{frame_io, BoxedTransport, FrameReader, FrameWriter, FramingState};
use cqlframe::compression::{
    BodyCompressor, Lz4Compressor, Lz4PayloadCompressor, SnappyCompressor,
};
use cqlframe::{Frame, FrameCodec, SegmentCodec};
use cqlwire::version::CompressionAlgorithm;
use cqlwire::Opcode;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

type OnClosed = Box<dyn FnOnce() + Send>;

pub struct ServerConnection {
    peer_addr: SocketAddr,
    outbound_tx: mpsc::Sender<Outbound>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    framing: Arc<FramingState>,
    on_closed: std::sync::Mutex<Option<OnClosed>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ServerConnection {
    pub(crate) fn start(
        transport: BoxedTransport,
        peer_addr: SocketAddr,
        config: &ServerConfig,
        on_closed: OnClosed,
    ) -> Arc<Self> {
        let (legacy_codec, segment_codec) = build_codecs(config);
        let framing = FramingState::new();
        let (reader, writer) = frame_io(
            transport,
            legacy_codec,
            segment_codec,
            Arc::clone(&framing),
        );

        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_depth());
        let (shutdown_tx, _) = watch::channel(false);
        let connection = Arc::new(Self {
            peer_addr,
            outbound_tx: outbound_tx.clone(),
            closed: AtomicBool::new(false),
            shutdown: shutdown_tx,
            framing: Arc::clone(&framing),
            on_closed: std::sync::Mutex::new(Some(on_closed)),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        });

        let chain = HandlerChain::new(config, peer_addr, outbound_tx);
        let reader_task = spawn_reader(
            reader,
            Arc::clone(&connection),
            chain,
            config.idle_timeout,
        );
        let writer_task = spawn_writer(writer, outbound_rx, Arc::clone(&connection), framing);
        if let Ok(mut tasks) = connection.tasks.try_lock() {
            tasks.push(reader_task);
            tasks.push(writer_task);
        }
        connection
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn modern_framing(&self) -> bool {
        self.framing.is_modern()
    }

    /// Queues a frame outside the request/response flow (server events,
    /// additional continuous-paging pages).
    pub async fn send(&self, frame: Frame) -> bool {
        !self.is_closed() && self.outbound_tx.send(Outbound::Frame(frame)).await.is_ok()
    }

    fn begin_close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown.send(true);
        let callback = self.on_closed.lock().expect("on_closed poisoned").take();
        if let Some(callback) = callback {
            callback();
        }
        tracing::debug!("server connection to {} closing", self.peer_addr);
    }

    /// Idempotent close; waits for the I/O tasks.
    pub async fn close(&self) {
        self.begin_close();
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}

fn build_codecs(config: &ServerConfig) -> (FrameCodec, SegmentCodec) {
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

/// The handler lists plus one context per handler, shared by all the
/// per-request tasks of a connection.
struct HandlerChain {
    raw_handlers: Vec<Arc<dyn RawRequestHandler>>,
    raw_contexts: Vec<Arc<HandlerContext>>,
    handlers: Vec<Arc<dyn RequestHandler>>,
    contexts: Vec<Arc<HandlerContext>>,
    outbound: mpsc::Sender<Outbound>,
}

impl HandlerChain {
    fn new(
        config: &ServerConfig,
        peer_addr: SocketAddr,
        outbound: mpsc::Sender<Outbound>,
    ) -> Arc<Self> {
        let raw_contexts = config
            .raw_request_handlers
            .iter()
            .map(|_| {
                Arc::new(HandlerContext::new(
                    peer_addr,
                    config.credentials.clone(),
                    outbound.clone(),
                ))
            })
            .collect();
        let contexts = config
            .request_handlers
            .iter()
            .map(|_| {
                Arc::new(HandlerContext::new(
                    peer_addr,
                    config.credentials.clone(),
                    outbound.clone(),
                ))
            })
            .collect();
        Arc::new(Self {
            raw_handlers: config.raw_request_handlers.clone(),
            raw_contexts,
            handlers: config.request_handlers.clone(),
            contexts,
            outbound,
        })
    }

    async fn dispatch(&self, request: Frame) {
        let stream_id = request.header.stream_id;
        for (handler, ctx) in self.raw_handlers.iter().zip(&self.raw_contexts) {
            if let Some(mut raw) = handler.handle(&request, ctx).await {
                raw.header.stream_id = stream_id;
                let _ = self.outbound.send(Outbound::Raw(raw)).await;
                return;
            }
        }
        for (handler, ctx) in self.handlers.iter().zip(&self.contexts) {
            if let Some(mut response) = handler.handle(&request, ctx).await {
                response.header.stream_id = stream_id;
                let _ = self.outbound.send(Outbound::Frame(response)).await;
                return;
            }
        }
        tracing::warn!(
            "no handler produced a response for {} (stream {})",
            request.opcode(),
            stream_id
        );
    }
}

fn spawn_reader(
    mut reader: FrameReader,
    connection: Arc<ServerConnection>,
    chain: Arc<HandlerChain>,
    idle_timeout: std::time::Duration,
) -> JoinHandle<()> {
    let mut shutdown_rx = connection.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                result = tokio::time::timeout(idle_timeout, reader.read_frame()) => match result {
                    Err(_) => {
                        tracing::info!(
                            "connection from {} idle for {:?}, closing",
                            connection.peer_addr,
                            idle_timeout
                        );
                        break;
                    }
                    Ok(Err(error)) => {
                        if !connection.is_closed() {
                            tracing::debug!(
                                "read loop for {} ended: {}",
                                connection.peer_addr,
                                error
                            );
                        }
                        break;
                    }
                    Ok(Ok(frame)) => {
                        let chain = Arc::clone(&chain);
                        // Handlers may block (auth, user callbacks); one task
                        // per request keeps the read loop responsive.
                        tokio::spawn(async move {
                            chain.dispatch(frame).await;
                        });
                    }
                },
            }
        }
        connection.begin_close();
    })
}

fn spawn_writer(
    mut writer: FrameWriter,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    connection: Arc<ServerConnection>,
    framing: Arc<FramingState>,
) -> JoinHandle<()> {
    let mut shutdown_rx = connection.shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                maybe_item = outbound_rx.recv() => {
                    let Some(item) = maybe_item else { break };
                    let (result, opcode, version) = match &item {
                        Outbound::Frame(frame) => (
                            writer.write_frame(frame).await,
                            frame.opcode(),
                            frame.header.version,
                        ),
                        Outbound::Raw(raw) => (
                            writer.write_raw(raw).await,
                            raw.opcode(),
                            raw.header.version,
                        ),
                    };
                    if let Err(error) = result {
                        tracing::warn!("write to {} failed: {}", connection.peer_addr, error);
                        connection.begin_close();
                        break;
                    }
                    // The handshake switch: once READY or AUTHENTICATE went
                    // out at a segmenting version, everything after is
                    // wrapped in segments. No request can be in flight at
                    // that point, so the reader cannot race the flip.
                    if matches!(opcode, Opcode::Ready | Opcode::Authenticate)
                        && version.supports_modern_framing()
                    {
                        framing.enable_modern();
                    }
                },
            }
        }
    })
}
