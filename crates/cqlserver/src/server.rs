//! The listening endpoint.
//!
//! A dedicated task loops on `accept()`. Each accepted socket becomes a
//! [`ServerConnection`] registered in the accept table (keyed by remote
//! address, bounded by `max_connections`); callers pick connections up with
//! `accept_any` or `accept_specific`.

use crate::connection::ServerConnection;
use crate::error::{Result, ServerError};
use crate::ServerConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;

/// Lifecycle of a server: transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    NotStarted = 0,
    Running = 1,
    Closed = 2,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            _ => Self::Closed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::Closed => "closed",
        }
    }
}

struct Inner {
    config: ServerConfig,
    state: AtomicU8,
    connections: RwLock<HashMap<SocketAddr, Arc<ServerConnection>>>,
    waiters: std::sync::Mutex<HashMap<SocketAddr, oneshot::Sender<Arc<ServerConnection>>>>,
    any_tx: mpsc::Sender<Arc<ServerConnection>>,
    shutdown: watch::Sender<bool>,
}

impl Inner {
    fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn register(&self, connection: Arc<ServerConnection>) {
        let peer_addr = connection.peer_addr();
        self.connections
            .write()
            .await
            .insert(peer_addr, Arc::clone(&connection));

        let waiter = self
            .waiters
            .lock()
            .expect("accept waiters poisoned")
            .remove(&peer_addr);
        if let Some(waiter) = waiter {
            if waiter.send(Arc::clone(&connection)).is_ok() {
                return;
            }
        }
        if self.any_tx.try_send(connection).is_err() {
            tracing::warn!("accept queue full, connection from {} still served", peer_addr);
        }
    }
}

/// A reference CQL server endpoint.
pub struct Server {
    inner: Arc<Inner>,
    any_rx: tokio::sync::Mutex<mpsc::Receiver<Arc<ServerConnection>>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
    accept_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let (any_tx, any_rx) = mpsc::channel(config.max_connections.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                state: AtomicU8::new(ServerState::NotStarted as u8),
                connections: RwLock::new(HashMap::new()),
                waiters: std::sync::Mutex::new(HashMap::new()),
                any_tx,
                shutdown: shutdown_tx,
            }),
            any_rx: tokio::sync::Mutex::new(any_rx),
            local_addr: std::sync::Mutex::new(None),
            accept_task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        self.inner.state()
    }

    /// Address the listener is bound to; available once running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local_addr poisoned")
    }

    /// Binds the listener and starts the accept loop.
    /// NotStarted -> Running; any other starting state is an error.
    pub async fn start(&self, bind_addr: SocketAddr) -> Result<SocketAddr> {
        let state = self.inner.state();
        if state != ServerState::NotStarted {
            return Err(ServerError::WrongState(state.as_str(), "not started"));
        }
        let listener = TcpListener::bind(bind_addr).await?;
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().expect("local_addr poisoned") = Some(local_addr);
        self.inner
            .state
            .store(ServerState::Running as u8, Ordering::SeqCst);
        tracing::info!("server listening on {}", local_addr);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(accept_loop(listener, inner));
        *self.accept_task.lock().await = Some(task);
        Ok(local_addr)
    }

    /// Waits for any newly accepted connection.
    pub async fn accept_any(&self) -> Result<Arc<ServerConnection>> {
        self.ensure_running()?;
        let timeout = self.inner.config.accept_timeout;
        let mut any_rx = self.any_rx.lock().await;
        match tokio::time::timeout(timeout, any_rx.recv()).await {
            Ok(Some(connection)) => Ok(connection),
            Ok(None) => Err(ServerError::Closed),
            Err(_) => Err(ServerError::AcceptTimeout(timeout)),
        }
    }

    /// Waits for the connection whose remote address is `client_addr`
    /// (the local address of a socket the caller just dialed from).
    pub async fn accept_specific(&self, client_addr: SocketAddr) -> Result<Arc<ServerConnection>> {
        self.ensure_running()?;
        if let Some(connection) = self.inner.connections.read().await.get(&client_addr) {
            return Ok(Arc::clone(connection));
        }
        let (tx, rx) = oneshot::channel();
        self.inner
            .waiters
            .lock()
            .expect("accept waiters poisoned")
            .insert(client_addr, tx);
        // The connection may have been registered between the lookup and the
        // waiter insertion; check again before blocking.
        if let Some(connection) = self.inner.connections.read().await.get(&client_addr) {
            self.inner
                .waiters
                .lock()
                .expect("accept waiters poisoned")
                .remove(&client_addr);
            return Ok(Arc::clone(connection));
        }

        let timeout = self.inner.config.accept_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(connection)) => Ok(connection),
            Ok(Err(_)) => Err(ServerError::Closed),
            Err(_) => {
                self.inner
                    .waiters
                    .lock()
                    .expect("accept waiters poisoned")
                    .remove(&client_addr);
                Err(ServerError::AcceptTimeout(timeout))
            }
        }
    }

    /// Number of live accepted connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Stops accepting, closes every connection. Running -> Closed.
    pub async fn close(&self) {
        let previous = self
            .inner
            .state
            .swap(ServerState::Closed as u8, Ordering::SeqCst);
        if previous == ServerState::Closed as u8 {
            return;
        }
        let _ = self.inner.shutdown.send(true);
        if let Some(task) = self.accept_task.lock().await.take() {
            let _ = task.await;
        }
        let connections: Vec<_> = self
            .inner
            .connections
            .write()
            .await
            .drain()
            .map(|(_, connection)| connection)
            .collect();
        for connection in connections {
            connection.close().await;
        }
        tracing::info!("server closed");
    }

    fn ensure_running(&self) -> Result<()> {
        let state = self.inner.state();
        if state != ServerState::Running {
            return Err(ServerError::WrongState(state.as_str(), "running"));
        }
        Ok(())
    }
}

async fn accept_loop(listener: TcpListener, inner: Arc<Inner>) {
    let mut shutdown_rx = inner.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    if inner.connections.read().await.len() >= inner.config.max_connections {
                        tracing::warn!(
                            "refusing connection from {}: {} connections already accepted",
                            peer_addr,
                            inner.config.max_connections
                        );
                        drop(stream);
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    tracing::debug!("accepted connection from {}", peer_addr);
                    let weak: Weak<Inner> = Arc::downgrade(&inner);
                    let connection = ServerConnection::start(
                        Box::new(stream),
                        peer_addr,
                        &inner.config,
                        // The close path is synchronous; hop to a task for
                        // the async table update.
                        Box::new(move || {
                            if let Some(inner) = weak.upgrade() {
                                tokio::spawn(async move {
                                    inner.connections.write().await.remove(&peer_addr);
                                });
                            }
                        }),
                    );
                    inner.register(connection).await;
                }
                Err(error) => {
                    tracing::warn!("accept failed: {}", error);
                }
            },
        }
    }
}
