//! The in-flight request table.
//!
//! Maps stream ids to pending requests. Insertion happens on the outbound
//! path (assigning a managed id when the caller passed the 0 sentinel),
//! delivery on the inbound path. A request ends on its terminal frame, on
//! inactivity timeout, on pending-queue overflow or when the connection
//! closes; whichever comes first releases the managed id back to the pool.

use crate::error::{ConnectionError, RequestError, Result};
use crate::streampool::StreamIdPool;
use cqlframe::message::{Message, ResultBody};
use cqlframe::Frame;
use cqlwire::streamid::MANAGED_STREAM_ID;
use cqlwire::StreamId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;

/// A response frame is terminal unless it is an intermediate continuous
/// paging page (same stream id stays live for the following pages).
fn is_terminal(frame: &Frame) -> bool {
    match &frame.message {
        Message::Result(ResultBody::Rows(rows)) => !rows.has_more_continuous_pages(),
        _ => true,
    }
}

#[derive(Default)]
struct Shared {
    done: AtomicBool,
    error: Mutex<Option<RequestError>>,
}

impl Shared {
    fn finish(&self, error: Option<RequestError>) {
        if let Some(error) = error {
            *self.error.lock().expect("request state poisoned") = Some(error);
        }
        self.done.store(true, Ordering::SeqCst);
    }
}

/// Caller-side handle to one outstanding request.
pub struct InFlightRequest {
    stream_id: StreamId,
    managed: bool,
    rx: tokio::sync::Mutex<mpsc::Receiver<Frame>>,
    shared: Arc<Shared>,
}

impl InFlightRequest {
    /// The id actually written to the wire (never 0).
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn is_done(&self) -> bool {
        self.shared.done.load(Ordering::SeqCst)
    }

    /// Terminal error, if the request ended abnormally.
    pub fn error(&self) -> Option<RequestError> {
        *self.shared.error.lock().expect("request state poisoned")
    }

    /// Next response frame; `None` once the request is complete (or failed;
    /// check [`error`](Self::error) to tell the two apart).
    pub async fn incoming(&self) -> Option<Frame> {
        self.rx.lock().await.recv().await
    }

    /// Awaits the single response of a non-paging request.
    pub async fn response(&self) -> Result<Frame> {
        match self.incoming().await {
            Some(frame) => Ok(frame),
            None => Err(self.error().unwrap_or(RequestError::Closed).into()),
        }
    }
}

struct Entry {
    tx: mpsc::Sender<Frame>,
    shared: Arc<Shared>,
    managed: bool,
    deadline: Instant,
}

pub struct InFlightTable {
    entries: RwLock<HashMap<StreamId, Entry>>,
    pool: StreamIdPool,
    max_in_flight: usize,
    max_pending: usize,
    read_timeout: Duration,
}

impl InFlightTable {
    pub fn new(max_in_flight: usize, max_pending: usize, read_timeout: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            pool: StreamIdPool::new(max_in_flight),
            max_in_flight,
            max_pending,
            read_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn ids(&self) -> Vec<StreamId> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Registers an outbound request, assigning a managed id when the
    /// header carries the 0 sentinel.
    pub async fn on_outgoing(&self, frame: &mut Frame) -> Result<InFlightRequest> {
        let managed = frame.header.stream_id == MANAGED_STREAM_ID;
        let stream_id = if managed {
            self.pool.borrow()?
        } else {
            frame.header.stream_id
        };

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_in_flight {
            if managed {
                self.pool.release(stream_id);
            }
            return Err(ConnectionError::InFlightTableFull(self.max_in_flight));
        }
        if entries.contains_key(&stream_id) {
            if managed {
                self.pool.release(stream_id);
            }
            return Err(ConnectionError::DuplicateStreamId(stream_id));
        }

        frame.header.stream_id = stream_id;
        let (tx, rx) = mpsc::channel(self.max_pending);
        let shared = Arc::new(Shared::default());
        entries.insert(
            stream_id,
            Entry {
                tx,
                shared: Arc::clone(&shared),
                managed,
                deadline: Instant::now() + self.read_timeout,
            },
        );
        Ok(InFlightRequest {
            stream_id,
            managed,
            rx: tokio::sync::Mutex::new(rx),
            shared,
        })
    }

    /// Delivers an inbound response frame to its request, applying the
    /// terminal-frame rule and per-request backpressure.
    pub async fn on_incoming(&self, frame: Frame) {
        let stream_id = frame.header.stream_id;
        let terminal = is_terminal(&frame);
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&stream_id) else {
            tracing::warn!(
                "dropping response frame for unknown stream id {} ({})",
                stream_id,
                frame.opcode()
            );
            return;
        };

        if entry.tx.try_send(frame).is_err() {
            tracing::warn!(
                "request {} exceeded {} pending frames, closing it",
                stream_id,
                self.max_pending
            );
            let entry = entries.remove(&stream_id).expect("entry present");
            entry.shared.finish(Some(RequestError::TooManyPending));
            if entry.managed {
                self.pool.release(stream_id);
            }
            return;
        }

        entry.deadline = Instant::now() + self.read_timeout;
        if terminal {
            let entry = entries.remove(&stream_id).expect("entry present");
            entry.shared.finish(None);
            if entry.managed {
                self.pool.release(stream_id);
            }
        }
    }

    /// Drops a request that was registered but never made it onto the wire
    /// (outbound queue full).
    pub async fn abort(&self, stream_id: StreamId) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.remove(&stream_id) {
            entry.shared.finish(Some(RequestError::Closed));
            if entry.managed {
                self.pool.release(stream_id);
            }
        }
    }

    /// Fails every request whose inactivity deadline has passed. The
    /// connection stays up.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let expired: Vec<StreamId> = entries
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for stream_id in expired {
            let entry = entries.remove(&stream_id).expect("entry present");
            tracing::debug!("request {} timed out", stream_id);
            entry.shared.finish(Some(RequestError::TimedOut));
            if entry.managed {
                self.pool.release(stream_id);
            }
        }
    }

    /// Fails every outstanding request; used on connection teardown.
    pub async fn close_all(&self) {
        let mut entries = self.entries.write().await;
        for (stream_id, entry) in entries.drain() {
            entry.shared.finish(Some(RequestError::Closed));
            if entry.managed {
                self.pool.release(stream_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqlframe::message::result::{Rows, RowsMetadata};
    use cqlframe::message::{ErrorBody, Query};
    use cqlwire::ProtocolVersion;

    fn table() -> InFlightTable {
        InFlightTable::new(4, 2, Duration::from_secs(30))
    }

    fn request_frame(stream_id: StreamId) -> Frame {
        Frame::new(
            ProtocolVersion::V4,
            stream_id,
            Message::Query(Query::new("SELECT 1")),
        )
    }

    fn response_frame(stream_id: StreamId) -> Frame {
        Frame::new(
            ProtocolVersion::V4,
            stream_id,
            Message::Result(ResultBody::Void),
        )
    }

    fn paging_frame(stream_id: StreamId, page: i32, last: bool) -> Frame {
        Frame::new(
            ProtocolVersion::Dse2,
            stream_id,
            Message::Result(ResultBody::Rows(Rows {
                metadata: RowsMetadata {
                    continuous_page_number: Some(page),
                    last_continuous_page: last,
                    ..Default::default()
                },
                data: Vec::new(),
            })),
        )
    }

    #[tokio::test]
    async fn test_managed_id_assignment() {
        let table = table();
        let mut frame = request_frame(0);
        let request = table.on_outgoing(&mut frame).await.unwrap();
        assert_ne!(frame.header.stream_id, 0);
        assert_eq!(request.stream_id(), frame.header.stream_id);
        assert!(request.is_managed());
        assert_eq!(table.len().await, 1);
    }

    #[tokio::test]
    async fn test_explicit_id_kept() {
        let table = table();
        let mut frame = request_frame(99);
        let request = table.on_outgoing(&mut frame).await.unwrap();
        assert_eq!(request.stream_id(), 99);
        assert!(!request.is_managed());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let table = table();
        let _first = table.on_outgoing(&mut request_frame(7)).await.unwrap();
        assert!(matches!(
            table.on_outgoing(&mut request_frame(7)).await,
            Err(ConnectionError::DuplicateStreamId(7))
        ));
    }

    #[tokio::test]
    async fn test_terminal_frame_completes_request() {
        let table = table();
        let mut frame = request_frame(0);
        let request = table.on_outgoing(&mut frame).await.unwrap();
        table.on_incoming(response_frame(request.stream_id())).await;
        assert!(table.is_empty().await);

        let response = request.incoming().await.unwrap();
        assert_eq!(response.opcode(), cqlwire::Opcode::Result);
        assert!(request.incoming().await.is_none());
        assert!(request.is_done());
        assert!(request.error().is_none());
    }

    #[tokio::test]
    async fn test_continuous_paging_keeps_request_open() {
        let table = table();
        let mut frame = request_frame(0);
        let request = table.on_outgoing(&mut frame).await.unwrap();
        let id = request.stream_id();

        table.on_incoming(paging_frame(id, 1, false)).await;
        assert_eq!(table.len().await, 1);
        assert!(!request.is_done());

        table.on_incoming(paging_frame(id, 2, true)).await;
        assert!(table.is_empty().await);

        assert!(request.incoming().await.is_some());
        assert!(request.incoming().await.is_some());
        assert!(request.incoming().await.is_none());
        assert!(request.is_done());
    }

    #[tokio::test]
    async fn test_pending_overflow_fails_request() {
        let table = table();
        let mut frame = request_frame(0);
        let request = table.on_outgoing(&mut frame).await.unwrap();
        let id = request.stream_id();

        // max_pending is 2; the queue only drains when the caller reads.
        table.on_incoming(paging_frame(id, 1, false)).await;
        table.on_incoming(paging_frame(id, 2, false)).await;
        table.on_incoming(paging_frame(id, 3, false)).await;

        assert_eq!(request.error(), Some(RequestError::TooManyPending));
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_pool_exhaustion_and_recycling() {
        let table = table();
        let mut requests = Vec::new();
        for _ in 0..4 {
            requests.push(table.on_outgoing(&mut request_frame(0)).await.unwrap());
        }
        assert!(matches!(
            table.on_outgoing(&mut request_frame(0)).await,
            Err(ConnectionError::NoStreamId)
        ));

        let ids: std::collections::HashSet<_> =
            requests.iter().map(InFlightRequest::stream_id).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.iter().all(|id| (1..=4).contains(id)));

        table.on_incoming(response_frame(requests[0].stream_id())).await;
        assert!(table.on_outgoing(&mut request_frame(0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_times_out_idle_requests() {
        let table = InFlightTable::new(4, 2, Duration::from_millis(10));
        let request = table.on_outgoing(&mut request_frame(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        table.sweep().await;
        assert!(table.is_empty().await);
        assert_eq!(request.error(), Some(RequestError::TimedOut));
        assert!(request.incoming().await.is_none());
    }

    #[tokio::test]
    async fn test_close_all_fails_requests_with_closed() {
        let table = table();
        let request = table.on_outgoing(&mut request_frame(0)).await.unwrap();
        table.close_all().await;
        assert_eq!(request.error(), Some(RequestError::Closed));
        let err = request.response().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Request(RequestError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_stream_id_dropped() {
        let table = table();
        // Must not panic or create state.
        table.on_incoming(response_frame(55)).await;
        table
            .on_incoming(Frame::new(
                ProtocolVersion::V4,
                56,
                Message::Error(ErrorBody::new(0, "late")),
            ))
            .await;
        assert!(table.is_empty().await);
    }
}
