//! Bounded pool of managed stream ids.
//!
//! A bounded channel preloaded with `1..=max_in_flight` is the pool: borrow
//! is a non-blocking receive, release a non-blocking send. The managed
//! sentinel 0 is never loaded, so an assigned id can never collide with it.

use crate::error::{ConnectionError, Result};
use cqlwire::StreamId;
use std::sync::Mutex;
use tokio::sync::mpsc;

pub struct StreamIdPool {
    tx: mpsc::Sender<StreamId>,
    rx: Mutex<mpsc::Receiver<StreamId>>,
}

impl StreamIdPool {
    /// Preloads ids `1..=max_in_flight`.
    pub fn new(max_in_flight: usize) -> Self {
        let (tx, rx) = mpsc::channel(max_in_flight);
        for id in 1..=max_in_flight {
            tx.try_send(id as StreamId)
                .expect("pool channel sized to hold every id");
        }
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Takes the next free id, failing immediately when the pool is drained.
    pub fn borrow(&self) -> Result<StreamId> {
        let mut rx = self.rx.lock().expect("stream id pool poisoned");
        rx.try_recv().map_err(|_| ConnectionError::NoStreamId)
    }

    /// Returns an id to the pool.
    pub fn release(&self, id: StreamId) {
        debug_assert_ne!(id, 0, "sentinel id must never enter the pool");
        if self.tx.try_send(id).is_err() {
            // Only reachable if an id is released twice.
            tracing::warn!("stream id {} released into a full pool", id);
        }
    }
}
