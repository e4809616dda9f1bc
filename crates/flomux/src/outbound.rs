// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session outbound queue with drop-oldest backpressure.
//!
//! Fan-out never blocks: the dispatcher pushes, a writer task drains.
//! When a slow consumer lets the queue grow past its byte ceiling the
//! oldest pending blobs are dropped and counted, so one stalled client
//! cannot hold back delivery to anyone else.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default ceiling on queued-but-unwritten bytes per session (64 MiB).
pub const DEFAULT_QUEUE_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Default)]
struct QueueState {
    chunks: VecDeque<Bytes>,
    queued_bytes: usize,
    dropped: u64,
    closed: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
    limit: usize,
}

/// Cloneable handle to one session's outbound FIFO.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    inner: Arc<Inner>,
}

impl OutboundQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                limit: limit.max(1),
            }),
        }
    }

    /// Append a blob. Never blocks and never reorders; beyond the byte
    /// ceiling the oldest pending blobs are evicted first.
    pub fn push(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.queued_bytes += chunk.len();
            state.chunks.push_back(chunk);
            // Evict from the front, but never the blob just pushed: a
            // single blob above the ceiling still has to get through.
            while state.queued_bytes > self.inner.limit && state.chunks.len() > 1 {
                if let Some(old) = state.chunks.pop_front() {
                    state.queued_bytes -= old.len();
                    state.dropped += 1;
                }
            }
        }
        self.inner.notify.notify_one();
    }

    /// Wait for the next blob. Returns `None` once the queue is closed
    /// and fully drained.
    pub async fn next(&self) -> Option<Bytes> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.inner.state.lock();
                if let Some(chunk) = state.chunks.pop_front() {
                    state.queued_bytes -= chunk.len();
                    return Some(chunk);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking pop; `None` means currently empty (not closed).
    pub fn try_next(&self) -> Option<Bytes> {
        let mut state = self.inner.state.lock();
        let chunk = state.chunks.pop_front()?;
        state.queued_bytes -= chunk.len();
        Some(chunk)
    }

    /// Close the queue. Pending blobs remain drainable; further pushes
    /// are discarded. Safe to call twice.
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.notify.notify_waiters();
    }

    pub fn queued_bytes(&self) -> usize {
        self.inner.state.lock().queued_bytes
    }

    /// Blobs evicted by backpressure since creation.
    pub fn dropped(&self) -> u64 {
        self.inner.state.lock().dropped
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
