// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, scripted codecs, and helpers.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::event::{ClientId, DispatchEvent};
use crate::outbound::OutboundQueue;
use crate::wire::{encode_frame, FloCodec, WaveRecord, WireCodec};

/// Encode a record the way a board would frame it.
pub fn frame(name: &str, samples: &[i32]) -> Bytes {
    encode_frame(&WaveRecord { name: name.to_owned(), samples: samples.to_vec() })
}

/// Builder for a [`Dispatcher`] wired to in-memory sessions.
pub struct DispatcherBuilder {
    channels: Vec<String>,
    ring_capacity: usize,
    queue_limit: usize,
    codec: Arc<dyn WireCodec>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            channels: default_channels(),
            ring_capacity: 16,
            queue_limit: crate::outbound::DEFAULT_QUEUE_LIMIT,
            codec: Arc::new(FloCodec),
        }
    }

    pub fn ring_capacity(mut self, n: usize) -> Self {
        self.ring_capacity = n;
        self
    }

    pub fn queue_limit(mut self, n: usize) -> Self {
        self.queue_limit = n;
        self
    }

    pub fn channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    /// Build the dispatcher plus the receiver end of its event channel
    /// (unused by most tests, but some assert on emitted events).
    pub fn build(self) -> (Dispatcher, mpsc::Receiver<DispatchEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let dispatcher = Dispatcher::new(
            DispatcherSettings {
                channels: self.channels,
                ring_capacity: self.ring_capacity,
                queue_limit: self.queue_limit,
                log_dir: None,
            },
            self.codec,
            events_tx,
        );
        (dispatcher, events_rx)
    }
}

/// The channel table most tests want.
pub fn default_channels() -> Vec<String> {
    let mut channels = vec![
        "raw_waveforms".to_owned(),
        "ascii_waveforms".to_owned(),
        "protobuf_all".to_owned(),
    ];
    channels.extend(crate::wavegen::default_source_names());
    channels
}

/// Attach a socketless client and hand back its outbound queue.
pub fn attach_client(dispatcher: &mut Dispatcher) -> (ClientId, OutboundQueue) {
    let queue = OutboundQueue::new(dispatcher.queue_limit());
    let id = dispatcher.attach_client(
        queue.clone(),
        "test:0".to_owned(),
        CancellationToken::new(),
    );
    (id, queue)
}

/// Drain everything currently queued into one buffer.
pub fn drain(queue: &OutboundQueue) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = queue.try_next() {
        out.extend_from_slice(&chunk);
    }
    out
}

/// Run one sentence through the dispatcher for `client`.
pub fn send_line(dispatcher: &mut Dispatcher, client: ClientId, line: &str) {
    let sentence = crate::net::tokenize(line);
    dispatcher.handle_line(client, &sentence);
}
