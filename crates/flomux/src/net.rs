// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network sessions: line-oriented command input, raw-byte output.
//!
//! Each accepted connection becomes two tasks. The reader splits
//! newline-delimited lines, strips a trailing carriage return, and
//! forwards whitespace-tokenized sentences to the dispatcher. The
//! writer drains the session's outbound queue. Either side failing
//! reports a disconnect; the dispatcher owns the actual teardown.

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::event::{ClientId, DispatchEvent};
use crate::outbound::OutboundQueue;

/// Longest accepted command line. Anything longer is a protocol error
/// and disconnects the client.
pub const MAX_LINE: usize = 8192;

/// Split one client line into a sentence of tokens.
pub fn tokenize(line: &str) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    line.split_whitespace().map(str::to_owned).collect()
}

pub fn spawn_reader(
    id: ClientId,
    read_half: OwnedReadHalf,
    events: mpsc::Sender<DispatchEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE));
        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = lines.next() => item,
            };
            match item {
                Some(Ok(line)) => {
                    let sentence = tokenize(&line);
                    if events.send(DispatchEvent::Line { client: id, sentence }).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    debug!(%id, error = %e, "client read error");
                    break;
                }
                None => break,
            }
        }
        let _ = events.send(DispatchEvent::Disconnected { client: id }).await;
    });
}

pub fn spawn_writer(
    id: ClientId,
    mut write_half: OwnedWriteHalf,
    queue: OutboundQueue,
    events: mpsc::Sender<DispatchEvent>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = queue.next() => match chunk {
                    Some(chunk) => chunk,
                    None => break,
                },
            };
            if let Err(e) = write_half.write_all(&chunk).await {
                debug!(%id, error = %e, "client write error");
                let _ = events.send(DispatchEvent::Disconnected { client: id }).await;
                return;
            }
        }
        let _ = write_half.shutdown().await;
    });
}

#[cfg(test)]
#[path = "net_tests.rs"]
mod tests;
