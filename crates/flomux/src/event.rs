// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use tokio::net::TcpStream;

/// Stable identifier for one network session. Subscription sets key on
/// this, never on connection handles, so removal is exact even after
/// the handle has been passed around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Everything that reaches the dispatcher. Session tasks produce these;
/// the dispatcher consumes them serially, which is what keeps its
/// tables free of locks.
#[derive(Debug)]
pub enum DispatchEvent {
    /// One complete encoded record extracted from a serial line.
    Frame { port: String, frame: Bytes },
    /// A freshly accepted TCP connection.
    Connected { stream: TcpStream, peer: SocketAddr },
    /// One whitespace-tokenized command line from a client.
    Line { client: ClientId, sentence: Vec<String> },
    /// A client hit EOF or an I/O error, or was told to go away.
    Disconnected { client: ClientId },
    /// A serial device stopped responding for good.
    PortDead { port: String, error: String },
}
