// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serial sessions: one port per flopoint device, owned for the life of
//! the process.
//!
//! Each session is a small set of tasks around one shared port handle:
//! a read loop feeding the frame decoder, a write loop draining the
//! outbound queue, and (for the test roles) a generator pacing mock
//! frames into that queue. Counters are shared atomics so the
//! dispatcher can answer `get rx` and friends without round-trips.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serial2_tokio::SerialPort;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decode::FrameDecoder;
use crate::event::DispatchEvent;
use crate::logfile::AppendLog;
use crate::outbound::OutboundQueue;
use crate::wavegen::WaveGen;
use crate::wire::WireCodec;

/// Upper bound on one serial read completion.
pub const READ_CHUNK: usize = 2048;

const BACKOFF_FLOOR: Duration = Duration::from_millis(10);
const BACKOFF_CEILING: Duration = Duration::from_secs(1);

/// What a configured port does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialRole {
    PollRead,
    ReadWrite,
    ReadWriteTest,
    WriteTest,
    Write,
}

impl SerialRole {
    pub fn reads(self) -> bool {
        matches!(self, Self::PollRead | Self::ReadWrite | Self::ReadWriteTest)
    }

    pub fn writes(self) -> bool {
        !matches!(self, Self::PollRead)
    }

    pub fn test_writes(self) -> bool {
        matches!(self, Self::ReadWriteTest | Self::WriteTest)
    }

    /// Whether reads are bounded by the polling timer.
    pub fn polls(self) -> bool {
        matches!(self, Self::PollRead)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PollRead => "poll-read",
            Self::ReadWrite => "read-write",
            Self::ReadWriteTest => "read-write-test",
            Self::WriteTest => "write-test",
            Self::Write => "write",
        }
    }
}

/// Per-port counters, updated by the session tasks and read by the
/// dispatcher's command actions.
#[derive(Debug, Default)]
pub struct SerialStats {
    rx_bytes: AtomicU64,
    tx_bytes: AtomicU64,
    messages_received_tot: AtomicU64,
    messages_lost_tot: AtomicU64,
    dead: AtomicBool,
}

impl SerialStats {
    pub fn add_rx(&self, n: u64) {
        self.rx_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_tx(&self, n: u64) {
        self.tx_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_received(&self, n: u64) {
        self.messages_received_tot.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_lost(&self, n: u64) {
        self.messages_lost_tot.fetch_add(n, Ordering::Relaxed);
    }

    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }

    pub fn messages_received_tot(&self) -> u64 {
        self.messages_received_tot.load(Ordering::Relaxed)
    }

    pub fn messages_lost_tot(&self) -> u64 {
        self.messages_lost_tot.load(Ordering::Relaxed)
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }
}

/// The dispatcher's view of one serial session.
pub struct SerialHandle {
    pub name: String,
    pub role: SerialRole,
    pub stats: Arc<SerialStats>,
    /// Present iff the role writes.
    pub queue: Option<OutboundQueue>,
}

impl SerialHandle {
    /// Handle with no backing device, for dispatcher tests.
    pub fn detached(name: impl Into<String>, role: SerialRole) -> Self {
        let queue = role.writes().then(|| OutboundQueue::new(crate::outbound::DEFAULT_QUEUE_LIMIT));
        Self { name: name.into(), role, stats: Arc::new(SerialStats::default()), queue }
    }

    /// Append a blob to the port's outbound queue. No-op for read-only
    /// roles.
    pub fn enqueue_write(&self, chunk: bytes::Bytes) {
        if let Some(ref queue) = self.queue {
            queue.push(chunk);
        }
    }
}

/// Everything needed to bring one port up.
pub struct SerialConfig {
    pub device: String,
    pub role: SerialRole,
    pub baud: u32,
    pub poll_interval: Duration,
    pub test_interval: Duration,
    pub test_samples: usize,
    pub sources: Vec<String>,
    pub log_dir: Option<PathBuf>,
    pub queue_limit: usize,
}

/// Open the device and start the session tasks for its role.
pub fn spawn(
    config: SerialConfig,
    codec: Arc<dyn WireCodec>,
    events: mpsc::Sender<DispatchEvent>,
    shutdown: CancellationToken,
) -> anyhow::Result<SerialHandle> {
    let port = Arc::new(
        SerialPort::open(&config.device, config.baud)
            .with_context(|| format!("failed to open serial device {}", config.device))?,
    );
    let stats = Arc::new(SerialStats::default());
    let queue = config.role.writes().then(|| OutboundQueue::new(config.queue_limit));

    if config.role.reads() {
        let raw_log = AppendLog::for_device(config.log_dir.as_deref(), &config.device);
        let poll = config.role.polls().then_some(config.poll_interval);
        tokio::spawn(read_loop(
            Arc::clone(&port),
            config.device.clone(),
            poll,
            FrameDecoder::new(codec),
            Arc::clone(&stats),
            events,
            shutdown.clone(),
            raw_log,
        ));
    }

    if let Some(ref queue) = queue {
        tokio::spawn(write_loop(
            Arc::clone(&port),
            config.device.clone(),
            queue.clone(),
            Arc::clone(&stats),
            shutdown.clone(),
        ));
    }

    if config.role.test_writes() {
        if let Some(ref queue) = queue {
            let seed = config.device.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
            let generator = WaveGen::new(config.sources.clone(), config.test_samples, seed);
            tokio::spawn(generate_loop(queue.clone(), generator, config.test_interval, shutdown));
        }
    }

    Ok(SerialHandle { name: config.device, role: config.role, stats, queue })
}

/// One read completion, bounded by the poll interval when polling.
/// `Ok(None)` means the poll expired with nothing buffered; the timeout
/// drops the pending read, which is what keeps latency bounded.
async fn read_once(
    port: &SerialPort,
    buf: &mut [u8],
    poll: Option<Duration>,
) -> std::io::Result<Option<usize>> {
    match poll {
        Some(limit) => match timeout(limit, port.read(buf)).await {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        },
        None => port.read(buf).await.map(Some),
    }
}

#[allow(clippy::too_many_arguments)]
async fn read_loop(
    port: Arc<SerialPort>,
    name: String,
    poll: Option<Duration>,
    mut decoder: FrameDecoder,
    stats: Arc<SerialStats>,
    events: mpsc::Sender<DispatchEvent>,
    shutdown: CancellationToken,
    raw_log: AppendLog,
) {
    let mut buf = vec![0u8; READ_CHUNK];
    let mut backoff = BACKOFF_FLOOR;
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = read_once(&port, &mut buf, poll) => result,
        };
        match result {
            Ok(None) => continue,
            Ok(Some(0)) => {
                warn!(port = %name, "serial device closed the line");
                stats.mark_dead();
                let _ = events
                    .send(DispatchEvent::PortDead { port: name, error: "end of stream".to_owned() })
                    .await;
                break;
            }
            Ok(Some(n)) => {
                backoff = BACKOFF_FLOOR;
                stats.add_rx(n as u64);
                raw_log.append(&buf[..n]);
                let extracted = decoder.feed(&buf[..n]);
                stats.add_lost(extracted.lost);
                stats.add_received(extracted.frames.len() as u64);
                for frame in extracted.frames {
                    let event = DispatchEvent::Frame { port: name.clone(), frame };
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            Err(ref e) if is_transient(e) => {
                debug!(port = %name, error = %e, "transient serial read error");
                sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_CEILING);
            }
            Err(e) => {
                warn!(port = %name, error = %e, "fatal serial read error");
                stats.mark_dead();
                let _ = events
                    .send(DispatchEvent::PortDead { port: name, error: e.to_string() })
                    .await;
                break;
            }
        }
    }
}

async fn write_loop(
    port: Arc<SerialPort>,
    name: String,
    queue: OutboundQueue,
    stats: Arc<SerialStats>,
    shutdown: CancellationToken,
) {
    loop {
        let chunk = tokio::select! {
            _ = shutdown.cancelled() => break,
            chunk = queue.next() => match chunk {
                Some(chunk) => chunk,
                None => break,
            },
        };
        let mut offset = 0;
        while offset < chunk.len() {
            match port.write(&chunk[offset..]).await {
                Ok(0) => {
                    warn!(port = %name, "serial device stopped accepting writes");
                    stats.mark_dead();
                    return;
                }
                Ok(n) => {
                    offset += n;
                    stats.add_tx(n as u64);
                }
                Err(ref e) if is_transient(e) => {
                    debug!(port = %name, error = %e, "transient serial write error");
                    sleep(BACKOFF_FLOOR).await;
                }
                Err(e) => {
                    warn!(port = %name, error = %e, "fatal serial write error");
                    stats.mark_dead();
                    return;
                }
            }
        }
    }
}

/// Pace synthetic frames into the port's outbound queue. Missed ticks
/// are delayed rather than burst so the pacing holds under load.
async fn generate_loop(
    queue: OutboundQueue,
    mut generator: WaveGen,
    pace: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(pace);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => queue.push(generator.next_frame()),
        }
    }
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

#[cfg(test)]
#[path = "serial_tests.rs"]
mod tests;
