// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon runner — shared by `main` and the end-to-end tests.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::event::DispatchEvent;
use crate::serial::{self, SerialConfig};
use crate::wire::{FloCodec, WireCodec};

/// A fully prepared daemon that has bound its listener and spawned its
/// sessions but not yet consumed the caller.
///
/// Tests use the pieces directly: `events` injects frames as if a board
/// had sent them, `local_addr` is where to connect, and `shutdown`
/// triggers the same graceful exit as a signal.
pub struct Daemon {
    pub events: mpsc::Sender<DispatchEvent>,
    pub local_addr: std::net::SocketAddr,
    pub shutdown: CancellationToken,
    dispatcher_task: JoinHandle<()>,
}

impl Daemon {
    /// Wait for the dispatcher to finish (i.e. for shutdown).
    pub async fn wait(self) -> anyhow::Result<()> {
        self.dispatcher_task.await?;
        Ok(())
    }
}

/// Run the daemon to completion.
pub async fn run(config: Config) -> anyhow::Result<()> {
    prepare(config).await?.wait().await
}

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    // Priority: --log-level / FLOMUX_LOG_LEVEL > RUST_LOG > default ("info").
    let filter = if std::env::var("FLOMUX_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Prepare a daemon: open serial sessions, build the dispatcher and its
/// command tree, bind the listener, and start all the tasks.
pub async fn prepare(config: Config) -> anyhow::Result<Daemon> {
    init_tracing(&config);

    let shutdown = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel::<DispatchEvent>(1024);
    let codec: Arc<dyn WireCodec> = Arc::new(FloCodec);

    let mut dispatcher = Dispatcher::new(
        DispatcherSettings {
            channels: config.channel_names(),
            ring_capacity: config.ring_capacity,
            queue_limit: config.queue_limit,
            log_dir: config.log_dir.clone(),
        },
        Arc::clone(&codec),
        events_tx.clone(),
    );

    // Serial sessions live for the whole process; a device that cannot
    // be opened is a startup failure, not something to limp past.
    for (device, role) in config.port_plan() {
        let handle = serial::spawn(
            SerialConfig {
                device,
                role,
                baud: config.baud,
                poll_interval: config.poll_interval(),
                test_interval: config.test_interval(),
                test_samples: config.test_samples,
                sources: config.source_names(),
                log_dir: config.log_dir.clone(),
                queue_limit: config.queue_limit,
            },
            Arc::clone(&codec),
            events_tx.clone(),
            shutdown.clone(),
        )?;
        dispatcher.add_port(handle);
    }

    dispatcher.build_command_tree();

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;
    info!("listening on {local_addr}");

    // Accept loop: hand every connection to the dispatcher as an event.
    {
        let events = events_tx.clone();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sd.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            if events.send(DispatchEvent::Connected { stream, peer }).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            debug!("accept error: {e}");
                        }
                    },
                }
            }
        });
    }

    // Spawn signal handler
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            // First signal: graceful shutdown
            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT");
                }
            }
            sd.cancel();

            // Second signal: force exit
            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGTERM again, forcing exit");
                }
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {
                    info!("received SIGINT again, forcing exit");
                }
            }
            std::process::exit(130);
        });
    }

    let dispatcher_task = {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            dispatcher.run(events_rx, sd).await;
        })
    };

    Ok(Daemon { events: events_tx, local_addr, shutdown, dispatcher_task })
}
