// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The dispatcher: single owner of sessions, subscriptions, the recent
//! message ring, and the command tree.
//!
//! It runs as one actor task consuming [`DispatchEvent`]s. Every handler
//! is synchronous, so table mutation can never interleave with itself:
//! that is the whole concurrency story, no locks required. Anything
//! that would block (socket writes, serial writes) goes through a
//! session's outbound queue instead.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Action, CommandTree};
use crate::event::{ClientId, DispatchEvent};
use crate::logfile::DispatchLog;
use crate::net;
use crate::outbound::OutboundQueue;
use crate::ring::MessageRing;
use crate::serial::{SerialHandle, SerialStats};
use crate::wire::{self, Parse, WireCodec};

/// Construction parameters not derivable from the session set.
pub struct DispatcherSettings {
    /// Fan-out channels, frozen for the life of the dispatcher.
    pub channels: Vec<String>,
    pub ring_capacity: usize,
    /// Byte ceiling per network subscriber queue.
    pub queue_limit: usize,
    pub log_dir: Option<PathBuf>,
}

/// One registered network session.
struct ClientHandle {
    peer: String,
    queue: OutboundQueue,
    cancel: CancellationToken,
    connected_at: Instant,
}

pub struct Dispatcher {
    codec: Arc<dyn WireCodec>,
    /// Serial sessions in registration order (the order is part of the
    /// Zabbix discovery document).
    ports: IndexMap<String, SerialHandle>,
    clients: HashMap<ClientId, ClientHandle>,
    /// Channel name to subscriber set. Keys are fixed at construction;
    /// only the sets change.
    subscriptions: IndexMap<String, HashSet<ClientId>>,
    ring: MessageRing,
    tree: CommandTree,
    log: DispatchLog,
    queue_limit: usize,
    next_client: u64,
    events: mpsc::Sender<DispatchEvent>,
}

impl Dispatcher {
    pub fn new(
        settings: DispatcherSettings,
        codec: Arc<dyn WireCodec>,
        events: mpsc::Sender<DispatchEvent>,
    ) -> Self {
        let mut subscriptions = IndexMap::new();
        for channel in settings.channels {
            subscriptions.entry(channel).or_insert_with(HashSet::new);
        }
        Self {
            codec,
            ports: IndexMap::new(),
            clients: HashMap::new(),
            subscriptions,
            ring: MessageRing::new(settings.ring_capacity),
            tree: CommandTree::new(),
            log: DispatchLog::new(settings.log_dir.as_deref()),
            queue_limit: settings.queue_limit,
            next_client: 0,
            events,
        }
    }

    /// Register a serial session. Call [`Self::build_command_tree`] once
    /// all ports are in.
    pub fn add_port(&mut self, handle: SerialHandle) {
        info!(port = %handle.name, role = handle.role.as_str(), "serial session registered");
        self.ports.insert(handle.name.clone(), handle);
    }

    /// Consume events until shutdown, then tear down every client.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<DispatchEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
            }
        }
        let ids: Vec<ClientId> = self.clients.keys().copied().collect();
        for id in ids {
            self.remove_client(id);
        }
        debug!("dispatcher stopped");
    }

    /// Process one event. Must never suspend; see the module docs.
    pub fn handle(&mut self, event: DispatchEvent) {
        match event {
            DispatchEvent::Frame { frame, .. } => self.deliver(frame),
            DispatchEvent::Connected { stream, peer } => self.register_client(stream, peer),
            DispatchEvent::Line { client, sentence } => self.handle_line(client, &sentence),
            DispatchEvent::Disconnected { client } => self.remove_client(client),
            DispatchEvent::PortDead { port, error } => {
                warn!(%port, %error, "serial session died; keeping it registered");
            }
        }
    }

    // -- network session lifecycle -------------------------------------------

    /// Wrap an accepted connection in a session: register it and start
    /// its reader and writer tasks.
    pub fn register_client(&mut self, stream: TcpStream, peer: SocketAddr) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let queue = OutboundQueue::new(self.queue_limit);
        let cancel = CancellationToken::new();
        let id = self.attach_client(queue.clone(), peer.to_string(), cancel.clone());
        net::spawn_reader(id, read_half, self.events.clone(), cancel.clone());
        net::spawn_writer(id, write_half, queue, self.events.clone(), cancel);
        info!(%id, %peer, "client connected");
    }

    /// Register a session given only its outbound queue. Split from
    /// [`Self::register_client`] so tests can attach sessions without a
    /// socket.
    pub fn attach_client(
        &mut self,
        queue: OutboundQueue,
        peer: String,
        cancel: CancellationToken,
    ) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        self.clients.insert(id, ClientHandle { peer, queue, cancel, connected_at: Instant::now() });
        id
    }

    /// Drop a session: cancel its I/O, close its queue, and clear it
    /// from every subscription set. Idempotent, because the reader and
    /// writer tasks may both report the same disconnect.
    pub fn remove_client(&mut self, id: ClientId) {
        let Some(handle) = self.clients.remove(&id) else {
            return;
        };
        handle.cancel.cancel();
        handle.queue.close();
        for subscribers in self.subscriptions.values_mut() {
            subscribers.remove(&id);
        }
        info!(
            %id,
            peer = %handle.peer,
            uptime_secs = handle.connected_at.elapsed().as_secs(),
            "client removed"
        );
    }

    // -- delivery ------------------------------------------------------------

    /// Route one encoded record: ring first, then per-channel fan-out.
    ///
    /// Fan-out is best-effort. A slow subscriber only grows (and
    /// eventually truncates) its own queue; nobody else notices.
    pub fn deliver(&mut self, frame: Bytes) {
        let record = match self.codec.parse(&frame) {
            Parse::Frame { record, .. } => record,
            _ => {
                debug!(len = frame.len(), "dropping frame the codec refused");
                self.log.failure(&format!("could not parse frame ({} bytes)", frame.len()));
                return;
            }
        };
        self.ring.push(frame.clone());
        self.fan_out("raw_waveforms", || Bytes::from(raw_waveform(&record.samples)));
        self.fan_out("ascii_waveforms", || Bytes::from(ascii_waveform(&record.samples)));
        self.fan_out("protobuf_all", || frame.clone());
        self.fan_out(&record.name, || frame.clone());
        self.log.message(&record);
    }

    /// Enqueue `make()` to every subscriber of `channel`. The payload is
    /// only rendered when someone is listening. A record name without a
    /// channel is silently dropped here.
    fn fan_out(&self, channel: &str, make: impl Fn() -> Bytes) {
        let Some(subscribers) = self.subscriptions.get(channel) else {
            return;
        };
        if subscribers.is_empty() {
            return;
        }
        let payload = make();
        for id in subscribers {
            if let Some(client) = self.clients.get(id) {
                client.queue.push(payload.clone());
            }
        }
    }

    // -- command handling ----------------------------------------------------

    /// Interpret one sentence: walk the tree, run the matched action, or
    /// answer with the descendant listing of wherever the walk stopped.
    pub fn handle_line(&mut self, client: ClientId, sentence: &[String]) {
        let node = self.tree.walk(sentence);
        match self.tree.action(node).cloned() {
            Some(action) => self.run_action(client, action),
            None => {
                let listing = self.tree.descendants(node, 0);
                self.push(client, Bytes::from(listing));
            }
        }
    }

    fn run_action(&mut self, client: ClientId, action: Action) {
        match action {
            Action::Help => self.push_str(client, "help called.\n"),
            Action::HelpHelp => self.push_str(client, "help_help called.\n"),
            Action::GetHelp => self.push_str(client, "get_help called.\n"),
            Action::GetHelpRx => self.push_str(client, "get_help_rx called.\n"),
            Action::GetHelpTx => self.push_str(client, "get_help_tx called.\n"),
            Action::GetHelpMessagesReceived => {
                self.push_str(client, "get_help_messages_received_tot called.\n");
            }
            Action::GetHelpMessagesLost => {
                self.push_str(client, "get_help_messages_lost_tot called.\n");
            }
            Action::SubscribeHelp => self.push_str(client, "subscribe_help called.\n"),
            Action::UnsubscribeHelp => self.push_str(client, "unsubscribe_help called.\n"),
            Action::PortsForZabbix => {
                let document = self.zabbix_document();
                self.push(client, Bytes::from(document));
            }
            Action::StoredPbs => {
                let envelope = wire::multi_envelope(self.ring.iter());
                self.push(client, envelope);
            }
            Action::StoredAsciiWaveforms => {
                let rendered = self.stored_ascii_waveforms();
                self.push(client, Bytes::from(rendered));
            }
            Action::GetRx(port) => self.push_counter(client, &port, SerialStats::rx_bytes),
            Action::GetTx(port) => self.push_counter(client, &port, SerialStats::tx_bytes),
            Action::GetMessagesReceived(port) => {
                self.push_counter(client, &port, SerialStats::messages_received_tot);
            }
            Action::GetMessagesLost(port) => {
                self.push_counter(client, &port, SerialStats::messages_lost_tot);
            }
            Action::Subscribe(channel) => self.subscribe(client, &channel),
            Action::Unsubscribe(channel) => self.unsubscribe(client, &channel),
        }
    }

    /// Add the caller to a channel. No-op when already subscribed or the
    /// channel does not exist (leaves only exist for known channels, so
    /// the latter means a stale tree).
    pub fn subscribe(&mut self, client: ClientId, channel: &str) {
        if let Some(subscribers) = self.subscriptions.get_mut(channel) {
            subscribers.insert(client);
        }
    }

    /// Remove the caller from a channel. No-op when absent.
    pub fn unsubscribe(&mut self, client: ClientId, channel: &str) {
        if let Some(subscribers) = self.subscriptions.get_mut(channel) {
            subscribers.remove(&client);
        }
    }

    fn zabbix_document(&self) -> String {
        let data = self
            .ports
            .values()
            .filter(|handle| handle.role.reads())
            .map(|handle| ZabbixPort { name: &handle.name })
            .collect();
        // Serializing a borrowed string struct cannot fail.
        serde_json::to_string(&ZabbixDiscovery { data }).unwrap_or_default()
    }

    fn stored_ascii_waveforms(&self) -> String {
        let mut out = String::new();
        for frame in self.ring.iter() {
            if let Some(msg) = wire::decode_frame(frame) {
                let record = wire::WaveRecord::from(msg);
                out.push_str(&ascii_waveform(&record.samples));
            }
        }
        out
    }

    fn push_counter(&mut self, client: ClientId, port: &str, read: fn(&SerialStats) -> u64) {
        let Some(handle) = self.ports.get(port) else {
            return;
        };
        let value = read(&handle.stats);
        self.push_str(client, &format!("{value}\n"));
    }

    fn push(&mut self, client: ClientId, payload: Bytes) {
        if payload.is_empty() {
            return;
        }
        if let Some(handle) = self.clients.get(&client) {
            handle.queue.push(payload);
        }
    }

    fn push_str(&mut self, client: ClientId, payload: &str) {
        self.push(client, Bytes::copy_from_slice(payload.as_bytes()));
    }

    // -- command tree --------------------------------------------------------

    /// Rebuild the command tree from current membership. The previous
    /// arena is dropped wholesale, so a rebuild can never leak nodes
    /// from an earlier generation.
    pub fn build_command_tree(&mut self) {
        let mut tree = CommandTree::new();
        let root = tree.root();

        let help = tree.add(root, "help", Some(Action::Help));
        tree.add(help, "help", Some(Action::HelpHelp));
        tree.add(help, "get", Some(Action::GetHelp));
        tree.add(help, "subscribe", Some(Action::SubscribeHelp));
        tree.add(help, "unsubscribe", Some(Action::UnsubscribeHelp));

        let get = tree.add(root, "get", Some(Action::GetHelp));
        tree.add(get, "help", Some(Action::GetHelp));
        let get_rx = tree.add(get, "rx", Some(Action::GetHelpRx));
        let get_tx = tree.add(get, "tx", Some(Action::GetHelpTx));
        let get_received =
            tree.add(get, "messages_received_tot", Some(Action::GetHelpMessagesReceived));
        let get_lost = tree.add(get, "messages_lost_tot", Some(Action::GetHelpMessagesLost));
        tree.add(get, "ports_for_zabbix", Some(Action::PortsForZabbix));
        tree.add(get, "stored_pbs", Some(Action::StoredPbs));
        tree.add(get, "stored_ascii_waveforms", Some(Action::StoredAsciiWaveforms));

        let subscribe = tree.add(root, "subscribe", Some(Action::SubscribeHelp));
        tree.add(subscribe, "help", Some(Action::SubscribeHelp));
        let subscribe_to = tree.add(subscribe, "to", Some(Action::SubscribeHelp));

        let unsubscribe = tree.add(root, "unsubscribe", Some(Action::UnsubscribeHelp));
        tree.add(unsubscribe, "help", Some(Action::UnsubscribeHelp));
        let unsubscribe_from = tree.add(unsubscribe, "from", Some(Action::UnsubscribeHelp));

        for channel in self.subscriptions.keys() {
            tree.add(subscribe_to, channel.clone(), Some(Action::Subscribe(channel.clone())));
            tree.add(
                unsubscribe_from,
                channel.clone(),
                Some(Action::Unsubscribe(channel.clone())),
            );
        }

        for (name, handle) in &self.ports {
            if handle.role.reads() {
                tree.add(get_rx, name.clone(), Some(Action::GetRx(name.clone())));
                tree.add(get_received, name.clone(), Some(Action::GetMessagesReceived(name.clone())));
                tree.add(get_lost, name.clone(), Some(Action::GetMessagesLost(name.clone())));
            }
            if handle.role.writes() {
                tree.add(get_tx, name.clone(), Some(Action::GetTx(name.clone())));
            }
        }

        self.tree = tree;
    }

    // -- introspection (used by command actions and tests) -------------------

    pub fn tree(&self) -> &CommandTree {
        &self.tree
    }

    pub fn ring_len(&self) -> usize {
        self.ring.len()
    }

    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_registered(&self, client: ClientId) -> bool {
        self.clients.contains_key(&client)
    }

    pub fn is_subscribed(&self, client: ClientId, channel: &str) -> bool {
        self.subscriptions.get(channel).is_some_and(|subs| subs.contains(&client))
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscriptions.get(channel).map_or(0, HashSet::len)
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.subscriptions.keys().map(String::as_str)
    }

    pub fn port(&self, name: &str) -> Option<&SerialHandle> {
        self.ports.get(name)
    }
}

/// Zabbix low-level discovery document for the reading ports. The macro
/// name matches the deployed Zabbix templates.
#[derive(Serialize)]
struct ZabbixDiscovery<'a> {
    data: Vec<ZabbixPort<'a>>,
}

#[derive(Serialize)]
struct ZabbixPort<'a> {
    #[serde(rename = "{#DEWDSP}")]
    name: &'a str,
}

/// Tab-separated decimal rendering of a waveform, newline-terminated.
pub fn ascii_waveform(samples: &[i32]) -> String {
    let mut out = String::new();
    for sample in samples {
        out.push('\t');
        out.push_str(&sample.to_string());
    }
    out.push('\n');
    out
}

/// Big-endian-by-sample byte rendering: each sample contributes a tab
/// followed by its four bytes as concatenated decimal values. Existing
/// clients parse this format, so it is kept bit-exact.
pub fn raw_waveform(samples: &[i32]) -> String {
    let mut out = String::new();
    for sample in samples {
        out.push('\t');
        for shift in [24, 16, 8, 0] {
            out.push_str(&((sample >> shift) & 0xff).to_string());
        }
    }
    out.push('\n');
    out
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
