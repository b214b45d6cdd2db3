//! WebSocket Connection Hub
//!
//! Owns the set of live connections and fans list mutations out to them.
//!
//! The set is owned by a single worker task. Everything else talks to it
//! through a [`HubHandle`], which only enqueues [`Command`]s, so register,
//! unregister and broadcast are applied strictly in arrival order and never
//! interleave. No lock guards the set.
//!
//! Delivery is best-effort. Each connection has a bounded mailbox; a
//! broadcast that finds a mailbox full evicts that connection instead of
//! waiting on it, so one slow consumer can neither stall the hub nor grow
//! memory without bound.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::messages::{Envelope, EventKind, Frame};

/// Server-assigned identity of one connection, unique by construction
pub type ConnectionId = Uuid;

/// The hub's view of a registered connection.
///
/// Not `Clone`: the mailbox sender moves into the hub on registration and
/// is dropped exactly once when the entry is removed, which closes the
/// mailbox and stops the outbound pump.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    client_id: String,
    mailbox: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, client_id: impl Into<String>, mailbox: mpsc::Sender<Frame>) -> Self {
        Self {
            id,
            client_id: client_id.into(),
            mailbox,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Counters describing hub activity since start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Currently registered connections
    pub connections: usize,
    /// Envelopes that started fan-out
    pub broadcasts: u64,
    /// Successful mailbox enqueues
    pub delivered: u64,
    /// Connections removed because their mailbox was full or gone
    pub evicted: u64,
    /// Client-submitted broadcasts dropped because they did not parse
    pub malformed: u64,
}

/// Requests processed by the hub worker
#[derive(Debug)]
pub enum Command {
    Register(ConnectionHandle),
    Unregister(ConnectionId),
    Broadcast(Envelope),
    BroadcastRaw(String),
    Stats(oneshot::Sender<HubStats>),
}

/// The registry of live connections. Lives inside the worker task.
#[derive(Debug, Default)]
pub struct Hub {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    stats: HubStats,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the hub worker and return a handle to it.
    ///
    /// The worker stops once every handle has been dropped. Envelopes still
    /// sitting in mailboxes at that point are lost.
    pub fn spawn() -> HubHandle {
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(Hub::new().run(rx));
        HubHandle { commands }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        tracing::debug!("Connection hub started");

        while let Some(command) = commands.recv().await {
            self.handle(command);
        }

        tracing::info!(
            connections = self.connections.len(),
            "Connection hub stopped"
        );
    }

    /// Apply one command to the registry
    pub fn handle(&mut self, command: Command) {
        match command {
            Command::Register(handle) => self.register(handle),
            Command::Unregister(id) => {
                self.unregister(id);
            }
            Command::Broadcast(envelope) => self.broadcast(&envelope),
            Command::BroadcastRaw(raw) => self.broadcast_raw(&raw),
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    pub fn register(&mut self, handle: ConnectionHandle) {
        tracing::info!(
            connection_id = %handle.id,
            client_id = %handle.client_id,
            "WebSocket connected"
        );
        self.connections.insert(handle.id, handle);
    }

    /// Remove a connection and close its mailbox.
    ///
    /// Returns false when the connection was already gone; both pumps of a
    /// connection request this, so the second call is a no-op.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some(handle) => {
                tracing::info!(
                    connection_id = %id,
                    client_id = %handle.client_id,
                    "WebSocket disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Serialize `envelope` once and enqueue it for every connection except
    /// the originator. Never waits on a mailbox.
    pub fn broadcast(&mut self, envelope: &Envelope) {
        let frame = match envelope.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, kind = %envelope.kind, "Failed to encode envelope");
                return;
            }
        };
        self.fan_out(envelope, frame);
    }

    /// Broadcast text submitted by a client over its socket.
    ///
    /// Text that does not parse as an envelope is dropped.
    pub fn broadcast_raw(&mut self, raw: &str) {
        match Envelope::parse(raw) {
            Ok(envelope) => self.broadcast(&envelope),
            Err(e) => {
                self.stats.malformed += 1;
                tracing::debug!(error = %e, "Dropping malformed client broadcast");
            }
        }
    }

    fn fan_out(&mut self, envelope: &Envelope, frame: Frame) {
        self.stats.broadcasts += 1;

        let mut evicted = Vec::new();
        let mut delivered = 0u64;

        for (id, handle) in &self.connections {
            if envelope.excludes(&handle.client_id) {
                continue;
            }
            match handle.mailbox.try_send(Frame::clone(&frame)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        client_id = %handle.client_id,
                        "Slow consumer, mailbox full"
                    );
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            if self.unregister(id) {
                self.stats.evicted += 1;
            }
        }

        self.stats.delivered += delivered;

        tracing::trace!(
            kind = %envelope.kind,
            originator = %envelope.originator_id,
            recipients = delivered,
            "Broadcast event"
        );
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            ..self.stats
        }
    }
}

/// Cloneable handle for submitting commands to the hub worker.
///
/// Every method returns immediately. If the worker has stopped the command
/// is dropped.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl HubHandle {
    pub fn register(&self, handle: ConnectionHandle) {
        self.send(Command::Register(handle));
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.send(Command::Unregister(id));
    }

    pub fn broadcast(&self, envelope: Envelope) {
        self.send(Command::Broadcast(envelope));
    }

    pub fn broadcast_raw(&self, raw: impl Into<String>) {
        self.send(Command::BroadcastRaw(raw.into()));
    }

    /// Announce a successful list mutation to every other client.
    ///
    /// Fire-and-forget: a payload that cannot be serialized is logged and
    /// dropped.
    pub fn submit_mutation<T: Serialize>(&self, originator_id: &str, kind: EventKind, payload: &T) {
        match Envelope::from_payload(originator_id, kind, payload) {
            Ok(envelope) => self.broadcast(envelope),
            Err(e) => {
                tracing::error!(error = %e, kind = %kind, "Failed to build mutation event");
            }
        }
    }

    /// Snapshot of hub counters.
    ///
    /// Answered after every command submitted before it, so it also works
    /// as a barrier in tests.
    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stats(reply));
        rx.await.unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.stats().await.connections
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Connection hub stopped, command dropped");
        }
    }
}
