//! WebSocket Connection
//!
//! One live push-channel endpoint: a bounded mailbox fed by the hub and two
//! pumps over the transport.
//!
//! - The **outbound pump** drains the mailbox onto the wire, coalescing
//!   queued envelopes into one newline-joined text frame, and sends a ping
//!   every `ping_period`. A closed mailbox makes it send a close frame and
//!   stop.
//! - The **inbound pump** reads client frames. Text is forwarded to the hub
//!   as a client broadcast. Any frame refreshes the read deadline; silence
//!   for `pong_wait` ends the connection.
//!
//! Whichever pump stops first asks the hub to unregister the connection.
//! The hub drops the mailbox sender, which stops the outbound pump, and the
//! inbound pump is cancelled if the outbound side failed first. The sink is
//! closed on every path.
//!
//! The pumps are generic over the transport so they run over an axum
//! `WebSocket` in production and over in-memory channels in tests.

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use super::hub::{ConnectionHandle, ConnectionId, HubHandle};
use super::messages::{join_frames, normalize_inbound, Frame};

/// Per-connection limits and timers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Mailbox capacity; a full mailbox gets the connection evicted
    pub mailbox_capacity: usize,
    /// Deadline for every write, data or ping
    pub write_timeout: Duration,
    /// Longest silence tolerated from the client
    pub pong_wait: Duration,
    /// Ping interval, shorter than `pong_wait`
    pub ping_period: Duration,
    /// Largest inbound message accepted
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            mailbox_capacity: 256,
            write_timeout: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
        }
    }
}

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Client sent a close frame or the stream ended
    PeerClosed,
    /// Read or write failed
    TransportError,
    /// Nothing heard from the client within `pong_wait`
    KeepaliveTimeout,
    /// A write did not finish within `write_timeout`
    WriteTimeout,
    /// The hub closed the mailbox (unregistered or evicted)
    MailboxClosed,
}

/// A push connection before and while it is being served
pub struct Connection {
    id: ConnectionId,
    client_id: String,
    hub: HubHandle,
    settings: ConnectionSettings,
    state: ConnectionState,
}

impl Connection {
    pub fn new(hub: HubHandle, client_id: impl Into<String>, settings: ConnectionSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: client_id.into(),
            hub,
            settings,
            state: ConnectionState::Connecting,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Register with the hub and run both pumps until the connection ends.
    ///
    /// Returns once both pumps have stopped and the sink has been closed.
    pub async fn serve<S, R, E>(mut self, sink: S, stream: R) -> CloseReason
    where
        S: Sink<Message, Error = E> + Unpin + Send + 'static,
        R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
        E: Display + Send + 'static,
    {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(self.settings.mailbox_capacity);
        self.hub
            .register(ConnectionHandle::new(self.id, self.client_id.clone(), mailbox_tx));
        self.transition(ConnectionState::Open);

        let mut outbound = tokio::spawn(outbound_pump(
            self.id,
            self.hub.clone(),
            sink,
            mailbox_rx,
            self.settings.clone(),
        ));
        let mut inbound = tokio::spawn(inbound_pump(
            self.id,
            self.hub.clone(),
            stream,
            self.settings.pong_wait,
        ));

        let reason = tokio::select! {
            result = &mut outbound => {
                self.transition(ConnectionState::Closing);
                inbound.abort();
                let _ = inbound.await;
                pump_result(self.id, result)
            }
            result = &mut inbound => {
                self.transition(ConnectionState::Closing);
                // Inbound already asked for unregistration; the outbound pump
                // stops once the hub closes the mailbox.
                let _ = outbound.await;
                pump_result(self.id, result)
            }
        };

        self.hub.unregister(self.id);
        self.transition(ConnectionState::Closed);

        tracing::debug!(
            connection_id = %self.id,
            client_id = %self.client_id,
            reason = ?reason,
            "Connection closed"
        );
        reason
    }

    fn transition(&mut self, next: ConnectionState) {
        tracing::debug!(
            connection_id = %self.id,
            from = ?self.state,
            to = ?next,
            "Connection state change"
        );
        self.state = next;
    }
}

/// Accept a transport: build the connection, register it and serve it
pub async fn serve_connection<S, R, E>(
    hub: HubHandle,
    client_id: impl Into<String>,
    sink: S,
    stream: R,
    settings: ConnectionSettings,
) -> CloseReason
where
    S: Sink<Message, Error = E> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
{
    Connection::new(hub, client_id, settings)
        .serve(sink, stream)
        .await
}

fn pump_result(id: ConnectionId, result: Result<CloseReason, JoinError>) -> CloseReason {
    result.unwrap_or_else(|e| {
        tracing::error!(connection_id = %id, error = %e, "Connection pump failed");
        CloseReason::TransportError
    })
}

async fn outbound_pump<S, E>(
    id: ConnectionId,
    hub: HubHandle,
    mut sink: S,
    mut mailbox: mpsc::Receiver<Frame>,
    settings: ConnectionSettings,
) -> CloseReason
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    let mut keepalive =
        tokio::time::interval_at(Instant::now() + settings.ping_period, settings.ping_period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            frame = mailbox.recv() => {
                let Some(first) = frame else {
                    let _ = write(id, &mut sink, Message::Close(None), settings.write_timeout).await;
                    break CloseReason::MailboxClosed;
                };

                let mut batch = vec![first];
                while batch.len() < settings.mailbox_capacity {
                    match mailbox.try_recv() {
                        Ok(frame) => batch.push(frame),
                        Err(_) => break,
                    }
                }

                let text = join_frames(&batch);
                if let Err(reason) = write(id, &mut sink, Message::Text(text), settings.write_timeout).await {
                    break reason;
                }
            }
            _ = keepalive.tick() => {
                if let Err(reason) = write(id, &mut sink, Message::Ping(Vec::new()), settings.write_timeout).await {
                    break reason;
                }
            }
        }
    };

    hub.unregister(id);

    match tokio::time::timeout(settings.write_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(connection_id = %id, error = %e, "WebSocket close failed"),
        Err(_) => tracing::debug!(connection_id = %id, "WebSocket close timed out"),
    }

    reason
}

async fn write<S, E>(
    id: ConnectionId,
    sink: &mut S,
    message: Message,
    timeout: Duration,
) -> Result<(), CloseReason>
where
    S: Sink<Message, Error = E> + Unpin,
    E: Display,
{
    match tokio::time::timeout(timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(connection_id = %id, error = %e, "WebSocket send failed");
            Err(CloseReason::TransportError)
        }
        Err(_) => {
            tracing::debug!(connection_id = %id, "WebSocket write deadline exceeded");
            Err(CloseReason::WriteTimeout)
        }
    }
}

async fn inbound_pump<R, E>(
    id: ConnectionId,
    hub: HubHandle,
    mut stream: R,
    pong_wait: Duration,
) -> CloseReason
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let reason = loop {
        let next = match tokio::time::timeout(pong_wait, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                tracing::debug!(connection_id = %id, "Keepalive window elapsed");
                break CloseReason::KeepaliveTimeout;
            }
        };

        match next {
            None => break CloseReason::PeerClosed,
            Some(Err(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "WebSocket receive error");
                break CloseReason::TransportError;
            }
            Some(Ok(Message::Close(_))) => {
                tracing::debug!(connection_id = %id, "Client requested close");
                break CloseReason::PeerClosed;
            }
            Some(Ok(Message::Text(text))) => forward(&hub, &text),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => forward(&hub, &text),
                Err(_) => {
                    tracing::debug!(connection_id = %id, "Ignoring non UTF-8 binary frame");
                }
            },
            // Axum answers pings itself; either way the peer is alive
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
        }
    };

    hub.unregister(id);
    reason
}

fn forward(hub: &HubHandle, text: &str) {
    let normalized = normalize_inbound(text);
    if !normalized.is_empty() {
        hub.broadcast_raw(normalized);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::hub::Hub;
    use crate::websocket::messages::{split_frames, Envelope, EventKind};
    use futures_util::{sink, stream};
    use serde_json::{json, Value};
    use std::pin::Pin;

    type TestSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;
    type TestStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

    /// In-memory transport: frames written by the server land in `written`,
    /// frames pushed into `incoming` are what the server reads.
    struct Transport {
        sink: TestSink,
        stream: TestStream,
        written: mpsc::UnboundedReceiver<Message>,
        incoming: mpsc::UnboundedSender<Result<Message, axum::Error>>,
    }

    fn transport() -> Transport {
        let (written_tx, written) = mpsc::unbounded_channel::<Message>();
        let (incoming, incoming_rx) = mpsc::unbounded_channel::<Result<Message, axum::Error>>();

        let sink = sink::unfold(written_tx, |tx, message: Message| async move {
            tx.send(message)
                .map_err(|_| axum::Error::new(std::io::Error::other("peer gone")))?;
            Ok::<_, axum::Error>(tx)
        });
        let stream = stream::unfold(incoming_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
            written,
            incoming,
        }
    }

    fn settings() -> ConnectionSettings {
        ConnectionSettings {
            mailbox_capacity: 8,
            ..ConnectionSettings::default()
        }
    }

    async fn wait_for_count(hub: &HubHandle, expected: usize) {
        for _ in 0..100 {
            if hub.connection_count().await == expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("hub never reached {} connections", expected);
    }

    fn text_of(message: Message) -> String {
        match message {
            Message::Text(text) => text,
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.mailbox_capacity, 256);
        assert_eq!(settings.write_timeout, Duration::from_secs(10));
        assert_eq!(settings.pong_wait, Duration::from_secs(60));
        assert_eq!(settings.ping_period, Duration::from_secs(54));
        assert_eq!(settings.max_message_size, 512);
        assert!(settings.ping_period < settings.pong_wait);
    }

    #[tokio::test]
    async fn test_new_connection_is_connecting() {
        let hub = Hub::spawn();
        let connection = Connection::new(hub.clone(), "A", settings());
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(connection.client_id(), "A");

        // Not registered until served
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_delivers_broadcast_to_peer() {
        let hub = Hub::spawn();
        let Transport { sink, stream, mut written, incoming } = transport();
        let task = tokio::spawn(serve_connection(hub.clone(), "B", sink, stream, settings()));

        wait_for_count(&hub, 1).await;
        hub.submit_mutation("A", EventKind::Add, &json!({"uid": "1", "name": "milk"}));

        let text = text_of(written.recv().await.unwrap());
        let envelope: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(envelope["type"], "add");
        assert_eq!(envelope["data"]["name"], "milk");

        drop(incoming);
        assert_eq!(task.await.unwrap(), CloseReason::PeerClosed);
    }

    #[tokio::test]
    async fn test_coalesces_queued_envelopes() {
        let hub = Hub::spawn();
        let Transport { sink, stream: _, mut written, incoming } = transport();

        // Queue three envelopes before the pump starts
        let (mailbox_tx, mailbox_rx) = mpsc::channel(8);
        for i in 0..3 {
            let frame = Envelope::new("A", EventKind::Edit, json!({ "seq": i }))
                .encode()
                .unwrap();
            mailbox_tx.try_send(frame).unwrap();
        }
        drop(mailbox_tx);

        let reason = outbound_pump(Uuid::new_v4(), hub, sink, mailbox_rx, settings()).await;
        assert_eq!(reason, CloseReason::MailboxClosed);

        let text = text_of(written.recv().await.unwrap());
        let seqs: Vec<i64> = split_frames(&text)
            .map(|part| serde_json::from_str::<Value>(part).unwrap()["data"]["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);

        assert!(matches!(written.recv().await, Some(Message::Close(None))));
        drop(incoming);
    }

    #[tokio::test]
    async fn test_client_text_is_broadcast_to_others() {
        let hub = Hub::spawn();
        let (observer_tx, mut observer) = mpsc::channel(8);
        hub.register(ConnectionHandle::new(Uuid::new_v4(), "C", observer_tx));

        let Transport { sink, stream, written: _written, incoming } = transport();
        let task = tokio::spawn(serve_connection(hub.clone(), "A", sink, stream, settings()));
        wait_for_count(&hub, 2).await;

        incoming
            .send(Ok(Message::Text(
                "{\"client_id\":\"A\",\n\"type\":\"toggle\",\"data\":{\"uid\":\"9\"}}".to_string(),
            )))
            .unwrap();
        incoming.send(Ok(Message::Text("garbage".to_string()))).unwrap();

        let frame = observer.recv().await.unwrap();
        let envelope: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(envelope["type"], "toggle");
        assert_eq!(envelope["data"]["uid"], "9");

        incoming.send(Ok(Message::Close(None))).unwrap();
        assert_eq!(task.await.unwrap(), CloseReason::PeerClosed);

        let stats = hub.stats().await;
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.connections, 1);
    }

    #[tokio::test]
    async fn test_transport_error_closes_connection() {
        let hub = Hub::spawn();
        let Transport { sink, stream, mut written, incoming } = transport();
        let task = tokio::spawn(serve_connection(hub.clone(), "B", sink, stream, settings()));
        wait_for_count(&hub, 1).await;

        incoming
            .send(Err(axum::Error::new(std::io::Error::other("connection reset"))))
            .unwrap();

        assert_eq!(task.await.unwrap(), CloseReason::TransportError);
        assert_eq!(hub.connection_count().await, 0);

        // The outbound pump saw the mailbox close and said goodbye
        assert!(matches!(written.recv().await, Some(Message::Close(None))));

        // Later broadcasts no longer count it as a recipient
        hub.submit_mutation("A", EventKind::Delete, &json!({"uid": "1"}));
        assert_eq!(hub.stats().await.delivered, 0);
    }

    #[tokio::test]
    async fn test_failed_write_cancels_inbound_pump() {
        let hub = Hub::spawn();
        let Transport { sink, stream, written, incoming } = transport();
        let task = tokio::spawn(serve_connection(hub.clone(), "B", sink, stream, settings()));
        wait_for_count(&hub, 1).await;

        // Peer stops reading; the next write fails
        drop(written);
        hub.submit_mutation("A", EventKind::Add, &json!({"uid": "1"}));

        assert_eq!(task.await.unwrap(), CloseReason::TransportError);
        assert_eq!(hub.connection_count().await, 0);
        drop(incoming);
    }

    #[tokio::test]
    async fn test_eviction_closes_connection() {
        let hub = Hub::spawn();
        let Transport { sink, stream, written: _written, incoming } = transport();

        let connection = Connection::new(hub.clone(), "B", settings());
        let id = connection.id();
        let task = tokio::spawn(connection.serve(sink, stream));
        wait_for_count(&hub, 1).await;

        hub.unregister(id);
        assert_eq!(task.await.unwrap(), CloseReason::MailboxClosed);
        drop(incoming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_ping_then_timeout() {
        let hub = Hub::spawn();
        let Transport { sink, stream, mut written, incoming } = transport();
        let task = tokio::spawn(serve_connection(hub.clone(), "B", sink, stream, ConnectionSettings::default()));

        // Nothing from the client: a ping goes out at 54s, the read window
        // expires at 60s.
        assert!(matches!(written.recv().await, Some(Message::Ping(_))));
        assert_eq!(task.await.unwrap(), CloseReason::KeepaliveTimeout);
        assert_eq!(hub.connection_count().await, 0);
        drop(incoming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_write_hits_deadline() {
        let hub = Hub::spawn();
        let Transport { stream, incoming, .. } = transport();

        // Accepts nothing: every send stays pending
        let stalled: TestSink = Box::pin(sink::unfold((), |(), _message: Message| {
            futures_util::future::pending::<Result<(), axum::Error>>()
        }));
        let task = tokio::spawn(serve_connection(hub.clone(), "B", stalled, stream, settings()));
        wait_for_count(&hub, 1).await;

        hub.submit_mutation("A", EventKind::Add, &json!({"uid": "1"}));

        assert_eq!(task.await.unwrap(), CloseReason::WriteTimeout);
        assert_eq!(hub.connection_count().await, 0);
        drop(incoming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pongs_keep_connection_alive() {
        let hub = Hub::spawn();
        let Transport { sink, stream, written: _written, incoming } = transport();
        let task = tokio::spawn(serve_connection(hub.clone(), "B", sink, stream, ConnectionSettings::default()));

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(50)).await;
            incoming.send(Ok(Message::Pong(Vec::new()))).unwrap();
        }
        assert_eq!(hub.connection_count().await, 1);

        incoming.send(Ok(Message::Close(None))).unwrap();
        assert_eq!(task.await.unwrap(), CloseReason::PeerClosed);
    }
}
