//! Per-session connection state machine.
//!
//! Every session is driven by one task ([`SessionActor`]) that owns all of its
//! mutable state: the bound transport channels, the outbound queue, joined
//! namespaces and pending acknowledgements. Transports, timers and broadcasts
//! only ever talk to it through the [`SessionCommand`] mailbox, so the state
//! has a single writer and needs no locks.

use arc_swap::ArcSwap;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use uuid::Uuid;

use super::ack::{AckCallback, AckRegistry, AckSender};
use super::client::SocketClient;
use super::Engine;
use crate::namespace::ROOT_NAMESPACE;
use crate::protocol::{EnginePacket, PacketType, SocketPacket, SocketPacketType};
use crate::scheduler::{SchedulerKey, TimeoutKind};
use crate::store::PubSubMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Polling,
    WebSocket,
}

impl TransportKind {
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Polling => "polling",
            TransportKind::WebSocket => "websocket",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "polling" => Some(TransportKind::Polling),
            "websocket" => Some(TransportKind::WebSocket),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Handshaking,
    Open,
    Upgrading,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Close packet, root namespace disconnect or the `disconnect` query flag.
    ClientDisconnect,
    ServerDisconnect,
    PingTimeout,
    /// The active transport channel went away.
    TransportClose,
    /// The session broke a protocol invariant, e.g. two parked polls.
    ProtocolViolation,
    ServerShutdown,
}

impl DisconnectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::ClientDisconnect => "client disconnect",
            DisconnectReason::ServerDisconnect => "server disconnect",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::ProtocolViolation => "protocol violation",
            DisconnectReason::ServerShutdown => "server shutdown",
        }
    }
}

/// Read-only snapshot of a session, published by its task after every change.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub transport: TransportKind,
    pub last_activity: DateTime<Utc>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

/// What the handshake request looked like.
#[derive(Debug, Clone)]
pub struct HandshakeData {
    pub headers: HeaderMap,
    pub uri: String,
    pub query: HashMap<String, String>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl HandshakeData {
    pub fn new(headers: HeaderMap, uri: String, query: HashMap<String, String>) -> Self {
        let meta = ChannelMeta::from_headers(&headers);
        Self {
            headers,
            uri,
            query,
            origin: meta.origin,
            user_agent: meta.user_agent,
            connected_at: Utc::now(),
        }
    }
}

/// Headers captured from each request or socket bound to a session.
#[derive(Debug, Clone, Default)]
pub struct ChannelMeta {
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

impl ChannelMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: axum::http::HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            origin: header(axum::http::header::ORIGIN),
            user_agent: header(axum::http::header::USER_AGENT),
        }
    }
}

/// Identifies one physical channel (a poll request or a websocket), unique
/// within an [`Engine`].
pub type ChannelId = u64;

/// Instructions for a websocket writer.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketFrame {
    Packet(EnginePacket),
    Close,
}

/// The sending half of a websocket bound to a session.
#[derive(Debug, Clone)]
pub struct BoundSocket {
    pub channel: ChannelId,
    pub tx: mpsc::UnboundedSender<SocketFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketSource {
    Polling,
    Socket(ChannelId),
}

pub struct PendingAck {
    pub callback: Box<dyn AckCallback>,
    /// Falls back to the configured ack timeout.
    pub timeout: Option<Duration>,
}

pub enum SessionCommand {
    /// A polling GET waiting for packets.
    Poll {
        channel: ChannelId,
        reply: oneshot::Sender<Vec<EnginePacket>>,
        meta: ChannelMeta,
    },
    Inbound {
        source: PacketSource,
        packets: Vec<EnginePacket>,
    },
    Emit {
        packet: SocketPacket,
        ack: Option<PendingAck>,
    },
    /// A websocket opened with this session's id, to be probed for upgrade.
    AttachProbe {
        socket: BoundSocket,
        meta: ChannelMeta,
    },
    ChannelClosed {
        channel: ChannelId,
    },
    Timeout {
        kind: TimeoutKind,
        generation: u64,
    },
    Disconnect {
        reason: DisconnectReason,
    },
}

/// Cheap, cloneable reference to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    mailbox: mpsc::UnboundedSender<SessionCommand>,
    status: Arc<ArcSwap<SessionStatus>>,
    handshake: Arc<HandshakeData>,
    closed: Arc<Notify>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Posts a command. Returns `false` once the session task is gone.
    pub fn send(&self, command: SessionCommand) -> bool {
        self.mailbox.send(command).is_ok()
    }

    pub fn emit(&self, packet: SocketPacket) -> bool {
        self.send(SessionCommand::Emit { packet, ack: None })
    }

    pub fn disconnect(&self, reason: DisconnectReason) -> bool {
        self.send(SessionCommand::Disconnect { reason })
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.load_full()
    }

    pub fn handshake(&self) -> &HandshakeData {
        &self.handshake
    }

    pub fn is_closed(&self) -> bool {
        self.status.load().state == SessionState::Closed
    }

    /// Resolves once the session has run its cleanup.
    pub async fn closed(&self) {
        loop {
            let notified = self.closed.notified();
            if self.is_closed() {
                return;
            }
            notified.await;
        }
    }
}

struct ParkedPoll {
    channel: ChannelId,
    reply: oneshot::Sender<Vec<EnginePacket>>,
}

pub(crate) struct SessionActor {
    engine: Arc<Engine>,
    handle: SessionHandle,
    mailbox: mpsc::UnboundedReceiver<SessionCommand>,
    state: SessionState,
    transport: TransportKind,
    queue: VecDeque<EnginePacket>,
    poll: Option<ParkedPoll>,
    socket: Option<BoundSocket>,
    probe: Option<BoundSocket>,
    namespaces: Vec<String>,
    acks: AckRegistry,
    timers: HashMap<TimeoutKind, u64>,
    next_generation: u64,
    meta: ChannelMeta,
    last_activity: DateTime<Utc>,
}

/// Creates a session, registers it and starts its task.
pub(crate) fn spawn(
    engine: Arc<Engine>,
    transport: TransportKind,
    handshake: HandshakeData,
    socket: Option<BoundSocket>,
) -> SessionHandle {
    let id = Uuid::new_v4();
    let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
    let meta = ChannelMeta {
        origin: handshake.origin.clone(),
        user_agent: handshake.user_agent.clone(),
    };
    let now = Utc::now();
    let status = Arc::new(ArcSwap::from_pointee(SessionStatus {
        state: SessionState::Handshaking,
        transport,
        last_activity: now,
        origin: meta.origin.clone(),
        user_agent: meta.user_agent.clone(),
    }));
    let handle = SessionHandle {
        id,
        mailbox: mailbox_tx,
        status,
        handshake: Arc::new(handshake),
        closed: Arc::new(Notify::new()),
    };
    engine.registry().register(handle.clone());

    let actor = SessionActor {
        engine,
        handle: handle.clone(),
        mailbox: mailbox_rx,
        state: SessionState::Handshaking,
        transport,
        queue: VecDeque::new(),
        poll: None,
        socket,
        probe: None,
        namespaces: Vec::new(),
        acks: AckRegistry::default(),
        timers: HashMap::new(),
        next_generation: 1,
        meta,
        last_activity: now,
    };
    tokio::spawn(actor.run());
    handle
}

impl SessionActor {
    async fn run(mut self) {
        self.open();
        while self.state != SessionState::Closed {
            let Some(command) = self.mailbox.recv().await else {
                break;
            };
            self.handle_command(command);
        }
        self.close(DisconnectReason::ServerShutdown);
    }

    fn id(&self) -> Uuid {
        self.handle.id
    }

    fn open(&mut self) {
        let config = self.engine.config();
        let upgrades: Vec<&str> =
            if self.transport == TransportKind::Polling && config.allow_upgrades {
                vec![TransportKind::WebSocket.name()]
            } else {
                Vec::new()
            };
        let open = json!({
            "sid": self.id().to_string(),
            "upgrades": upgrades,
            "pingInterval": config.ping_interval.as_millis() as u64,
            "pingTimeout": config.ping_timeout.as_millis() as u64,
        });
        let deadline = config.heartbeat_deadline();
        self.queue
            .push_back(EnginePacket::new(PacketType::Open, open.to_string()));
        self.state = SessionState::Open;
        self.arm(TimeoutKind::Ping, deadline);

        self.engine.hub().publish(PubSubMessage::Connect {
            session_id: self.id(),
        });
        self.connect_namespace(ROOT_NAMESPACE);
        self.publish_status();
        self.flush();
        tracing::info!(session = %self.id(), transport = self.transport.name(), "session opened");
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Poll {
                channel,
                reply,
                meta,
            } => self.on_poll(channel, reply, meta),
            SessionCommand::Inbound { source, packets } => self.on_inbound(source, packets),
            SessionCommand::Emit { packet, ack } => self.on_emit(packet, ack),
            SessionCommand::AttachProbe { socket, meta } => self.on_attach_probe(socket, meta),
            SessionCommand::ChannelClosed { channel } => self.on_channel_closed(channel),
            SessionCommand::Timeout { kind, generation } => self.on_timeout(kind, generation),
            SessionCommand::Disconnect { reason } => self.close(reason),
        }
    }

    fn is_closing(&self) -> bool {
        matches!(self.state, SessionState::Closing | SessionState::Closed)
    }

    fn on_poll(
        &mut self,
        channel: ChannelId,
        reply: oneshot::Sender<Vec<EnginePacket>>,
        meta: ChannelMeta,
    ) {
        if self.is_closing() {
            let _ = reply.send(vec![EnginePacket::empty(PacketType::Close)]);
            return;
        }
        self.touch(Some(meta));
        if self.transport == TransportKind::WebSocket {
            // Leftover poll from before the upgrade.
            let _ = reply.send(vec![EnginePacket::empty(PacketType::Noop)]);
            return;
        }
        if let Some(parked) = &self.poll {
            if !parked.reply.is_closed() {
                tracing::warn!(session = %self.id(), "second poll while one is parked, closing session");
                let _ = reply.send(vec![EnginePacket::empty(PacketType::Close)]);
                self.close(DisconnectReason::ProtocolViolation);
                return;
            }
        }
        self.poll = Some(ParkedPoll { channel, reply });
        self.flush();
    }

    fn on_inbound(&mut self, source: PacketSource, packets: Vec<EnginePacket>) {
        if self.is_closing() {
            return;
        }
        if let PacketSource::Socket(channel) = source {
            if !self.is_bound_socket(channel) && !self.is_probe(channel) {
                tracing::debug!(session = %self.id(), channel, "packets from a stale socket dropped");
                return;
            }
        }
        self.touch(None);
        for packet in packets {
            tracing::debug!(session = %self.id(), kind = ?packet.kind, "inbound packet");
            self.on_engine_packet(source, packet);
            if self.is_closing() {
                return;
            }
        }
        self.flush();
    }

    fn on_engine_packet(&mut self, source: PacketSource, packet: EnginePacket) {
        let from_probe = matches!(source, PacketSource::Socket(channel) if self.is_probe(channel));
        match packet.kind {
            PacketType::Ping if from_probe && packet.data == "probe" => self.on_probe(),
            PacketType::Ping => self.enqueue(EnginePacket::new(PacketType::Pong, packet.data)),
            PacketType::Upgrade if from_probe => self.complete_upgrade(),
            PacketType::Message => match SocketPacket::decode(&packet.data) {
                Ok(socket_packet) => self.on_socket_packet(socket_packet),
                Err(e) => tracing::warn!(session = %self.id(), "undecodable message: {e}"),
            },
            PacketType::Close => self.close(DisconnectReason::ClientDisconnect),
            PacketType::Upgrade | PacketType::Pong | PacketType::Noop | PacketType::Open => {}
        }
    }

    fn on_socket_packet(&mut self, packet: SocketPacket) {
        let namespace = packet.namespace.clone();
        match packet.kind {
            SocketPacketType::Connect => self.connect_namespace(&namespace),
            SocketPacketType::Disconnect if namespace == ROOT_NAMESPACE => {
                self.close(DisconnectReason::ClientDisconnect)
            }
            SocketPacketType::Disconnect => {
                self.disconnect_namespace(&namespace, DisconnectReason::ClientDisconnect)
            }
            SocketPacketType::Event => self.dispatch_event(&namespace, &packet),
            SocketPacketType::Ack => {
                let Some(ack_id) = packet.ack_id else {
                    tracing::warn!(session = %self.id(), "ack packet without an id");
                    return;
                };
                self.disarm(TimeoutKind::Ack(ack_id));
                match self.acks.take(ack_id) {
                    Some(callback) => callback.on_ack(packet.args()),
                    None => tracing::debug!(session = %self.id(), ack_id, "late or unknown ack"),
                }
            }
            SocketPacketType::Error => {
                let error = packet.data.clone().unwrap_or(Value::Null);
                let client = self.client(&namespace);
                for listener in self.engine.listeners().error_listeners(&namespace) {
                    listener.on_error(&client, &error);
                }
            }
        }
    }

    fn dispatch_event(&mut self, namespace: &str, packet: &SocketPacket) {
        if !self.namespaces.iter().any(|ns| ns == namespace) {
            tracing::warn!(session = %self.id(), namespace, "event for a namespace the session is not connected to");
            return;
        }
        let Some(event) = packet.event_name() else {
            tracing::warn!(session = %self.id(), "event packet without a name");
            return;
        };
        let listeners = self.engine.listeners().event_listeners(namespace, event);
        if listeners.is_empty() {
            tracing::debug!(session = %self.id(), namespace, event, "no listener for event");
            return;
        }
        let client = self.client(namespace);
        let args = packet.args();
        // One acknowledgement per request, handed to the first listener.
        let mut ack = packet
            .ack_id
            .map(|ack_id| AckSender::new(self.handle.clone(), namespace, ack_id));
        for listener in listeners {
            listener.on_event(&client, event, args.clone(), ack.take());
        }
    }

    fn connect_namespace(&mut self, namespace: &str) {
        if !self.namespaces.iter().any(|ns| ns == namespace) {
            self.namespaces.push(namespace.to_string());
        }
        self.engine.hub().connect(self.id(), namespace);
        self.enqueue(EnginePacket::message(&SocketPacket::connect(namespace)));

        let client = self.client(namespace);
        for listener in self.engine.listeners().connect_listeners(namespace) {
            listener.on_connect(&client);
        }
    }

    fn disconnect_namespace(&mut self, namespace: &str, reason: DisconnectReason) {
        let Some(index) = self.namespaces.iter().position(|ns| ns == namespace) else {
            return;
        };
        let client = self.client(namespace);
        for listener in self.engine.listeners().disconnect_listeners(namespace) {
            listener.on_disconnect(&client, reason);
        }
        self.namespaces.remove(index);
        self.engine.hub().disconnect(self.id(), namespace);
    }

    fn on_emit(&mut self, mut packet: SocketPacket, ack: Option<PendingAck>) {
        if self.is_closing() {
            if let Some(pending) = ack {
                pending.callback.on_timeout();
            }
            return;
        }
        if let Some(pending) = ack {
            let ack_id = self.acks.register(pending.callback);
            packet.ack_id = Some(ack_id);
            let timeout = pending
                .timeout
                .unwrap_or(self.engine.config().ack_timeout);
            self.arm(TimeoutKind::Ack(ack_id), timeout);
        }
        self.enqueue(EnginePacket::message(&packet));
        self.flush();
    }

    fn on_attach_probe(&mut self, socket: BoundSocket, meta: ChannelMeta) {
        let accepted = !self.is_closing()
            && self.transport == TransportKind::Polling
            && self.engine.config().allow_upgrades
            && self.probe.is_none();
        if !accepted {
            tracing::debug!(session = %self.id(), channel = socket.channel, "upgrade probe rejected");
            let _ = socket.tx.send(SocketFrame::Close);
            return;
        }
        self.touch(Some(meta));
        self.probe = Some(socket);
        // A probe that never sends `2probe` must not hold the slot forever.
        self.arm(TimeoutKind::Upgrade, self.engine.config().upgrade_timeout);
    }

    fn on_probe(&mut self) {
        if let Some(probe) = &self.probe {
            let _ = probe
                .tx
                .send(SocketFrame::Packet(EnginePacket::new(PacketType::Pong, "probe")));
        }
        self.state = SessionState::Upgrading;
        self.arm(TimeoutKind::Upgrade, self.engine.config().upgrade_timeout);
        // Let the client stop polling while it finishes the upgrade.
        if let Some(poll) = self.poll.take() {
            let _ = poll.reply.send(vec![EnginePacket::empty(PacketType::Noop)]);
        }
        self.publish_status();
    }

    fn complete_upgrade(&mut self) {
        self.disarm(TimeoutKind::Upgrade);
        let Some(socket) = self.probe.take() else {
            return;
        };
        self.socket = Some(socket);
        self.transport = TransportKind::WebSocket;
        self.state = SessionState::Open;
        if let Some(poll) = self.poll.take() {
            let _ = poll.reply.send(vec![EnginePacket::empty(PacketType::Noop)]);
        }
        self.publish_status();
        tracing::info!(session = %self.id(), "upgraded to websocket");
    }

    fn discard_probe(&mut self) {
        self.disarm(TimeoutKind::Upgrade);
        if let Some(probe) = self.probe.take() {
            let _ = probe.tx.send(SocketFrame::Close);
            tracing::debug!(session = %self.id(), channel = probe.channel, "upgrade probe discarded");
        }
        if self.state == SessionState::Upgrading {
            self.state = SessionState::Open;
            self.publish_status();
        }
    }

    fn on_channel_closed(&mut self, channel: ChannelId) {
        if self.is_closing() {
            return;
        }
        if self.is_probe(channel) {
            self.discard_probe();
        } else if self.transport == TransportKind::WebSocket && self.is_bound_socket(channel) {
            self.close(DisconnectReason::TransportClose);
        } else if self.transport == TransportKind::Polling
            && self.poll.as_ref().is_some_and(|poll| poll.channel == channel)
        {
            self.close(DisconnectReason::TransportClose);
        } else {
            tracing::debug!(session = %self.id(), channel, "stale channel closed");
        }
    }

    fn on_timeout(&mut self, kind: TimeoutKind, generation: u64) {
        if self.timers.get(&kind) != Some(&generation) {
            tracing::debug!(session = %self.id(), ?kind, "stale timeout ignored");
            return;
        }
        self.timers.remove(&kind);
        match kind {
            TimeoutKind::Ping => {
                tracing::info!(session = %self.id(), "ping timeout");
                self.close(DisconnectReason::PingTimeout);
            }
            TimeoutKind::Upgrade => self.discard_probe(),
            TimeoutKind::Ack(ack_id) => {
                if let Some(callback) = self.acks.take(ack_id) {
                    callback.on_timeout();
                }
            }
        }
    }

    /// Runs the disconnect path once; later calls are no-ops.
    fn close(&mut self, reason: DisconnectReason) {
        if self.is_closing() {
            return;
        }
        let id = self.id();
        self.state = SessionState::Closing;
        self.publish_status();

        self.engine.scheduler().cancel_session(id);
        self.timers.clear();

        let namespaces = std::mem::take(&mut self.namespaces);
        for namespace in &namespaces {
            let client = self.client(namespace);
            for listener in self.engine.listeners().disconnect_listeners(namespace) {
                listener.on_disconnect(&client, reason);
            }
        }
        self.engine.hub().remove_session(id);
        self.engine.registry().remove(&id);

        for callback in self.acks.drain() {
            callback.on_timeout();
        }
        if let Some(poll) = self.poll.take() {
            let _ = poll.reply.send(vec![EnginePacket::empty(PacketType::Close)]);
        }
        if let Some(socket) = self.socket.take() {
            let _ = socket
                .tx
                .send(SocketFrame::Packet(EnginePacket::empty(PacketType::Close)));
            let _ = socket.tx.send(SocketFrame::Close);
        }
        if let Some(probe) = self.probe.take() {
            let _ = probe.tx.send(SocketFrame::Close);
        }
        self.queue.clear();

        self.state = SessionState::Closed;
        self.publish_status();
        self.handle.closed.notify_waiters();
        tracing::info!(session = %id, reason = reason.as_str(), "session closed");
    }

    fn enqueue(&mut self, packet: EnginePacket) {
        self.queue.push_back(packet);
    }

    /// Hands queued packets to the bound channel, if there is one.
    fn flush(&mut self) {
        if self.queue.is_empty() || self.is_closing() {
            return;
        }
        match self.transport {
            TransportKind::WebSocket => {
                let Some(socket) = &self.socket else {
                    return;
                };
                while let Some(packet) = self.queue.pop_front() {
                    if let Err(unsent) = socket.tx.send(SocketFrame::Packet(packet)) {
                        if let SocketFrame::Packet(packet) = unsent.0 {
                            self.queue.push_front(packet);
                        }
                        break;
                    }
                }
            }
            TransportKind::Polling => {
                let Some(poll) = self.poll.take() else {
                    return;
                };
                let packets: Vec<EnginePacket> = self.queue.drain(..).collect();
                if let Err(packets) = poll.reply.send(packets) {
                    // The request gave up waiting; keep the packets for the next one.
                    for packet in packets.into_iter().rev() {
                        self.queue.push_front(packet);
                    }
                }
            }
        }
    }

    fn arm(&mut self, kind: TimeoutKind, delay: Duration) {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.timers.insert(kind, generation);
        self.engine.scheduler().schedule_on_context(
            SchedulerKey::new(self.id(), kind),
            delay,
            &self.handle.mailbox,
            SessionCommand::Timeout { kind, generation },
        );
    }

    fn disarm(&mut self, kind: TimeoutKind) {
        if self.timers.remove(&kind).is_some() {
            self.engine
                .scheduler()
                .cancel(SchedulerKey::new(self.id(), kind));
        }
    }

    /// Records client activity and pushes the heartbeat deadline out.
    fn touch(&mut self, meta: Option<ChannelMeta>) {
        self.last_activity = Utc::now();
        if let Some(meta) = meta {
            if meta.origin.is_some() {
                self.meta.origin = meta.origin;
            }
            if meta.user_agent.is_some() {
                self.meta.user_agent = meta.user_agent;
            }
        }
        self.arm(TimeoutKind::Ping, self.engine.config().heartbeat_deadline());
        self.publish_status();
    }

    fn is_probe(&self, channel: ChannelId) -> bool {
        self.probe.as_ref().is_some_and(|probe| probe.channel == channel)
    }

    fn is_bound_socket(&self, channel: ChannelId) -> bool {
        self.socket
            .as_ref()
            .is_some_and(|socket| socket.channel == channel)
    }

    fn client(&self, namespace: &str) -> SocketClient {
        SocketClient::new(
            self.handle.clone(),
            namespace,
            Arc::clone(self.engine.hub()),
        )
    }

    fn publish_status(&self) {
        self.handle.status.store(Arc::new(SessionStatus {
            state: self.state,
            transport: self.transport,
            last_activity: self.last_activity,
            origin: self.meta.origin.clone(),
            user_agent: self.meta.user_agent.clone(),
        }));
    }
}
