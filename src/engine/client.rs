use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::ack::AckCallback;
use super::session::{
    DisconnectReason, HandshakeData, PendingAck, SessionCommand, SessionHandle, SessionStatus,
};
use crate::namespace::NamespaceHub;
use crate::protocol::SocketPacket;

/// A session as seen from one namespace, handed to listeners.
#[derive(Clone)]
pub struct SocketClient {
    session: SessionHandle,
    namespace: String,
    hub: Arc<NamespaceHub>,
}

impl SocketClient {
    pub(crate) fn new(session: SessionHandle, namespace: &str, hub: Arc<NamespaceHub>) -> Self {
        Self {
            session,
            namespace: namespace.to_string(),
            hub,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn handshake(&self) -> &HandshakeData {
        self.session.handshake()
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.session.status()
    }

    pub fn is_connected(&self) -> bool {
        !self.session.is_closed()
    }

    pub fn send_event(&self, event: &str, args: Vec<Value>) -> bool {
        self.session
            .emit(SocketPacket::event(&self.namespace, event, args))
    }

    /// Sends an event the client must acknowledge. The callback gets the
    /// acknowledgement arguments, or `None` once `timeout` (the configured
    /// ack timeout when not given) runs out.
    pub fn send_event_with_ack<C>(
        &self,
        event: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
        callback: C,
    ) -> bool
    where
        C: AckCallback,
    {
        self.session.send(SessionCommand::Emit {
            packet: SocketPacket::event(&self.namespace, event, args),
            ack: Some(PendingAck {
                callback: Box::new(callback),
                timeout,
            }),
        })
    }

    pub fn join_room(&self, room: &str) -> bool {
        self.hub.join(self.session_id(), &self.namespace, room)
    }

    pub fn leave_room(&self, room: &str) -> bool {
        self.hub.leave(self.session_id(), &self.namespace, room)
    }

    /// Rooms this session is in within the namespace, its own room included.
    pub fn rooms(&self) -> Vec<String> {
        self.hub.rooms_of(self.session_id(), &self.namespace)
    }

    /// Sends an event to everyone in `room` (the whole namespace for `None`)
    /// except this session.
    pub fn broadcast_to(&self, room: Option<&str>, event: &str, args: Vec<Value>) -> usize {
        self.hub.broadcast(
            &self.namespace,
            room,
            SocketPacket::event(&self.namespace, event, args),
            Some(self.session_id()),
        )
    }

    /// Closes the whole session, not just this namespace.
    pub fn disconnect(&self) -> bool {
        self.session.disconnect(DisconnectReason::ServerDisconnect)
    }
}
