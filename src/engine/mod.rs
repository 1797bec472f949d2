pub mod ack;
pub mod client;
pub mod registry;
pub mod session;

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::namespace::{ListenerTable, NamespaceHub};
use crate::protocol::SocketPacket;
use crate::scheduler::Scheduler;
use crate::store::PubSubStore;
use registry::SessionRegistry;
use session::{BoundSocket, ChannelId, DisconnectReason, HandshakeData, SessionHandle, TransportKind};

pub use ack::{AckCallback, AckSender};
pub use client::SocketClient;

/// Owns the collaborators every session works with. Created once at startup.
pub struct Engine {
    config: Config,
    scheduler: Scheduler,
    registry: Arc<SessionRegistry>,
    hub: Arc<NamespaceHub>,
    listeners: ListenerTable,
    channel_ids: AtomicU64,
}

impl Engine {
    /// Must be called from within a tokio runtime: the scheduler and cluster
    /// subscriptions spawn tasks.
    pub fn new(config: Config, listeners: ListenerTable, store: Arc<dyn PubSubStore>) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new());
        let hub = NamespaceHub::new(Arc::clone(&registry), store);
        if let Err(e) = hub.attach_store() {
            tracing::warn!("failed to subscribe to pub/sub store: {e}");
        }
        tracing::info!(node = hub.store().node_id(), "engine started");
        Arc::new(Self {
            config,
            scheduler: Scheduler::new(),
            registry,
            hub,
            listeners,
            channel_ids: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<NamespaceHub> {
        &self.hub
    }

    pub fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    /// Allocates the id a transport tags its poll request or websocket with.
    pub fn next_channel_id(&self) -> ChannelId {
        self.channel_ids.fetch_add(1, Ordering::Relaxed)
    }

    /// Handshake: creates a session on `transport`. A websocket handshake
    /// passes the socket to bind right away.
    pub fn open_session(
        self: &Arc<Self>,
        transport: TransportKind,
        handshake: HandshakeData,
        socket: Option<BoundSocket>,
    ) -> SessionHandle {
        session::spawn(Arc::clone(self), transport, handshake, socket)
    }

    pub fn session(&self, sid: &str) -> Option<SessionHandle> {
        self.registry.lookup(sid)
    }

    /// Server-initiated broadcast of an event to a room, or the whole
    /// namespace for `None`.
    pub fn broadcast(&self, namespace: &str, room: Option<&str>, event: &str, args: Vec<Value>) -> usize {
        self.hub
            .broadcast(namespace, room, SocketPacket::event(namespace, event, args), None)
    }

    /// Closes every session, then stops the scheduler and the store.
    pub async fn shutdown(&self) {
        let sessions = self.registry.handles();
        tracing::info!(sessions = sessions.len(), "engine shutting down");
        for handle in &sessions {
            handle.disconnect(DisconnectReason::ServerShutdown);
        }
        for handle in &sessions {
            if tokio::time::timeout(Duration::from_secs(5), handle.closed())
                .await
                .is_err()
            {
                tracing::warn!(session = %handle.id(), "session did not close in time");
            }
        }
        self.scheduler.shutdown();
        self.hub.store().shutdown();
    }
}
