//! Namespaces and rooms.
//!
//! Each [`Namespace`] keeps its membership behind its own lock; nothing here
//! locks across namespaces. Membership may include sessions that live on a
//! peer node (mirrored from the pub/sub store), but packets are only ever
//! delivered to sessions found in the local [`SessionRegistry`].

pub mod listeners;

use dashmap::{DashMap, DashSet};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use uuid::Uuid;

use crate::engine::registry::SessionRegistry;
use crate::protocol::SocketPacket;
use crate::store::{PubSubEnvelope, PubSubMessage, PubSubStore, PubSubType, StoreError};

pub use listeners::{EventListener, ListenerTable, ListenerTableBuilder};

pub const ROOT_NAMESPACE: &str = "/";

#[derive(Debug, Default)]
struct Membership {
    clients: HashSet<Uuid>,
    rooms: HashMap<String, HashSet<Uuid>>,
    session_rooms: HashMap<Uuid, HashSet<String>>,
}

impl Membership {
    fn join(&mut self, session_id: Uuid, room: &str) -> bool {
        self.clients.insert(session_id);
        let added = self
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(session_id);
        self.session_rooms
            .entry(session_id)
            .or_default()
            .insert(room.to_string());
        added
    }

    fn leave(&mut self, session_id: Uuid, room: &str) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(members) => {
                let removed = members.remove(&session_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
                removed
            }
            None => false,
        };
        if let Some(rooms) = self.session_rooms.get_mut(&session_id) {
            rooms.remove(room);
        }
        removed
    }

    /// Drops the session from the namespace, returning the rooms it was in.
    fn remove(&mut self, session_id: Uuid) -> Vec<String> {
        self.clients.remove(&session_id);
        let rooms: Vec<String> = self
            .session_rooms
            .remove(&session_id)
            .map(|rooms| rooms.into_iter().collect())
            .unwrap_or_default();
        for room in &rooms {
            if let Some(members) = self.rooms.get_mut(room) {
                members.remove(&session_id);
                if members.is_empty() {
                    self.rooms.remove(room);
                }
            }
        }
        rooms
    }
}

pub struct Namespace {
    name: String,
    membership: RwLock<Membership>,
}

impl Namespace {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            membership: RwLock::new(Membership::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> RwLockReadGuard<'_, Membership> {
        self.membership.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Membership> {
        self.membership.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a client together with the room named after its session id.
    /// Returns `false` if it was already a member.
    pub fn add_client(&self, session_id: Uuid) -> bool {
        let mut membership = self.write();
        let added = !membership.clients.contains(&session_id);
        membership.join(session_id, &session_id.to_string());
        added
    }

    pub fn remove_client(&self, session_id: Uuid) -> Vec<String> {
        self.write().remove(session_id)
    }

    pub fn has_client(&self, session_id: Uuid) -> bool {
        self.read().clients.contains(&session_id)
    }

    pub fn join(&self, session_id: Uuid, room: &str) -> bool {
        self.write().join(session_id, room)
    }

    pub fn leave(&self, session_id: Uuid, room: &str) -> bool {
        self.write().leave(session_id, room)
    }

    pub fn clients(&self) -> Vec<Uuid> {
        self.read().clients.iter().copied().collect()
    }

    pub fn rooms(&self) -> Vec<String> {
        self.read().rooms.keys().cloned().collect()
    }

    pub fn rooms_of(&self, session_id: Uuid) -> Vec<String> {
        self.read()
            .session_rooms
            .get(&session_id)
            .map(|rooms| rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn room_members(&self, room: &str) -> Vec<Uuid> {
        self.read()
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Membership snapshot a broadcast is delivered against.
    fn recipients(&self, room: Option<&str>) -> Vec<Uuid> {
        match room {
            Some(room) => self.room_members(room),
            None => self.clients(),
        }
    }
}

/// All namespaces of this node plus the store used to mirror them to peers.
pub struct NamespaceHub {
    namespaces: DashMap<String, Arc<Namespace>>,
    registry: Arc<SessionRegistry>,
    store: Arc<dyn PubSubStore>,
    /// Sessions learned about from peers, so their membership can be dropped
    /// when the owning node reports a disconnect.
    remote_sessions: DashSet<Uuid>,
}

impl NamespaceHub {
    pub fn new(registry: Arc<SessionRegistry>, store: Arc<dyn PubSubStore>) -> Arc<Self> {
        let hub = Arc::new(Self {
            namespaces: DashMap::new(),
            registry,
            store,
            remote_sessions: DashSet::new(),
        });
        hub.namespace(ROOT_NAMESPACE);
        hub
    }

    /// Subscribes to the peer topics. Messages this node published itself are
    /// ignored.
    pub fn attach_store(self: &Arc<Self>) -> Result<(), StoreError> {
        for topic in PubSubType::ALL {
            let hub: Weak<NamespaceHub> = Arc::downgrade(self);
            let node_id = self.store.node_id().to_string();
            self.store.subscribe(
                topic,
                Arc::new(move |envelope: &PubSubEnvelope| {
                    if envelope.node_id == node_id {
                        return;
                    }
                    if let Some(hub) = hub.upgrade() {
                        hub.apply_peer_message(envelope);
                    }
                }),
            )?;
        }
        Ok(())
    }

    pub fn store(&self) -> &Arc<dyn PubSubStore> {
        &self.store
    }

    /// Returns the namespace, creating it on first reference.
    pub fn namespace(&self, name: &str) -> Arc<Namespace> {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Namespace::new(name)))
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(name).map(|ns| Arc::clone(ns.value()))
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces.iter().map(|ns| ns.key().clone()).collect()
    }

    /// Connects a session to a namespace. Returns `false` if it already was.
    pub fn connect(&self, session_id: Uuid, namespace: &str) -> bool {
        let added = self.namespace(namespace).add_client(session_id);
        if added {
            self.publish(PubSubMessage::JoinLeave {
                session_id,
                namespace: namespace.to_string(),
                room: session_id.to_string(),
                join: true,
            });
        }
        added
    }

    /// Disconnects a session from one namespace, leaving all of its rooms there.
    pub fn disconnect(&self, session_id: Uuid, namespace: &str) -> bool {
        let Some(ns) = self.get(namespace) else {
            return false;
        };
        if !ns.has_client(session_id) {
            return false;
        }
        for room in ns.remove_client(session_id) {
            self.publish(PubSubMessage::JoinLeave {
                session_id,
                namespace: namespace.to_string(),
                room,
                join: false,
            });
        }
        true
    }

    pub fn join(&self, session_id: Uuid, namespace: &str, room: &str) -> bool {
        let joined = self.namespace(namespace).join(session_id, room);
        if joined {
            self.publish(PubSubMessage::JoinLeave {
                session_id,
                namespace: namespace.to_string(),
                room: room.to_string(),
                join: true,
            });
        }
        joined
    }

    pub fn leave(&self, session_id: Uuid, namespace: &str, room: &str) -> bool {
        let Some(ns) = self.get(namespace) else {
            return false;
        };
        let left = ns.leave(session_id, room);
        if left {
            self.publish(PubSubMessage::JoinLeave {
                session_id,
                namespace: namespace.to_string(),
                room: room.to_string(),
                join: false,
            });
        }
        left
    }

    /// Delivers `packet` to the local members of `room` (the whole namespace
    /// for `None`), then publishes it for peers. Returns the number of local
    /// sessions it was handed to.
    pub fn broadcast(
        &self,
        namespace: &str,
        room: Option<&str>,
        packet: SocketPacket,
        excluding: Option<Uuid>,
    ) -> usize {
        let delivered = self.deliver_local(namespace, room, &packet, excluding);
        self.publish(PubSubMessage::Dispatch {
            namespace: namespace.to_string(),
            room: room.map(str::to_string),
            packet,
        });
        delivered
    }

    fn deliver_local(
        &self,
        namespace: &str,
        room: Option<&str>,
        packet: &SocketPacket,
        excluding: Option<Uuid>,
    ) -> usize {
        let Some(ns) = self.get(namespace) else {
            return 0;
        };
        let mut delivered = 0;
        for session_id in ns.recipients(room) {
            if Some(session_id) == excluding {
                continue;
            }
            if let Some(handle) = self.registry.get(&session_id) {
                if handle.emit(packet.clone()) {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(namespace, ?room, delivered, "broadcast delivered locally");
        delivered
    }

    /// Removes a closing local session from every namespace and tells peers.
    /// Returns the namespaces it was a member of.
    pub fn remove_session(&self, session_id: Uuid) -> Vec<String> {
        let left = self.drop_membership(session_id);
        self.publish(PubSubMessage::Disconnect { session_id });
        left
    }

    pub fn namespaces_of(&self, session_id: Uuid) -> Vec<String> {
        self.namespaces
            .iter()
            .filter(|ns| ns.has_client(session_id))
            .map(|ns| ns.key().clone())
            .collect()
    }

    pub fn rooms_of(&self, session_id: Uuid, namespace: &str) -> Vec<String> {
        self.get(namespace)
            .map(|ns| ns.rooms_of(session_id))
            .unwrap_or_default()
    }

    pub fn clients(&self, namespace: &str) -> Vec<Uuid> {
        self.get(namespace).map(|ns| ns.clients()).unwrap_or_default()
    }

    pub fn room_members(&self, namespace: &str, room: &str) -> Vec<Uuid> {
        self.get(namespace)
            .map(|ns| ns.room_members(room))
            .unwrap_or_default()
    }

    pub fn is_remote(&self, session_id: Uuid) -> bool {
        self.remote_sessions.contains(&session_id)
    }

    /// Publishes a lifecycle message; failures only cost peer visibility.
    pub fn publish(&self, message: PubSubMessage) {
        let topic = message.topic();
        if let Err(e) = self.store.publish(topic, message) {
            tracing::warn!(?topic, "pub/sub publish failed: {e}");
        }
    }

    /// Applies a message published by a peer node. Never republishes.
    pub fn apply_peer_message(&self, envelope: &PubSubEnvelope) {
        match &envelope.message {
            PubSubMessage::Connect { session_id } => {
                tracing::debug!(peer = %envelope.node_id, session = %session_id, "peer session connected");
            }
            PubSubMessage::Disconnect { session_id } => {
                if self.remote_sessions.remove(session_id).is_some() {
                    self.drop_membership(*session_id);
                }
            }
            PubSubMessage::JoinLeave {
                session_id,
                namespace,
                room,
                join,
            } => {
                if self.registry.contains(session_id) {
                    return;
                }
                let ns = self.namespace(namespace);
                if *join {
                    self.remote_sessions.insert(*session_id);
                    ns.join(*session_id, room);
                } else {
                    ns.leave(*session_id, room);
                    if ns.rooms_of(*session_id).is_empty() {
                        ns.remove_client(*session_id);
                    }
                }
            }
            PubSubMessage::Dispatch {
                namespace,
                room,
                packet,
            } => {
                self.deliver_local(namespace, room.as_deref(), packet, None);
            }
        }
    }

    fn drop_membership(&self, session_id: Uuid) -> Vec<String> {
        let mut left = Vec::new();
        for entry in self.namespaces.iter() {
            if entry.has_client(session_id) {
                entry.remove_client(session_id);
                left.push(entry.key().clone());
            }
        }
        left
    }
}
