//! Publish/subscribe between server instances.
//!
//! Namespace and session lifecycle changes are published here so that peer
//! instances can mirror membership and deliver broadcasts to their own local
//! sessions. A single-process deployment uses [`MemoryPubSubStore`].

pub mod cluster;
pub mod memory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::SocketPacket;

pub use cluster::{ClusterBus, ClusterPubSubStore};
pub use memory::MemoryPubSubStore;

/// Topics a store routes messages by, one per message variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubSubType {
    Connect,
    Disconnect,
    Dispatch,
    JoinLeave,
}

impl PubSubType {
    pub const ALL: [PubSubType; 4] = [
        PubSubType::Connect,
        PubSubType::Disconnect,
        PubSubType::Dispatch,
        PubSubType::JoinLeave,
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PubSubMessage {
    Connect {
        session_id: Uuid,
    },
    Disconnect {
        session_id: Uuid,
    },
    /// A packet for every member of `room` in `namespace`, or of the whole
    /// namespace when `room` is `None`.
    Dispatch {
        namespace: String,
        room: Option<String>,
        packet: SocketPacket,
    },
    JoinLeave {
        session_id: Uuid,
        namespace: String,
        room: String,
        join: bool,
    },
}

impl PubSubMessage {
    pub fn topic(&self) -> PubSubType {
        match self {
            PubSubMessage::Connect { .. } => PubSubType::Connect,
            PubSubMessage::Disconnect { .. } => PubSubType::Disconnect,
            PubSubMessage::Dispatch { .. } => PubSubType::Dispatch,
            PubSubMessage::JoinLeave { .. } => PubSubType::JoinLeave,
        }
    }
}

/// A message together with the node that published it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubSubEnvelope {
    pub node_id: String,
    pub message: PubSubMessage,
}

pub trait PubSubListener: Send + Sync {
    fn on_message(&self, envelope: &PubSubEnvelope);
}

impl<F> PubSubListener for F
where
    F: Fn(&PubSubEnvelope) + Send + Sync,
{
    fn on_message(&self, envelope: &PubSubEnvelope) {
        self(envelope)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is shut down")]
    ShutDown,

    #[error("message of type {actual:?} published on topic {topic:?}")]
    TopicMismatch {
        topic: PubSubType,
        actual: PubSubType,
    },

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Delivery of [`PubSubMessage`]s between server instances.
///
/// Publishing is fire-and-forget: an error only means this one message was
/// not handed to the transport. Each subscriber sees the messages of a given
/// publisher in the order they were published.
pub trait PubSubStore: Send + Sync {
    /// Identifies this instance in the envelopes it publishes.
    fn node_id(&self) -> &str;

    fn publish(&self, topic: PubSubType, message: PubSubMessage) -> Result<(), StoreError>;

    fn subscribe(
        &self,
        topic: PubSubType,
        listener: Arc<dyn PubSubListener>,
    ) -> Result<(), StoreError>;

    fn unsubscribe(&self, topic: PubSubType);

    fn shutdown(&self);
}

fn check_topic(topic: PubSubType, message: &PubSubMessage) -> Result<(), StoreError> {
    let actual = message.topic();
    if actual == topic {
        Ok(())
    } else {
        Err(StoreError::TopicMismatch { topic, actual })
    }
}
