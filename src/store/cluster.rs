use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{
    check_topic, PubSubEnvelope, PubSubListener, PubSubMessage, PubSubStore, PubSubType,
    StoreError,
};

/// A frame as it travels over the bus: the topic plus the JSON encoded envelope.
#[derive(Debug, Clone)]
struct ClusterFrame {
    topic: PubSubType,
    body: Arc<str>,
}

/// In-process stand-in for an external message broker shared by several
/// engines. Frames are serialized on publish exactly as they would be for a
/// real broker. Every attached node has its own unbounded inbox, and a publish
/// appends to all of them under one lock, so every node sees the frames in the
/// same order and none are dropped.
pub struct ClusterBus {
    inboxes: Mutex<Vec<Inbox>>,
    next_inbox: AtomicU64,
}

struct Inbox {
    id: u64,
    tx: mpsc::UnboundedSender<ClusterFrame>,
}

impl ClusterBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: Mutex::new(Vec::new()),
            next_inbox: AtomicU64::new(1),
        })
    }

    /// Connects a new node to the bus. Spawns the node's receiver task, so it
    /// must be called from within a tokio runtime.
    pub fn attach(self: &Arc<Self>, node_id: impl Into<String>) -> ClusterPubSubStore {
        let node_id = node_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let inbox = self.next_inbox.fetch_add(1, Ordering::Relaxed);
        self.inboxes().push(Inbox { id: inbox, tx });

        let listeners = Arc::new(DashMap::new());
        let receiver = tokio::spawn(receive(node_id.clone(), rx, Arc::clone(&listeners)));
        ClusterPubSubStore {
            node_id,
            bus: Arc::clone(self),
            inbox,
            listeners,
            receiver,
            closed: AtomicBool::new(false),
        }
    }

    fn publish(&self, frame: ClusterFrame) {
        self.inboxes().retain(|inbox| inbox.tx.send(frame.clone()).is_ok());
    }

    fn detach(&self, inbox: u64) {
        self.inboxes().retain(|entry| entry.id != inbox);
    }

    fn inboxes(&self) -> MutexGuard<'_, Vec<Inbox>> {
        self.inboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of nodes currently attached.
    pub fn nodes(&self) -> usize {
        self.inboxes().len()
    }
}

type TopicListeners = DashMap<PubSubType, Vec<Arc<dyn PubSubListener>>>;

/// Store backed by a [`ClusterBus`]. One task per node decodes the inbox and
/// calls the listeners of each frame's topic, so frames of different topics
/// are applied in the order they were published.
pub struct ClusterPubSubStore {
    node_id: String,
    bus: Arc<ClusterBus>,
    inbox: u64,
    listeners: Arc<TopicListeners>,
    receiver: JoinHandle<()>,
    closed: AtomicBool,
}

async fn receive(
    node_id: String,
    mut rx: mpsc::UnboundedReceiver<ClusterFrame>,
    listeners: Arc<TopicListeners>,
) {
    while let Some(frame) = rx.recv().await {
        // Cloned out so a listener never runs under a map guard.
        let targets = match listeners.get(&frame.topic) {
            Some(entry) => entry.value().clone(),
            None => continue,
        };
        match serde_json::from_str::<PubSubEnvelope>(&frame.body) {
            Ok(envelope) => {
                for listener in &targets {
                    listener.on_message(&envelope);
                }
            }
            Err(e) => {
                tracing::warn!(node = %node_id, topic = ?frame.topic, "undecodable cluster frame: {e}")
            }
        }
    }
    tracing::debug!(node = %node_id, "cluster inbox closed");
}

impl PubSubStore for ClusterPubSubStore {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn publish(&self, topic: PubSubType, message: PubSubMessage) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ShutDown);
        }
        check_topic(topic, &message)?;

        let envelope = PubSubEnvelope {
            node_id: self.node_id.clone(),
            message,
        };
        let body: Arc<str> = serde_json::to_string(&envelope)?.into();
        self.bus.publish(ClusterFrame { topic, body });
        Ok(())
    }

    fn subscribe(
        &self,
        topic: PubSubType,
        listener: Arc<dyn PubSubListener>,
    ) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ShutDown);
        }
        self.listeners.entry(topic).or_default().push(listener);
        Ok(())
    }

    fn unsubscribe(&self, topic: PubSubType) {
        self.listeners.remove(&topic);
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.listeners.clear();
        self.bus.detach(self.inbox);
        self.receiver.abort();
        tracing::debug!(node = %self.node_id, "cluster store shut down");
    }
}

impl Drop for ClusterPubSubStore {
    fn drop(&mut self) {
        self.bus.detach(self.inbox);
        self.receiver.abort();
    }
}
