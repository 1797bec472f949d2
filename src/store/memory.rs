use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{
    check_topic, PubSubEnvelope, PubSubListener, PubSubMessage, PubSubStore, PubSubType,
    StoreError,
};

/// Single-process store: publishing calls the local listeners directly.
pub struct MemoryPubSubStore {
    node_id: String,
    listeners: DashMap<PubSubType, Vec<Arc<dyn PubSubListener>>>,
    closed: AtomicBool,
}

impl MemoryPubSubStore {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            listeners: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }
}

impl PubSubStore for MemoryPubSubStore {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    fn publish(&self, topic: PubSubType, message: PubSubMessage) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::ShutDown);
        }
        check_topic(topic, &message)?;

        // Snapshot so a listener may subscribe or publish without deadlocking.
        let listeners = match self.listeners.get(&topic) {
            Some(listeners) => listeners.clone(),
            None => return Ok(()),
        };
        let envelope = PubSubEnvelope {
            node_id: self.node_id.clone(),
            message,
        };
        for listener in listeners {
            listener.on_message(&envelope);
        }
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
        self.closed.store(true, Ordering::Release);
        self.listeners.clear();
    }
}
