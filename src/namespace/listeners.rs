use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::ack::AckSender;
use crate::engine::client::SocketClient;
use crate::engine::session::DisconnectReason;

/// Application callbacks for one namespace. Every method defaults to a no-op,
/// so an implementation only overrides what it registered for.
///
/// Listeners run on the session's own task and must not block; anything slow
/// belongs in a spawned task holding a clone of the [`SocketClient`].
pub trait EventListener: Send + Sync {
    fn on_connect(&self, _client: &SocketClient) {}

    fn on_disconnect(&self, _client: &SocketClient, _reason: DisconnectReason) {}

    /// `ack` is present when the client asked for an acknowledgement.
    fn on_event(
        &self,
        _client: &SocketClient,
        _event: &str,
        _args: Vec<Value>,
        _ack: Option<AckSender>,
    ) {
    }

    fn on_error(&self, _client: &SocketClient, _error: &Value) {}
}

type Listeners = Vec<Arc<dyn EventListener>>;

/// Registration table mapping namespaces and event names to listeners.
/// Built once at startup and read-only afterwards.
#[derive(Default, Clone)]
pub struct ListenerTable {
    connect: HashMap<String, Listeners>,
    disconnect: HashMap<String, Listeners>,
    events: HashMap<(String, String), Listeners>,
    errors: HashMap<String, Listeners>,
}

impl ListenerTable {
    pub fn builder() -> ListenerTableBuilder {
        ListenerTableBuilder::default()
    }

    pub fn connect_listeners(&self, namespace: &str) -> &[Arc<dyn EventListener>] {
        self.connect.get(namespace).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn disconnect_listeners(&self, namespace: &str) -> &[Arc<dyn EventListener>] {
        self.disconnect
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn event_listeners(&self, namespace: &str, event: &str) -> &[Arc<dyn EventListener>] {
        self.events
            .get(&(namespace.to_string(), event.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn error_listeners(&self, namespace: &str) -> &[Arc<dyn EventListener>] {
        self.errors.get(namespace).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.connect.is_empty()
            && self.disconnect.is_empty()
            && self.events.is_empty()
            && self.errors.is_empty()
    }
}

#[derive(Default)]
pub struct ListenerTableBuilder {
    table: ListenerTable,
}

impl ListenerTableBuilder {
    pub fn on_connect(mut self, namespace: &str, listener: Arc<dyn EventListener>) -> Self {
        self.table
            .connect
            .entry(namespace.to_string())
            .or_default()
            .push(listener);
        self
    }

    pub fn on_disconnect(mut self, namespace: &str, listener: Arc<dyn EventListener>) -> Self {
        self.table
            .disconnect
            .entry(namespace.to_string())
            .or_default()
            .push(listener);
        self
    }

    pub fn on_event(
        mut self,
        namespace: &str,
        event: &str,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        self.table
            .events
            .entry((namespace.to_string(), event.to_string()))
            .or_default()
            .push(listener);
        self
    }

    pub fn on_error(mut self, namespace: &str, listener: Arc<dyn EventListener>) -> Self {
        self.table
            .errors
            .entry(namespace.to_string())
            .or_default()
            .push(listener);
        self
    }

    pub fn build(self) -> ListenerTable {
        self.table
    }
}
