use serde_json::Value;
use std::collections::HashMap;

use super::session::SessionHandle;
use crate::protocol::SocketPacket;

/// Callback for an event sent with an acknowledgement request. Exactly one of
/// the two methods runs.
pub trait AckCallback: Send + 'static {
    fn on_ack(self: Box<Self>, args: Vec<Value>);

    /// The client did not answer in time, or the session closed first.
    fn on_timeout(self: Box<Self>);
}

impl<F> AckCallback for F
where
    F: FnOnce(Option<Vec<Value>>) + Send + 'static,
{
    fn on_ack(self: Box<Self>, args: Vec<Value>) {
        (*self)(Some(args))
    }

    fn on_timeout(self: Box<Self>) {
        (*self)(None)
    }
}

/// Outstanding acknowledgements of one session. Owned by the session task.
#[derive(Default)]
pub(crate) struct AckRegistry {
    next_id: u64,
    pending: HashMap<u64, Box<dyn AckCallback>>,
}

impl AckRegistry {
    pub(crate) fn register(&mut self, callback: Box<dyn AckCallback>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, callback);
        id
    }

    pub(crate) fn take(&mut self, id: u64) -> Option<Box<dyn AckCallback>> {
        self.pending.remove(&id)
    }

    pub(crate) fn drain(&mut self) -> Vec<Box<dyn AckCallback>> {
        self.pending.drain().map(|(_, callback)| callback).collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Answers an acknowledgement the client asked for.
pub struct AckSender {
    session: SessionHandle,
    namespace: String,
    ack_id: u64,
}

impl AckSender {
    pub(crate) fn new(session: SessionHandle, namespace: &str, ack_id: u64) -> Self {
        Self {
            session,
            namespace: namespace.to_string(),
            ack_id,
        }
    }

    pub fn ack_id(&self) -> u64 {
        self.ack_id
    }

    /// Sends the acknowledgement. Returns `false` if the session is gone.
    pub fn send(self, args: Vec<Value>) -> bool {
        self.session
            .emit(SocketPacket::ack(&self.namespace, self.ack_id, args))
    }
}
