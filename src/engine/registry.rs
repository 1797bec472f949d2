use dashmap::DashMap;
use uuid::Uuid;

use super::session::SessionHandle;

/// All sessions owned by this node, looked up by id on every request.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handle: SessionHandle) {
        self.sessions.insert(handle.id(), handle);
    }

    pub fn get(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    /// Resolves a `sid` query value.
    pub fn lookup(&self, sid: &str) -> Option<SessionHandle> {
        let id = Uuid::parse_str(sid).ok()?;
        self.get(&id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn remove(&self, id: &Uuid) -> Option<SessionHandle> {
        self.sessions.remove(id).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }
}
