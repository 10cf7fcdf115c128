//! Which users currently hold a live connection, and which one.

use crate::websocket::ConnectionHandle;
use dashmap::DashMap;
use uuid::Uuid;

/// One active connection per user. A newer connection replaces the older
/// registration; the older socket stays open but no longer counts.
#[derive(Default)]
pub struct PresenceRegistry {
    online: DashMap<Uuid, ConnectionHandle>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle`, returning the connection it replaced
    pub fn set_online(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.online.insert(handle.user_id, handle)
    }

    pub fn set_offline(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.online.remove(&user_id).map(|(_, handle)| handle)
    }

    /// Remove the user only if `connection_id` is still their registered
    /// connection. Returns true if removed.
    pub fn set_offline_if(&self, user_id: Uuid, connection_id: Uuid) -> bool {
        self.online
            .remove_if(&user_id, |_, handle| handle.id == connection_id)
            .is_some()
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.contains_key(&user_id)
    }

    pub fn connection_for(&self, user_id: Uuid) -> Option<ConnectionHandle> {
        self.online.get(&user_id).map(|entry| entry.value().clone())
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }
}
