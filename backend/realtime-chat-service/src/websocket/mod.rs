use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

pub mod events;
pub mod handlers;
pub mod session;

/// Broadcast target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Room {
    /// Everyone currently viewing a conversation
    Conversation(Uuid),
    /// Private room of one user
    User(Uuid),
}

/// Outbound side of one WebSocket connection
///
/// Cloning is cheap; all clones feed the same session actor.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub user_id: Uuid,
    sender: UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(user_id: Uuid, sender: UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            sender,
        }
    }

    /// Queue a frame. Returns false if the session is gone.
    pub fn send(&self, frame: String) -> bool {
        self.sender.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Room membership for all live connections
///
/// Each room maps to an immutable member snapshot. Joins and leaves swap
/// the snapshot; broadcasts clone the `Arc` and send without holding any
/// shard lock, so a slow room never blocks another.
#[derive(Default, Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<Room, Arc<Vec<ConnectionHandle>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, room: Room, handle: &ConnectionHandle) {
        let mut entry = self.rooms.entry(room).or_default();
        if entry.iter().any(|h| h.id == handle.id) {
            return;
        }
        let mut next: Vec<ConnectionHandle> = entry.iter().cloned().collect();
        next.push(handle.clone());
        *entry = Arc::new(next);
    }

    pub fn leave(&self, room: Room, connection_id: Uuid) {
        if let Some(mut entry) = self.rooms.get_mut(&room) {
            if entry.iter().any(|h| h.id == connection_id) {
                let next: Vec<ConnectionHandle> = entry
                    .iter()
                    .filter(|h| h.id != connection_id)
                    .cloned()
                    .collect();
                *entry = Arc::new(next);
            }
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
    }

    /// Remove a connection from every room it is in
    pub fn leave_all(&self, connection_id: Uuid) {
        let joined: Vec<Room> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().iter().any(|h| h.id == connection_id))
            .map(|entry| *entry.key())
            .collect();
        for room in joined {
            self.leave(room, connection_id);
        }
    }

    pub fn members(&self, room: Room) -> Arc<Vec<ConnectionHandle>> {
        self.rooms
            .get(&room)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    pub fn is_member(&self, room: Room, connection_id: Uuid) -> bool {
        self.members(room).iter().any(|h| h.id == connection_id)
    }

    /// Send `frame` to every member of `room` except connections of
    /// `except_user`. Returns the number of live recipients.
    pub fn broadcast(&self, room: Room, frame: &str, except_user: Option<Uuid>) -> usize {
        let snapshot = self.members(room);
        let mut delivered = 0;
        let mut dead = Vec::new();

        for handle in snapshot.iter() {
            if Some(handle.user_id) == except_user {
                continue;
            }
            if handle.send(frame.to_string()) {
                delivered += 1;
            } else {
                dead.push(handle.id);
            }
        }

        if !dead.is_empty() {
            tracing::debug!(room = ?room, pruned = dead.len(), "pruning closed connections");
            for id in dead {
                self.leave(room, id);
            }
        }
        delivered
    }

    pub fn send_to_user(&self, user_id: Uuid, frame: &str) -> usize {
        self.broadcast(Room::User(user_id), frame, None)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
