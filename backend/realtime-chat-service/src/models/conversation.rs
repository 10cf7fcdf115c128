use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use super::message::MessageView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::Direct => "direct",
            ConversationKind::Group => "group",
        }
    }
}

/// Conversation document.
///
/// `participants` keeps insertion order so admin promotion on leave is
/// deterministic (first remaining participant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: Vec<Uuid>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub admin: Option<Uuid>,
    pub last_message_id: Option<Uuid>,
    pub last_activity_at: DateTime<Utc>,
    pub unread: BTreeMap<Uuid, u32>,
    pub muted_by: BTreeSet<Uuid>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Canonical key for an unordered pair of users
pub fn direct_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Result of removing a participant from a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    pub new_admin: Option<Uuid>,
    pub deactivated: bool,
}

impl Conversation {
    pub fn new_direct(a: Uuid, b: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            participants: vec![a, b],
            name: None,
            icon: None,
            admin: None,
            last_message_id: None,
            last_activity_at: now,
            unread: [(a, 0), (b, 0)].into_iter().collect(),
            muted_by: BTreeSet::new(),
            active: true,
            created_at: now,
        }
    }

    /// `participants` must already contain the creator and be de-duplicated.
    pub fn new_group(
        creator: Uuid,
        name: String,
        icon: Option<String>,
        participants: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            unread: participants.iter().map(|p| (*p, 0)).collect(),
            participants,
            name: Some(name),
            icon,
            admin: Some(creator),
            last_message_id: None,
            last_activity_at: now,
            muted_by: BTreeSet::new(),
            active: true,
            created_at: now,
        }
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }

    pub fn direct_key(&self) -> Option<String> {
        match (self.kind, self.participants.as_slice()) {
            (ConversationKind::Direct, [a, b]) => Some(direct_key(*a, *b)),
            _ => None,
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn others(&self, user_id: Uuid) -> impl Iterator<Item = Uuid> + '_ {
        self.participants
            .iter()
            .copied()
            .filter(move |p| *p != user_id)
    }

    pub fn unread_for(&self, user_id: Uuid) -> u32 {
        self.unread.get(&user_id).copied().unwrap_or(0)
    }

    pub fn is_muted_by(&self, user_id: Uuid) -> bool {
        self.muted_by.contains(&user_id)
    }

    /// Smallest creation time a new message may take so per-conversation
    /// order stays strict even if the wall clock stalls or steps back.
    /// Truncated to microseconds to match what Postgres stores.
    pub fn next_message_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let now = now.trunc_subsecs(6);
        let floor = self.last_activity_at.trunc_subsecs(6) + chrono::Duration::microseconds(1);
        if now > self.last_activity_at {
            now
        } else {
            floor
        }
    }

    pub fn record_message(&mut self, message_id: Uuid, sender: Uuid, at: DateTime<Utc>) {
        self.last_message_id = Some(message_id);
        self.last_activity_at = at;
        for participant in &self.participants {
            if *participant != sender {
                let counter = self.unread.entry(*participant).or_insert(0);
                *counter = counter.saturating_add(1);
            }
        }
    }

    /// Take `read` messages off the user's unread counter, saturating at 0
    pub fn decrement_unread(&mut self, user_id: Uuid, read: u32) {
        if let Some(counter) = self.unread.get_mut(&user_id) {
            *counter = counter.saturating_sub(read);
        }
    }

    /// Flip the mute flag for a user, returning the new state
    pub fn toggle_mute(&mut self, user_id: Uuid) -> bool {
        if self.muted_by.remove(&user_id) {
            false
        } else {
            self.muted_by.insert(user_id);
            true
        }
    }

    pub fn remove_participant(&mut self, user_id: Uuid) -> LeaveOutcome {
        self.participants.retain(|p| *p != user_id);
        self.unread.remove(&user_id);
        self.muted_by.remove(&user_id);

        let mut new_admin = None;
        if self.admin == Some(user_id) {
            self.admin = self.participants.first().copied();
            new_admin = self.admin;
        }

        let deactivated = self.participants.is_empty();
        if deactivated {
            self.active = false;
            self.admin = None;
        }

        LeaveOutcome {
            new_admin,
            deactivated,
        }
    }
}

/// Conversation as listed for one user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub participants: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_admin: Option<Uuid>,
    pub last_message: Option<MessageView>,
    pub last_activity_at: DateTime<Utc>,
    pub unread_count: u32,
    pub muted: bool,
    pub created_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn for_user(
        conversation: &Conversation,
        user_id: Uuid,
        last_message: Option<MessageView>,
    ) -> Self {
        Self {
            id: conversation.id,
            kind: conversation.kind,
            participants: conversation.participants.clone(),
            group_name: conversation.name.clone(),
            group_icon: conversation.icon.clone(),
            group_admin: conversation.admin,
            last_message,
            last_activity_at: conversation.last_activity_at,
            unread_count: conversation.unread_for(user_id),
            muted: conversation.is_muted_by(user_id),
            created_at: conversation.created_at,
        }
    }
}
