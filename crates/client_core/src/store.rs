//! Per-room chat state merged from two racing sources: paginated REST
//! history and live pushed frames. Dedup is by message id; reads always come
//! back ascending by `created_at` no matter which source saw a message first.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::domain::{ChatMessage, GroupId, UserId};
use tokio::time::Instant;

/// How long a typing indicator stays visible without a refresh.
const TYPING_TTL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct TypingEntry {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub username: String,
    pub seen_at: Instant,
}

#[derive(Default)]
struct RoomState {
    messages: Vec<ChatMessage>,
    typing: Vec<TypingEntry>,
}

pub struct ChatStore {
    typing_ttl: Duration,
    rooms: Mutex<HashMap<GroupId, RoomState>>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        Self::with_typing_ttl(TYPING_TTL)
    }

    pub fn with_typing_ttl(typing_ttl: Duration) -> Self {
        Self {
            typing_ttl,
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a live-pushed message unless its id is already present.
    /// Returns whether anything was inserted.
    pub fn add_message(&self, group_id: GroupId, message: ChatMessage) -> bool {
        let mut rooms = self.lock();
        let room = rooms.entry(group_id).or_default();
        if room.messages.iter().any(|m| m.id == message.id) {
            return false;
        }
        let at = room
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        room.messages.insert(at, message);
        true
    }

    /// Replace a room's list wholesale, typically with the newest history
    /// page.
    pub fn set_messages(&self, group_id: GroupId, messages: Vec<ChatMessage>) {
        let mut deduped: Vec<ChatMessage> = Vec::with_capacity(messages.len());
        for message in messages {
            if !deduped.iter().any(|m| m.id == message.id) {
                deduped.push(message);
            }
        }
        deduped.sort_by_key(|m| m.created_at);
        self.lock().entry(group_id).or_default().messages = deduped;
    }

    /// Merge an older history page. Ids already present are dropped.
    pub fn prepend_messages(&self, group_id: GroupId, messages: Vec<ChatMessage>) {
        let mut rooms = self.lock();
        let room = rooms.entry(group_id).or_default();
        for message in messages {
            if !room.messages.iter().any(|m| m.id == message.id) {
                room.messages.push(message);
            }
        }
        room.messages.sort_by_key(|m| m.created_at);
    }

    /// The room's messages, ascending by `created_at`.
    pub fn messages(&self, group_id: GroupId) -> Vec<ChatMessage> {
        self.lock()
            .get(&group_id)
            .map(|room| room.messages.clone())
            .unwrap_or_default()
    }

    /// `true` inserts or refreshes the user's entry; `false` removes it
    /// immediately regardless of age.
    pub fn set_typing(
        &self,
        group_id: GroupId,
        user_id: UserId,
        username: impl Into<String>,
        is_typing: bool,
    ) {
        let mut rooms = self.lock();
        let room = rooms.entry(group_id).or_default();
        room.typing.retain(|t| t.user_id != user_id);
        if is_typing {
            room.typing.push(TypingEntry {
                group_id,
                user_id,
                username: username.into(),
                seen_at: Instant::now(),
            });
        }
    }

    /// Entries younger than the TTL. Stale entries are filtered here at read
    /// time; there is no sweeper timer.
    pub fn typing_users(&self, group_id: GroupId) -> Vec<TypingEntry> {
        let now = Instant::now();
        self.lock()
            .get(&group_id)
            .map(|room| {
                room.typing
                    .iter()
                    .filter(|t| now.duration_since(t.seen_at) < self.typing_ttl)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop all messages and typing entries for one room.
    pub fn clear_room(&self, group_id: GroupId) {
        self.lock().remove(&group_id);
    }

    /// Drop everything, e.g. on logout.
    pub fn clear_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GroupId, RoomState>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
