use std::sync::Arc;

use anyhow::Result;
use shared::{
    domain::{ChatMessage, GroupId, UserId},
    protocol::{FrameKind, ServerFrame},
};

use crate::{
    dispatch::Subscription,
    error::SocketError,
    presence::PresenceTracker,
    rest::{ChatApi, HistoryPage},
    socket::{ConnectionState, RealtimeSocket},
    store::{ChatStore, TypingEntry},
    typing::TypingDebouncer,
};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Everything needed while one screen is showing one room: joins on open,
/// routes this room's pushed frames into the store, and tears its own state
/// down on close without touching the shared connection.
pub struct RoomSession {
    socket: Arc<RealtimeSocket>,
    store: Arc<ChatStore>,
    presence: Arc<PresenceTracker>,
    api: Arc<dyn ChatApi>,
    typing: TypingDebouncer,
    group_id: GroupId,
    _subscriptions: Vec<Subscription>,
}

impl RoomSession {
    /// Mount a room view: connect if needed, declare presence, and start
    /// routing `chat_message` and `typing` frames for this group. Typing
    /// frames from `current_user` are ignored so the local user never sees
    /// their own indicator.
    pub async fn open(
        socket: Arc<RealtimeSocket>,
        store: Arc<ChatStore>,
        presence: Arc<PresenceTracker>,
        api: Arc<dyn ChatApi>,
        group_id: GroupId,
        current_user: UserId,
    ) -> Result<Self, SocketError> {
        if socket.connection_state() == ConnectionState::Disconnected {
            socket.connect().await?;
        }
        presence.join(group_id).await;

        let message_sub = {
            let store = Arc::clone(&store);
            socket.on(FrameKind::ChatMessage, move |frame| {
                if let ServerFrame::ChatMessage(push) = frame {
                    if push.group_id != group_id {
                        return;
                    }
                    store.add_message(group_id, push.clone().into_message());
                }
            })
        };
        let typing_sub = {
            let store = Arc::clone(&store);
            socket.on(FrameKind::Typing, move |frame| {
                if let ServerFrame::Typing(push) = frame {
                    if push.group_id != group_id || push.user_id == current_user {
                        return;
                    }
                    store.set_typing(group_id, push.user_id, push.username.clone(), push.is_typing);
                }
            })
        };

        let typing = TypingDebouncer::new(Arc::clone(&socket), group_id);
        Ok(Self {
            socket,
            store,
            presence,
            api,
            typing,
            group_id,
            _subscriptions: vec![message_sub, typing_sub],
        })
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Realtime send. The store is not updated here; the server echoes the
    /// message back over the live channel.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        metadata: Option<String>,
    ) -> bool {
        self.socket.send_chat(self.group_id, content, metadata).await
    }

    /// REST fallback send; the server-confirmed message goes straight into
    /// the store.
    pub async fn send_message_rest(&self, content: &str) -> Result<ChatMessage> {
        let message = self.api.send_message(self.group_id, content).await?;
        self.store.add_message(self.group_id, message.clone());
        Ok(message)
    }

    /// Seed the room with the newest history page.
    pub async fn load_initial_history(&self, limit: u32) -> Result<HistoryPage> {
        let page = self.api.fetch_history(self.group_id, limit, 0).await?;
        self.store.set_messages(self.group_id, page.messages.clone());
        Ok(page)
    }

    /// Page older history in behind what is already loaded. Returns how many
    /// messages the page carried so callers can stop on a short page.
    pub async fn load_older(&self, limit: u32, offset: u32) -> Result<usize> {
        let page = self.api.fetch_history(self.group_id, limit, offset).await?;
        let fetched = page.messages.len();
        self.store.prepend_messages(self.group_id, page.messages);
        Ok(fetched)
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.store.messages(self.group_id)
    }

    pub fn typing_users(&self) -> Vec<TypingEntry> {
        self.store.typing_users(self.group_id)
    }

    pub async fn start_typing(&self) {
        self.typing.start_typing().await;
    }

    pub async fn stop_typing(&self) {
        self.typing.stop_typing().await;
    }

    /// Unmount: leave the room and drop this room's stored state. The shared
    /// connection stays up for other rooms; subscriptions and the typing
    /// timer unwind when `self` drops.
    pub async fn close(self) {
        self.presence.leave(self.group_id).await;
        self.store.clear_room(self.group_id);
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
