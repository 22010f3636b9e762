use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::domain::GroupId;
use tracing::debug;

use crate::socket::RealtimeSocket;

/// Client-side record of which rooms this session has declared itself in.
/// Purely optimistic: the flag flips when the send is issued, not on any
/// server acknowledgment.
pub struct PresenceTracker {
    socket: Arc<RealtimeSocket>,
    joined: Mutex<HashSet<GroupId>>,
}

impl PresenceTracker {
    pub fn new(socket: Arc<RealtimeSocket>) -> Self {
        Self {
            socket,
            joined: Mutex::new(HashSet::new()),
        }
    }

    /// Send `join_group` once per room view. No-op when not connected or
    /// already joined.
    pub async fn join(&self, group_id: GroupId) -> bool {
        if !self.socket.is_connected() {
            debug!(group_id = group_id.0, "skipping join: not connected");
            return false;
        }
        if !self.table().insert(group_id) {
            return false;
        }
        self.socket.join_group(group_id).await
    }

    /// Send `leave_group` if this session had joined. No-op otherwise.
    pub async fn leave(&self, group_id: GroupId) -> bool {
        if !self.table().remove(&group_id) {
            return false;
        }
        self.socket.leave_group(group_id).await
    }

    pub fn is_joined(&self, group_id: GroupId) -> bool {
        self.table().contains(&group_id)
    }

    /// Forget every joined flag, e.g. after logout or a dropped connection.
    pub fn reset(&self) {
        self.table().clear();
    }

    fn table(&self) -> MutexGuard<'_, HashSet<GroupId>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
