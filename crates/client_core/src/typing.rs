use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::domain::GroupId;
use tokio::task::JoinHandle;

use crate::socket::RealtimeSocket;

/// Quiet period after the last keystroke before `typing: false` goes out.
const QUIET_PERIOD: Duration = Duration::from_millis(2000);

struct DebounceState {
    typing: bool,
    timer: Option<JoinHandle<()>>,
}

/// Collapses raw keystroke notifications into a single `typing: true` edge
/// followed by exactly one `typing: false` once the user goes quiet.
pub struct TypingDebouncer {
    socket: Arc<RealtimeSocket>,
    group_id: GroupId,
    quiet_period: Duration,
    state: Arc<Mutex<DebounceState>>,
}

impl TypingDebouncer {
    pub fn new(socket: Arc<RealtimeSocket>, group_id: GroupId) -> Self {
        Self::with_quiet_period(socket, group_id, QUIET_PERIOD)
    }

    pub fn with_quiet_period(
        socket: Arc<RealtimeSocket>,
        group_id: GroupId,
        quiet_period: Duration,
    ) -> Self {
        Self {
            socket,
            group_id,
            quiet_period,
            state: Arc::new(Mutex::new(DebounceState {
                typing: false,
                timer: None,
            })),
        }
    }

    /// Call on every keystroke. Sends `typing: true` only on the rising edge
    /// and re-arms the quiet-period timer either way.
    pub async fn start_typing(&self) {
        if !self.socket.is_connected() {
            return;
        }
        let rising_edge = {
            let mut state = self.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            let rising_edge = !state.typing;
            state.typing = true;
            rising_edge
        };
        if rising_edge {
            self.socket.send_typing(self.group_id, true).await;
        }

        let socket = Arc::clone(&self.socket);
        let shared = Arc::clone(&self.state);
        let group_id = self.group_id;
        let quiet_period = self.quiet_period;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            let falling_edge = {
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                let falling_edge = state.typing;
                state.typing = false;
                state.timer = None;
                falling_edge
            };
            if falling_edge {
                socket.send_typing(group_id, false).await;
            }
        });
        self.lock().timer = Some(timer);
    }

    /// Cancel the pending timer and, if currently typing, send
    /// `typing: false` immediately.
    pub async fn stop_typing(&self) {
        let falling_edge = {
            let mut state = self.lock();
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            let falling_edge = state.typing;
            state.typing = false;
            falling_edge
        };
        if falling_edge {
            self.socket.send_typing(self.group_id, false).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, DebounceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        if let Some(timer) = self.lock().timer.take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/typing_tests.rs"]
mod tests;
