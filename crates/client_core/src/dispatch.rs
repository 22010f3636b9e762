use std::{
    collections::HashMap,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use shared::protocol::{FrameKind, ServerFrame};
use tracing::error;

type Handler = Arc<dyn Fn(&ServerFrame) + Send + Sync>;
type HandlerTable = HashMap<FrameKind, Vec<(u64, Handler)>>;

/// Typed event bus for decoded frames: frame kind to subscriber callbacks,
/// invoked in registration order.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: Mutex<HandlerTable>,
}

impl HandlerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscribe(
        self: &Arc<Self>,
        kind: FrameKind,
        handler: impl Fn(&ServerFrame) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.table()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(self),
            kind,
            id,
        }
    }

    pub fn unsubscribe(&self, kind: FrameKind, id: u64) {
        if let Some(list) = self.table().get_mut(&kind) {
            list.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Invoke every handler registered for the frame's kind. A panicking
    /// handler is logged and skipped; the remaining handlers still run.
    pub fn dispatch(&self, frame: &ServerFrame) {
        let handlers: Vec<Handler> = match self.table().get(&frame.kind()) {
            Some(list) => list.iter().map(|(_, handler)| Arc::clone(handler)).collect(),
            None => return,
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
                error!(kind = ?frame.kind(), "frame handler panicked");
            }
        }
    }

    fn table(&self) -> MutexGuard<'_, HandlerTable> {
        // The lock is never held while a handler runs, so poisoning cannot
        // leave the table half-updated.
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Active handler registration. Dropping it unsubscribes.
pub struct Subscription {
    registry: Weak<HandlerRegistry>,
    kind: FrameKind,
    id: u64,
}

impl Subscription {
    /// Explicit teardown; equivalent to dropping the token.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.kind, self.id);
        }
    }
}
