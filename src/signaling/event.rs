//! Event listener sets
//!
//! Every event source exposes one [`EventSlot`] per event name. A slot has
//! two independent dispatch paths, both invoked on each event:
//! - a single replaceable handler (`set_handler`), the `onX` property style
//! - any number of subscribed listeners (`add_listener` / `remove_listener`)

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked for every dispatched event
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifies a subscribed listener so it can be removed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Single handler slot plus subscriber list for one event type
pub struct EventSlot<E> {
    handler: Mutex<Option<Handler<E>>>,
    listeners: Mutex<Vec<(ListenerId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> EventSlot<E> {
    pub fn new() -> Self {
        Self {
            handler: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the single handler slot
    pub fn set_handler(&self, handler: impl Fn(&E) + Send + Sync + 'static) {
        *self.handler.lock() = Some(Arc::new(handler));
    }

    /// Clear the single handler slot
    pub fn clear_handler(&self) {
        *self.handler.lock() = None;
    }

    /// Subscribe a listener
    pub fn add_listener(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Unsubscribe a listener, returns false if it was not subscribed
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Invoke the handler slot, then every listener in subscription order.
    ///
    /// Callbacks are snapshotted first so they may subscribe, unsubscribe or
    /// dispatch again without deadlocking.
    pub fn dispatch(&self, event: &E) {
        let handler = self.handler.lock().clone();
        let listeners: Vec<Handler<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        if let Some(handler) = handler {
            handler(event);
        }
        for listener in listeners {
            listener(event);
        }
    }
}

impl<E> Default for EventSlot<E> {
    fn default() -> Self {
        Self::new()
    }
}
