//! Typed listener registration.
//!
//! A [`ListenerList`] holds listeners behind `Arc`s and hands out
//! [`ListenerHandle`]s for removal. Delivery is synchronous on the notifying
//! thread, in registration order, and always happens on a snapshot taken
//! outside the list's lock so a listener may subscribe or unsubscribe while
//! being notified.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Handle returned by [`ListenerList::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

/// Registration-ordered list of listeners of type `L`.
pub struct ListenerList<L: ?Sized> {
    listeners: Mutex<Vec<(ListenerHandle, Arc<L>)>>,
    next_id: AtomicU64,
}

/// Closure listeners receiving events of type `E`.
pub type EventListeners<E> = ListenerList<dyn Fn(&E) + Send + Sync>;

impl<L: ?Sized> Default for ListenerList<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerList<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("len", &self.len())
            .finish()
    }
}

impl<L: ?Sized> ListenerList<L> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a listener and returns the handle that removes it.
    pub fn subscribe(&self, listener: Arc<L>) -> ListenerHandle {
        let handle = ListenerHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((handle, listener));
        handle
    }

    /// Removes the listener registered under `handle`.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(h, _)| *h != handle);
        listeners.len() != before
    }

    /// Removes every registration of the given listener instance.
    pub fn unsubscribe_listener(&self, listener: &Arc<L>) -> bool {
        let target = Arc::as_ptr(listener) as *const ();
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(_, l)| Arc::as_ptr(l) as *const () != target);
        listeners.len() != before
    }

    /// Listeners in registration order.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}

impl<E> ListenerList<dyn Fn(&E) + Send + Sync> {
    /// Registers a closure listener.
    pub fn subscribe_fn<F>(&self, f: F) -> ListenerHandle
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(f))
    }

    /// Delivers `event` to every listener.
    pub fn notify(&self, event: &E) {
        for listener in self.snapshot() {
            listener(event);
        }
    }
}
