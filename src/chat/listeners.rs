use log::error;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::api::events::PushEvent;

pub type Listener = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Handle returned by `add`, used to remove that exact listener later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener. A listener that panics is logged and
    /// skipped; the rest still get the event.
    pub fn dispatch(&self, event: &PushEvent) -> usize {
        // snapshot so listeners may add/remove while being called
        let snapshot: Vec<(ListenerId, Listener)> = self.lock().clone();
        let mut delivered = 0;
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(_) => error!("listener {:?} panicked on {} event", id, event.event_type()),
            }
        }
        delivered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        // a poisoned list is still a valid list
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ConversationKey;
    use std::sync::atomic::AtomicUsize;

    fn hello() -> PushEvent {
        PushEvent::chat(2, ConversationKey::Contact(1), "hi")
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.add(|_| panic!("listener failure"));
        let counter = hits.clone();
        registry.add(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.dispatch(&hello()), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removal_is_by_identity() {
        let registry = ListenerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let a = hits.clone();
        let b = hits.clone();
        let first = registry.add(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });
        registry.add(move |_| {
            b.fetch_add(10, Ordering::SeqCst);
        });

        assert!(registry.remove(first));
        assert!(!registry.remove(first));
        registry.dispatch(&hello());
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert_eq!(registry.len(), 1);
    }
}
