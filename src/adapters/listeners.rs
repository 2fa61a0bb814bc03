use crate::domain::ports::ChangeCallback;
use crate::utils::subscription::Subscription;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Registry of change callbacks shared by the store adapters.
#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<u64, ChangeCallback>>,
}

impl Listeners {
    pub(crate) fn add(self: &Arc<Self>, callback: ChangeCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut callbacks) = self.callbacks.lock() {
            callbacks.insert(id, callback);
        }

        let listeners = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                if let Ok(mut callbacks) = listeners.callbacks.lock() {
                    callbacks.remove(&id);
                }
            }
        })
    }

    pub(crate) fn notify(&self) {
        // Callbacks run outside the lock so they may subscribe or write.
        let callbacks: Vec<ChangeCallback> = match self.callbacks.lock() {
            Ok(callbacks) => callbacks.values().cloned().collect(),
            Err(_) => return,
        };
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.callbacks.lock().map(|c| c.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}
