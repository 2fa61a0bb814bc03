use super::listeners::Listeners;
use crate::domain::ports::{ChangeCallback, KeyValueStore};
use crate::utils::error::{Result, TailorError};
use crate::utils::subscription::Subscription;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-process key-value store. Clones share the same record and listeners,
/// standing in for several contexts attached to one synced storage area.
#[derive(Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, serde_json::Value>>>,
    listeners: Arc<Listeners>,
    reads: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a value without notifying listeners.
    pub fn insert(&self, key: &str, value: serde_json::Value) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value);
        }
    }

    /// Makes subsequent reads fail until switched off again.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of `get` calls served or rejected so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(TailorError::store_read("memory store is unavailable"));
        }

        let values = self
            .values
            .lock()
            .map_err(|_| TailorError::store_read("memory store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()> {
        {
            let mut values = self
                .values
                .lock()
                .map_err(|_| TailorError::store_write("memory store lock poisoned"))?;
            values.insert(key.to_string(), value);
        }
        self.listeners.notify();
        Ok(())
    }

    fn subscribe(&self, callback: ChangeCallback) -> Subscription {
        self.listeners.add(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_notifies_all_handles() {
        let store = MemoryStore::new();
        let other_context = store.clone();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let subscription = store.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        other_context
            .set("key", serde_json::json!(1))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("key").await.unwrap(), Some(serde_json::json!(1)));

        subscription.cancel();
        assert_eq!(store.listener_count(), 0);
        other_context
            .set("key", serde_json::json!(2))
            .await
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_reads() {
        let store = MemoryStore::new();
        store.set_fail_reads(true);
        assert!(store.get("key").await.is_err());
        assert_eq!(store.reads(), 1);

        store.set_fail_reads(false);
        assert_eq!(store.get("key").await.unwrap(), None);
    }
}
