//! Content-addressed payload storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use amber_types::{Payload, PayloadKey};

/// Storage for register payloads behind their content key.
///
/// Append-only from the trie's perspective: the trie never deletes, and a
/// key always resolves to the same bytes.
pub trait Store: Send + Sync {
    /// Persist a payload and return its content key.
    fn put(&self, payload: &Payload) -> PayloadKey;

    /// Fetch a payload by content key.
    fn get(&self, key: &PayloadKey) -> Option<Payload>;
}

/// In-memory payload store shared by every trie in a forest.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<HashMap<PayloadKey, Payload>>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("payload store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Store for MemStore {
    fn put(&self, payload: &Payload) -> PayloadKey {
        let key = payload.key();
        self.inner
            .write()
            .expect("payload store lock poisoned")
            .entry(key)
            .or_insert_with(|| payload.clone());
        key
    }

    fn get(&self, key: &PayloadKey) -> Option<Payload> {
        self.inner
            .read()
            .expect("payload store lock poisoned")
            .get(key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = MemStore::new();
        let payload = Payload::new(0, vec![1, 2, 3]);
        let key = store.put(&payload);
        assert_eq!(store.get(&key), Some(payload));
    }

    #[test]
    fn missing_key_is_none() {
        let store = MemStore::new();
        assert_eq!(store.get(&[0u8; 32]), None);
    }

    #[test]
    fn identical_payloads_share_one_entry() {
        let store = MemStore::new();
        let a = store.put(&Payload::new(0, vec![9]));
        let b = store.put(&Payload::new(0, vec![9]));
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }
}
