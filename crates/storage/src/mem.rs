//! In-memory backend for tests and tooling.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::{KeyValue, Op, StoreError};

/// A `BTreeMap`-backed store. No persistence, same ordering semantics as
/// the RocksDB backend.
#[derive(Default)]
pub struct MemStore {
    state: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValue for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .state
            .read()
            .expect("store lock poisoned")
            .get(key)
            .cloned())
    }

    fn write(&self, ops: Vec<Op>) -> Result<(), StoreError> {
        let mut state = self.state.write().expect("store lock poisoned");
        for op in ops {
            match op {
                Op::Set { key, value } => {
                    state.insert(key, value);
                }
                Op::Remove { key } => {
                    state.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn get_le(
        &self,
        prefix: &[u8],
        upper: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut bound = prefix.to_vec();
        bound.extend_from_slice(upper);

        let state = self.state.read().expect("store lock poisoned");
        let found = state
            .range(prefix.to_vec()..=bound)
            .next_back()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()));
        Ok(found)
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + '_>, StoreError>
    {
        let state = self.state.read().expect("store lock poisoned");
        let entries: Vec<_> = state
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| Ok((key.clone(), value.clone())))
            .collect();
        Ok(Box::new(entries.into_iter()))
    }
}
