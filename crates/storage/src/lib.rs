//! Embedded key-value storage behind a fixed trait.
//!
//! The index and protocol databases are plain byte-keyed stores; everything
//! above them (keyspaces, codecs, batching policy) lives in the consuming
//! crates. Two backends are provided: [`RocksStore`] for the daemon and
//! [`MemStore`] for tests.

mod mem;
mod rocks;

pub use mem::MemStore;
pub use rocks::RocksStore;

/// A single mutation applied as part of an atomic batch.
#[derive(Debug, Clone)]
pub enum Op {
    Set { key: Vec<u8>, value: Vec<u8> },
    Remove { key: Vec<u8> },
}

impl Op {
    pub fn set(key: Vec<u8>, value: Vec<u8>) -> Self {
        Op::Set { key, value }
    }

    pub fn remove(key: Vec<u8>) -> Self {
        Op::Remove { key }
    }
}

/// Errors surfaced by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("could not open database: {0}")]
    Open(String),

    #[error("database error: {0}")]
    Database(String),
}

/// The fixed interface to the embedded key-value store.
///
/// Implementations must apply `write` batches atomically and expose
/// lexicographic ordering for the two scan primitives.
pub trait KeyValue: Send + Sync + 'static {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Apply a batch of operations atomically.
    fn write(&self, ops: Vec<Op>) -> Result<(), StoreError>;

    /// The greatest key of the form `prefix ++ suffix` with
    /// `suffix <= upper`, together with its value.
    fn get_le(&self, prefix: &[u8], upper: &[u8])
        -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// All entries whose key starts with `prefix`, ascending.
    fn iter_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + '_>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise_store<S: KeyValue>(store: &S) {
        store
            .write(vec![
                Op::set(b"a:1".to_vec(), vec![1]),
                Op::set(b"a:2".to_vec(), vec![2]),
                Op::set(b"a:4".to_vec(), vec![4]),
                Op::set(b"b:1".to_vec(), vec![9]),
            ])
            .unwrap();

        assert_eq!(store.get(b"a:2").unwrap(), Some(vec![2]));
        assert_eq!(store.get(b"a:3").unwrap(), None);

        // get_le picks the greatest suffix at or below the bound.
        let (key, value) = store.get_le(b"a:", b"3").unwrap().unwrap();
        assert_eq!(key, b"a:2".to_vec());
        assert_eq!(value, vec![2]);
        let (key, _) = store.get_le(b"a:", b"9").unwrap().unwrap();
        assert_eq!(key, b"a:4".to_vec());
        assert_eq!(store.get_le(b"a:", b"0").unwrap(), None);
        assert_eq!(store.get_le(b"c:", b"9").unwrap(), None);

        // Prefix scans stay inside the prefix and come back ordered.
        let entries: Vec<_> = store
            .iter_prefix(b"a:")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            entries.iter().map(|(k, _)| k.clone()).collect::<Vec<_>>(),
            vec![b"a:1".to_vec(), b"a:2".to_vec(), b"a:4".to_vec()],
        );

        // Removes are honored within a batch.
        store.write(vec![Op::remove(b"a:1".to_vec())]).unwrap();
        assert_eq!(store.get(b"a:1").unwrap(), None);
    }

    #[test]
    fn mem_store_contract() {
        let store = MemStore::new();
        exercise_store(&store);
    }

    #[test]
    fn rocks_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        exercise_store(&store);
    }

    #[test]
    fn rocks_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .write(vec![Op::set(b"k".to_vec(), b"v".to_vec())])
                .unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
