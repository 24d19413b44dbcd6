//! RocksDB backend.
//!
//! All operations are synchronous blocking I/O; callers on async runtimes
//! keep individual operations small (point reads, bounded batches).

use std::path::Path;

use rocksdb::{BlockBasedOptions, DBCompressionType, Direction, IteratorMode, Options, WriteBatch, DB};

use crate::{KeyValue, Op, StoreError};

/// Production store over a RocksDB database.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(DBCompressionType::Lz4);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, path).map_err(|e| StoreError::Open(e.to_string()))?;
        Ok(Self { db })
    }
}

impl KeyValue for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.db
            .get(key)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn write(&self, ops: Vec<Op>) -> Result<(), StoreError> {
        let mut batch = WriteBatch::default();
        for op in ops {
            match op {
                Op::Set { key, value } => batch.put(key, value),
                Op::Remove { key } => batch.delete(key),
            }
        }
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_le(
        &self,
        prefix: &[u8],
        upper: &[u8],
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut bound = prefix.to_vec();
        bound.extend_from_slice(upper);

        let mut iter = self.db.raw_iterator();
        iter.seek_for_prev(&bound);
        if !iter.valid() {
            return iter
                .status()
                .map(|_| None)
                .map_err(|e| StoreError::Database(e.to_string()));
        }
        match (iter.key(), iter.value()) {
            (Some(key), Some(value)) if key.starts_with(prefix) => {
                Ok(Some((key.to_vec(), value.to_vec())))
            }
            _ => Ok(None),
        }
    }

    fn iter_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + '_>, StoreError>
    {
        let prefix = prefix.to_vec();
        let start = prefix.clone();
        let iter = self
            .db
            .iterator(IteratorMode::From(&start, Direction::Forward))
            .map(|item| {
                item.map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .map_err(|e| StoreError::Database(e.to_string()))
            })
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&prefix),
                Err(_) => true,
            });
        Ok(Box::new(iter))
    }
}
