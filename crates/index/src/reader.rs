//! Read access to the index database.

use std::sync::Arc;

use amber_storage::KeyValue;
use amber_types::{BlockHeader, BlockId, Commitment, Path, Payload, PayloadKey, RegisterUpdate};

use crate::{keys, IndexError};

/// Point and scan queries over a (possibly still growing) index.
///
/// Cheap to clone; every method is a straight store read.
pub struct Reader<S> {
    store: Arc<S>,
}

impl<S> Clone for Reader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: KeyValue> Reader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// First indexed height, `None` on an empty index.
    pub fn first(&self) -> Result<Option<u64>, IndexError> {
        self.height_scalar(keys::FIRST)
    }

    /// Last contiguously indexed height.
    pub fn last(&self) -> Result<Option<u64>, IndexError> {
        self.height_scalar(keys::LAST)
    }

    pub fn header(&self, height: u64) -> Result<Option<BlockHeader>, IndexError> {
        match self.store.get(&keys::header(height))? {
            Some(bytes) => Ok(Some(borsh::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn commit(&self, height: u64) -> Result<Option<Commitment>, IndexError> {
        match self.store.get(&keys::commit(height))? {
            Some(bytes) => Commitment::from_slice(&bytes)
                .map(Some)
                .map_err(|_| malformed(&keys::commit(height))),
            None => Ok(None),
        }
    }

    pub fn height_for_commit(
        &self,
        commitment: &Commitment,
    ) -> Result<Option<u64>, IndexError> {
        self.height_scalar(&keys::height_for_commit(commitment))
    }

    pub fn block_id(&self, height: u64) -> Result<Option<BlockId>, IndexError> {
        match self.store.get(&keys::block(height))? {
            Some(bytes) => BlockId::from_slice(&bytes)
                .map(Some)
                .map_err(|_| malformed(&keys::block(height))),
            None => Ok(None),
        }
    }

    pub fn height_for_block(&self, block_id: &BlockId) -> Result<Option<u64>, IndexError> {
        self.height_scalar(&keys::height_for_block(block_id))
    }

    /// The payload at `path` as of `height`: the most recent write at or
    /// below that height.
    pub fn payload(&self, height: u64, path: &Path) -> Result<Option<Payload>, IndexError> {
        let prefix = keys::register_prefix(path);
        let found = self.store.get_le(&prefix, &height.to_be_bytes())?;
        match found {
            Some((key, value)) => {
                let payload_key: PayloadKey = value
                    .as_slice()
                    .try_into()
                    .map_err(|_| malformed(&key))?;
                self.payload_bytes(&payload_key)
            }
            None => Ok(None),
        }
    }

    /// Payloads for several paths as of one height, position-aligned.
    pub fn values(
        &self,
        height: u64,
        paths: &[Path],
    ) -> Result<Vec<Option<Payload>>, IndexError> {
        paths.iter().map(|path| self.payload(height, path)).collect()
    }

    /// Every register's latest value at or below `height`, paths ascending.
    ///
    /// Heights at or below `exclude` are skipped, for callers that already
    /// hold that prefix of history (checkpoint-seeded replays).
    pub fn registers_at(
        &self,
        height: u64,
        exclude: Option<u64>,
    ) -> Result<Vec<RegisterUpdate>, IndexError> {
        let floor = exclude.unwrap_or(0);
        let mut registers = Vec::new();
        let mut current: Option<(Path, PayloadKey, u64)> = None;

        for item in self.store.iter_prefix(keys::REGISTER)? {
            let (key, value) = item?;
            let Some((path, entry_height)) = keys::parse_register(&key) else {
                return Err(malformed(&key));
            };
            if entry_height > height || (exclude.is_some() && entry_height <= floor) {
                continue;
            }
            let payload_key: PayloadKey = value
                .as_slice()
                .try_into()
                .map_err(|_| malformed(&key))?;

            match &mut current {
                Some((current_path, current_key, current_height)) if *current_path == path => {
                    // Same register, later (or equal) height wins; entries
                    // arrive height-ascending within a path.
                    if entry_height >= *current_height {
                        *current_key = payload_key;
                        *current_height = entry_height;
                    }
                }
                _ => {
                    if let Some((path, key, _)) = current.take() {
                        registers.push(self.resolve(path, &key)?);
                    }
                    current = Some((path, payload_key, entry_height));
                }
            }
        }
        if let Some((path, key, _)) = current.take() {
            registers.push(self.resolve(path, &key)?);
        }
        Ok(registers)
    }

    fn resolve(&self, path: Path, key: &PayloadKey) -> Result<RegisterUpdate, IndexError> {
        let payload = self
            .payload_bytes(key)?
            .ok_or_else(|| IndexError::Malformed {
                key: format!("pd:{}", hex_of(key)),
            })?;
        Ok(RegisterUpdate::new(path, payload))
    }

    fn payload_bytes(&self, key: &PayloadKey) -> Result<Option<Payload>, IndexError> {
        match self.store.get(&keys::payload(key))? {
            Some(bytes) => Ok(Some(borsh::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn height_scalar(&self, key: &[u8]) -> Result<Option<u64>, IndexError> {
        match self.store.get(key)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| malformed(key))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }
}

fn malformed(key: &[u8]) -> IndexError {
    IndexError::Malformed {
        key: String::from_utf8_lossy(key).into_owned(),
    }
}

fn hex_of(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
