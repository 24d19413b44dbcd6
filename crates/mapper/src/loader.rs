//! Initial trie production.
//!
//! The indexer needs a starting trie from one of two sources: the spork's
//! root checkpoint file when the index is empty, or a replay of the
//! persisted registers when resuming. The replay can be seeded with the
//! checkpoint to skip the history the checkpoint already covers.

use std::path::PathBuf;
use std::sync::Arc;

use amber_index::{IndexError, Reader};
use amber_ledger::{Store, Trie};
use amber_storage::KeyValue;
use amber_types::RegisterUpdate;

/// Errors producing the initial trie.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed checkpoint: {0}")]
    Malformed(String),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("cannot replay: index has no last height")]
    EmptyIndex,
}

/// A freshly produced trie plus the registers that were materialized into
/// it from outside the index (empty when everything came from the index).
pub struct LoadedTrie {
    pub trie: Trie,
    pub registers: Vec<RegisterUpdate>,
}

/// Produces the initial trie for the indexer.
pub trait TrieLoader: Send + Sync {
    fn load(&self) -> Result<LoadedTrie, LoadError>;
}

impl TrieLoader for Box<dyn TrieLoader> {
    fn load(&self) -> Result<LoadedTrie, LoadError> {
        (**self).load()
    }
}

/// Loads a trie from a root checkpoint file.
pub struct CheckpointLoader {
    path: PathBuf,
    store: Arc<dyn Store>,
}

impl CheckpointLoader {
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn Store>) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }
}

impl TrieLoader for CheckpointLoader {
    fn load(&self) -> Result<LoadedTrie, LoadError> {
        let registers = crate::checkpoint::read(&self.path)?;
        tracing::info!(
            path = %self.path.display(),
            registers = registers.len(),
            "loading trie from root checkpoint"
        );
        let mut trie = Trie::new(Arc::clone(&self.store));
        for register in &registers {
            trie.insert(register.path, &register.payload);
        }
        Ok(LoadedTrie { trie, registers })
    }
}

/// Replays a trie from the persisted index at its last height.
///
/// With an initializer, the replay starts from the checkpoint trie and
/// skips register writes at or below `exclude` (they are part of the
/// checkpoint's history).
pub struct IndexLoader<S> {
    reader: Reader<S>,
    store: Arc<dyn Store>,
    initializer: Option<CheckpointLoader>,
    exclude: Option<u64>,
}

impl<S: KeyValue> IndexLoader<S> {
    pub fn new(reader: Reader<S>, store: Arc<dyn Store>) -> Self {
        Self {
            reader,
            store,
            initializer: None,
            exclude: None,
        }
    }

    /// Seed the replay with a checkpoint instead of starting empty.
    pub fn with_initializer(mut self, initializer: CheckpointLoader) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Skip register writes at or below this height during replay.
    pub fn with_exclude_at_or_below(mut self, height: u64) -> Self {
        self.exclude = Some(height);
        self
    }
}

impl<S: KeyValue> TrieLoader for IndexLoader<S> {
    fn load(&self) -> Result<LoadedTrie, LoadError> {
        let mut trie = match &self.initializer {
            Some(initializer) => initializer.load()?.trie,
            None => Trie::new(Arc::clone(&self.store)),
        };

        let height = self.reader.last()?.ok_or(LoadError::EmptyIndex)?;
        let registers = self.reader.registers_at(height, self.exclude)?;
        tracing::info!(
            height,
            registers = registers.len(),
            seeded = self.initializer.is_some(),
            "replaying trie from index"
        );
        for register in &registers {
            trie.insert(register.path, &register.payload);
        }

        // The mapped registers are already indexed; only the trie leaves
        // this loader.
        Ok(LoadedTrie {
            trie,
            registers: Vec::new(),
        })
    }
}
