//! State machine transitions.

use amber_index::{Reader, Writer};
use amber_ledger::{Forest, Trie};
use amber_storage::KeyValue;
use amber_tracker::{ChainFeed, RecordFeed};
use amber_types::{BlockHeader, Commitment, RegisterUpdate};

use crate::loader::TrieLoader;
use crate::MapperError;

/// The states of the indexer FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Decide between bootstrapping and resuming.
    Initialize,
    /// Build the first mapping from the root checkpoint.
    Bootstrap,
    /// Rebuild the candidate trie from the persisted index.
    Resume,
    /// Await and persist the next finalized header.
    Index,
    /// Stage the working trie for the next block.
    Update,
    /// Await the block's execution record.
    Collect,
    /// Apply updates, verify the commitment, persist the mapping.
    Map,
    /// Advance the indexed height and prune.
    Forward,
    /// Terminal.
    Stopped,
}

/// Mutable state threaded through the transitions.
pub struct State {
    pub status: Status,
    /// Greatest contiguously indexed height.
    pub height: u64,
    /// Commitment at `height`; the parent commitment for the next block.
    pub commit: Commitment,
    pub forest: Forest,
    // Per-block scratch, valid from Index through Forward.
    header: Option<BlockHeader>,
    working: Option<Trie>,
    updates: Vec<RegisterUpdate>,
}

impl State {
    pub fn new(forest: Forest) -> Self {
        Self {
            status: Status::Initialize,
            height: 0,
            commit: Commitment::default(),
            forest,
            header: None,
            working: None,
            updates: Vec::new(),
        }
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new(Forest::new())
    }
}

/// Mapper configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Skip register-level indexing: headers and commitments only, no
    /// trie maintenance and no payload mappings.
    pub skip_registers: bool,
}

/// The transition implementations, parametrized over the collaborator
/// seams so tests can drive them with in-memory fakes.
pub struct Transitions<S, C, E, L> {
    reader: Reader<S>,
    writer: Writer<S>,
    chain: C,
    records: E,
    loader: L,
    config: Config,
}

impl<S, C, E, L> Transitions<S, C, E, L>
where
    S: KeyValue,
    C: ChainFeed,
    E: RecordFeed,
    L: TrieLoader,
{
    pub fn new(
        reader: Reader<S>,
        writer: Writer<S>,
        chain: C,
        records: E,
        loader: L,
        config: Config,
    ) -> Self {
        Self {
            reader,
            writer,
            chain,
            records,
            loader,
            config,
        }
    }

    pub fn writer(&self) -> &Writer<S> {
        &self.writer
    }

    /// `Initialize`: an empty index bootstraps, anything else resumes.
    pub fn initialize(&self, state: &mut State) -> Result<(), MapperError> {
        let empty = self.reader.first()?.is_none();
        state.status = if empty {
            Status::Bootstrap
        } else {
            Status::Resume
        };
        tracing::info!(bootstrap = empty, "initialized indexer");
        Ok(())
    }

    /// `Bootstrap`: materialize the checkpoint as the spork root mapping.
    pub fn bootstrap(&self, state: &mut State) -> Result<(), MapperError> {
        let height = self.chain.root_height()?;
        let loaded = self.loader.load()?;
        let mut trie = loaded.trie;
        let root = trie.root_hash();

        self.writer.first(height)?;
        if !self.config.skip_registers {
            self.writer.payloads(height, &loaded.registers)?;
        }
        self.writer.commit(height, &root)?;
        self.writer.last(height)?;

        if !self.config.skip_registers {
            state.forest.save(trie, root, root);
        }
        state.height = height;
        state.commit = root;
        state.status = Status::Index;
        tracing::info!(height, commit = %root, registers = loaded.registers.len(), "bootstrapped index from checkpoint");
        Ok(())
    }

    /// `Resume`: restore the candidate trie for the last indexed height.
    pub fn resume(&self, state: &mut State) -> Result<(), MapperError> {
        let height = self.reader.last()?.ok_or(MapperError::CorruptIndex)?;
        let commit = self
            .reader
            .commit(height)?
            .ok_or(MapperError::CorruptIndex)?;

        if !self.config.skip_registers {
            let loaded = self.loader.load()?;
            let mut trie = loaded.trie;
            let computed = trie.root_hash();
            if computed != commit {
                tracing::error!(height, expected = %commit, computed = %computed, "restored trie diverges from index");
                return Err(MapperError::RestoreMismatch {
                    height,
                    expected: commit,
                    computed,
                });
            }
            state.forest.save(trie, commit, commit);
        }

        state.height = height;
        state.commit = commit;
        state.status = Status::Index;
        tracing::info!(height, commit = %commit, "resumed indexing");
        Ok(())
    }

    /// `Index`: wait for the next height's header and persist it.
    pub async fn index(&self, state: &mut State) -> Result<(), MapperError> {
        let next = state.height + 1;
        let header = self.chain.header(next).await?;
        self.writer.header(next, &header)?;
        tracing::debug!(height = next, block = %header.block_id, "indexed block header");
        state.header = Some(header);
        state.status = Status::Update;
        Ok(())
    }

    /// `Update`: stage a working copy of the parent trie.
    pub fn update(&self, state: &mut State) -> Result<(), MapperError> {
        if !self.config.skip_registers {
            let header = state.header.as_ref().expect("update without header");
            let parent = state.commit;
            let trie = state
                .forest
                .trie(&parent)
                .ok_or(MapperError::MissingParentTrie {
                    height: header.height,
                    block: header.block_id,
                    commitment: parent,
                })?;
            state.working = Some(trie);
        }
        state.status = Status::Collect;
        Ok(())
    }

    /// `Collect`: wait for the block's execution record.
    pub async fn collect(&self, state: &mut State) -> Result<(), MapperError> {
        let block_id = state
            .header
            .as_ref()
            .expect("collect without header")
            .block_id;
        let record = self.records.record(&block_id).await?;
        if self.config.skip_registers {
            tracing::debug!(block = %block_id, updates = record.updates.len(), "discarding register updates");
        } else {
            state.updates = record.updates;
        }
        state.status = Status::Map;
        Ok(())
    }

    /// `Map`: apply the updates, verify the root, persist the mapping.
    pub fn map(&self, state: &mut State) -> Result<(), MapperError> {
        let header = state.header.as_ref().expect("map without header");
        let next = state.height + 1;

        if self.config.skip_registers {
            // Nothing to verify against without a trie; trust the header.
            self.writer.commit(next, &header.state_commitment)?;
            state.status = Status::Forward;
            return Ok(());
        }

        let mut trie = state.working.take().expect("map without working trie");
        for update in &state.updates {
            trie.insert(update.path, &update.payload);
        }
        let computed = trie.root_hash();
        if computed != header.state_commitment {
            tracing::error!(
                height = next,
                block = %header.block_id,
                expected = %header.state_commitment,
                computed = %computed,
                "state commitment mismatch"
            );
            return Err(MapperError::CommitmentMismatch {
                height: next,
                block: header.block_id,
                expected: header.state_commitment,
                computed,
            });
        }

        self.writer.payloads(next, &state.updates)?;
        self.writer.commit(next, &computed)?;
        state.forest.save(trie, computed, state.commit);
        state.updates = Vec::new();
        state.status = Status::Forward;
        Ok(())
    }

    /// `Forward`: advance the indexed height and prune what fell behind.
    pub fn forward(&self, state: &mut State) -> Result<(), MapperError> {
        let header = state.header.take().expect("forward without header");
        let next = state.height + 1;

        self.writer.last(next)?;
        state.height = next;
        state.commit = header.state_commitment;
        state.forest.reset(&state.commit);
        self.chain.prune_below(next);
        state.status = Status::Index;
        tracing::info!(height = next, block = %header.block_id, commit = %state.commit, "indexed block");
        Ok(())
    }
}
