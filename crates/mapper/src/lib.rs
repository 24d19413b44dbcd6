//! The indexer state machine.
//!
//! The mapper coordinates the two asynchronously advancing data planes:
//! finalized headers on one side, downloaded execution records on the
//! other. It walks a fixed cycle of states per block, applying register
//! updates to the candidate trie, verifying the resulting root hash
//! against the header's state commitment, and persisting one canonical
//! mapping per height. Heights advance strictly contiguously; a gap is
//! never committed.

pub mod checkpoint;
mod fsm;
mod loader;
mod transitions;

pub use fsm::{Fsm, StopHandle};
pub use loader::{CheckpointLoader, IndexLoader, LoadedTrie, TrieLoader};
pub use transitions::{Config, State, Status, Transitions};

use amber_index::IndexError;
use amber_tracker::TrackerError;
use amber_types::{BlockId, Commitment};

/// Errors that abort the indexer.
///
/// Everything here is fatal: transient conditions (a download not yet
/// available, a header not yet finalized) are absorbed by the trackers'
/// suspending lookups and never surface as errors.
#[derive(Debug, thiserror::Error)]
pub enum MapperError {
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("loader error: {0}")]
    Loader(#[from] loader::LoadError),

    #[error("cannot resume: index is missing its last height or commitment")]
    CorruptIndex,

    #[error(
        "parent trie missing from forest (height {height}, block {block}, parent commitment {commitment})"
    )]
    MissingParentTrie {
        height: u64,
        block: BlockId,
        commitment: Commitment,
    },

    #[error(
        "state commitment mismatch (height {height}, block {block}, expected {expected}, computed {computed})"
    )]
    CommitmentMismatch {
        height: u64,
        block: BlockId,
        expected: Commitment,
        computed: Commitment,
    },

    #[error(
        "restored trie does not match indexed commitment (height {height}, expected {expected}, computed {computed})"
    )]
    RestoreMismatch {
        height: u64,
        expected: Commitment,
        computed: Commitment,
    },
}

pub use loader::LoadError;
