//! Tracking of the two independent data planes feeding the indexer.
//!
//! The consensus follower fans finalized block ids into the
//! [`ConsensusTracker`]; the cloud streamer delivers downloaded execution
//! records into the [`ExecutionTracker`]. Both expose suspending lookups
//! the indexer FSM awaits on, so the FSM stays single-threaded while the
//! producers run concurrently.

mod consensus;
mod execution;
mod protocol;

pub use consensus::ConsensusTracker;
pub use execution::ExecutionTracker;
pub use protocol::ProtocolDb;

use amber_storage::StoreError;
use amber_types::{BlockHeader, BlockId, ExecutionRecord};
use async_trait::async_trait;

/// Errors from tracker lookups.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] std::io::Error),

    #[error("no protocol state for finalized block {0}")]
    UnknownBlock(BlockId),

    #[error("spork root height is not set")]
    MissingRoot,

    #[error("finalization feed closed")]
    FeedClosed,
}

/// The FSM's view of consensus data: ordered finalized headers.
#[async_trait]
pub trait ChainFeed: Send + Sync {
    /// The spork's root height.
    fn root_height(&self) -> Result<u64, TrackerError>;

    /// The finalized header at `height`, suspending until the consensus
    /// follower has delivered it.
    async fn header(&self, height: u64) -> Result<BlockHeader, TrackerError>;

    /// Drop buffered metadata below `height` once it is committed.
    fn prune_below(&self, height: u64);
}

/// The FSM's view of execution data: one record per finalized block.
#[async_trait]
pub trait RecordFeed: Send + Sync {
    /// The execution record for `block_id`, suspending until the download
    /// completes. Each record is handed out exactly once.
    async fn record(&self, block_id: &BlockId) -> Result<ExecutionRecord, TrackerError>;
}
