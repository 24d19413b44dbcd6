//! Shared domain types for the Amber state indexer.
//!
//! These types cross every crate boundary: the ledger trie addresses
//! registers by [`Path`], the index persists [`BlockHeader`]s and
//! [`Payload`]s, and the cloud streamer decodes [`ExecutionRecord`]s
//! downloaded from the object store. Everything that is persisted or
//! travels between components carries borsh derives.

mod block;
mod path;
mod payload;
mod record;

pub use block::{BlockHeader, BlockId, Commitment, Seal};
pub use path::Path;
pub use payload::{Payload, PayloadKey};
pub use record::{ExecutionRecord, RegisterUpdate};

/// Block height within a spork. Heights are contiguous.
pub type Height = u64;

/// Error produced when parsing fixed-width identifiers from bytes or hex.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex string")]
    InvalidHex,
}
