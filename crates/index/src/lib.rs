//! Block-keyed index persistence.
//!
//! The index database maps heights to headers, commitments and register
//! payloads, plus the inverse lookups the API needs. [`Reader`] serves
//! point queries straight off the store; [`Writer`] funnels every mutation
//! through a transactional batch that flushes on size, on a timer, and on
//! close.

pub mod keys;
mod reader;
mod writer;

pub use reader::Reader;
pub use writer::{Writer, WriterConfig};

use amber_storage::StoreError;

/// Errors from index reads and writes.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] std::io::Error),

    #[error("malformed index entry under key {key}")]
    Malformed { key: String },

    #[error("index writer is closed")]
    Closed,
}
