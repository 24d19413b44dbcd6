//! Execution-record retrieval from an object-store bucket.
//!
//! This component plays the role a network subscription would otherwise
//! fill: execution nodes upload one record per block, named by block id,
//! and the [`Streamer`] downloads them as blocks finalize.

mod bucket;
mod streamer;

pub use bucket::GcsBucket;
pub use streamer::{record_name, Streamer};

use bytes::Bytes;

/// Errors from object retrieval.
#[derive(Debug, thiserror::Error)]
pub enum CloudError {
    /// The object does not exist (yet). Retryable: records are uploaded
    /// some time after their block finalizes.
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("transport error fetching {name}: {reason}")]
    Transport { name: String, reason: String },
}

/// The fixed interface to the object store: named blobs, read-only.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, name: &str) -> Result<Bytes, CloudError>;
}
